//! Thumbnail resolution for feed items.
//!
//! Feeds expose preview images in several places depending on their dialect
//! (Media RSS, enclosures, vendor extensions, inline HTML). A resolver walks a
//! configured list of [`ThumbnailStrategy`] values and keeps the first hit.

mod extract;

use serde::{Deserialize, Serialize};

use crate::feed::{Fetcher, RawItem};

pub use extract::{first_img_src, og_image};

/// One place a thumbnail URL can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailStrategy {
    /// `media:thumbnail` (or `media:content`) url attribute
    MediaThumbnail,
    /// `enclosure` url attribute
    Enclosure,
    /// Namespaced `image` element with a nested `url`
    VendorImage,
    /// First `<img src>` inside the rich content block
    ContentImage,
    /// First `<img src>` inside the description
    DescriptionImage,
    /// `og:image` meta tag of the linked page (requires a network fetch)
    OpenGraph,
}

impl ThumbnailStrategy {
    pub const ALL: [ThumbnailStrategy; 6] = [
        ThumbnailStrategy::MediaThumbnail,
        ThumbnailStrategy::Enclosure,
        ThumbnailStrategy::VendorImage,
        ThumbnailStrategy::ContentImage,
        ThumbnailStrategy::DescriptionImage,
        ThumbnailStrategy::OpenGraph,
    ];
}

/// Ordered thumbnail fallback chain
#[derive(Debug, Clone)]
pub struct ThumbnailResolver {
    strategies: Vec<ThumbnailStrategy>,
}

impl Default for ThumbnailResolver {
    fn default() -> Self {
        Self::new(ThumbnailStrategy::ALL.to_vec())
    }
}

impl ThumbnailResolver {
    pub fn new(strategies: Vec<ThumbnailStrategy>) -> Self {
        Self { strategies }
    }

    /// Resolve the best thumbnail for an item, or `None` if no strategy matches.
    ///
    /// `page_fetcher` is used only by [`ThumbnailStrategy::OpenGraph`]; pass
    /// `None` to keep resolution offline. Fetch failures count as "no match".
    pub async fn resolve(
        &self,
        item: &RawItem,
        page_fetcher: Option<&dyn Fetcher>,
    ) -> Option<String> {
        for strategy in &self.strategies {
            let found = match strategy {
                ThumbnailStrategy::MediaThumbnail => non_empty(item.media_thumbnail.as_deref()),
                ThumbnailStrategy::Enclosure => non_empty(item.enclosure_url.as_deref()),
                ThumbnailStrategy::VendorImage => non_empty(item.vendor_image.as_deref()),
                ThumbnailStrategy::ContentImage => {
                    item.content_encoded.as_deref().and_then(first_img_src)
                }
                ThumbnailStrategy::DescriptionImage => {
                    item.description.as_deref().and_then(first_img_src)
                }
                ThumbnailStrategy::OpenGraph => match (page_fetcher, non_empty(item.link.as_deref())) {
                    (Some(fetcher), Some(link)) => fetch_og_image(fetcher, &link).await,
                    _ => None,
                },
            };

            if let Some(url) = found {
                tracing::trace!("Thumbnail via {:?}: {}", strategy, url);
                return Some(url);
            }
        }

        None
    }
}

async fn fetch_og_image(fetcher: &dyn Fetcher, link: &str) -> Option<String> {
    match fetcher.fetch(link).await {
        Ok(page) => og_image(&String::from_utf8_lossy(&page)),
        Err(e) => {
            tracing::debug!("og:image lookup failed for {}: {}", link, e);
            None
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves one fixed page (or fails) and counts calls
    struct PageFetcher {
        page: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl PageFetcher {
        fn serving(page: &'static str) -> Self {
            Self {
                page: Some(page),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                page: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Fetcher for PageFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.page {
                Some(page) => Ok(Bytes::from_static(page.as_bytes())),
                None => Err(Error::HttpStatus {
                    status: 500,
                    url: url.to_string(),
                }),
            }
        }
    }

    fn rich_item() -> RawItem {
        RawItem {
            link: Some("https://example.org/post".to_string()),
            description: Some(r#"<img src="https://img.example.org/d.jpg">"#.to_string()),
            content_encoded: Some(r#"<p><img alt="x" src="https://img.example.org/c.jpg"/></p>"#.to_string()),
            media_thumbnail: Some("https://img.example.org/m.jpg".to_string()),
            enclosure_url: Some("https://img.example.org/e.jpg".to_string()),
            vendor_image: Some("https://img.example.org/v.jpg".to_string()),
            ..RawItem::default()
        }
    }

    #[tokio::test]
    async fn test_media_thumbnail_wins() {
        let resolver = ThumbnailResolver::default();
        let pages = PageFetcher::serving(r#"<meta property="og:image" content="https://img.example.org/og.jpg">"#);

        let thumb = resolver.resolve(&rich_item(), Some(&pages)).await;

        assert_eq!(thumb.as_deref(), Some("https://img.example.org/m.jpg"));
        assert_eq!(pages.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_priority_order_falls_through() {
        let resolver = ThumbnailResolver::default();
        let mut item = rich_item();

        item.media_thumbnail = Some("   ".to_string());
        assert_eq!(
            resolver.resolve(&item, None).await.as_deref(),
            Some("https://img.example.org/e.jpg")
        );

        item.enclosure_url = None;
        assert_eq!(
            resolver.resolve(&item, None).await.as_deref(),
            Some("https://img.example.org/v.jpg")
        );

        item.vendor_image = None;
        assert_eq!(
            resolver.resolve(&item, None).await.as_deref(),
            Some("https://img.example.org/c.jpg")
        );

        item.content_encoded = Some("<p>no images here</p>".to_string());
        assert_eq!(
            resolver.resolve(&item, None).await.as_deref(),
            Some("https://img.example.org/d.jpg")
        );
    }

    #[tokio::test]
    async fn test_configured_subset_and_order() {
        let resolver = ThumbnailResolver::new(vec![
            ThumbnailStrategy::DescriptionImage,
            ThumbnailStrategy::Enclosure,
        ]);

        assert_eq!(
            resolver.resolve(&rich_item(), None).await.as_deref(),
            Some("https://img.example.org/d.jpg")
        );

        let mut item = rich_item();
        item.description = None;
        assert_eq!(
            resolver.resolve(&item, None).await.as_deref(),
            Some("https://img.example.org/e.jpg")
        );

        item.enclosure_url = None;
        // media/vendor fields are present but not enabled
        assert_eq!(resolver.resolve(&item, None).await, None);
    }

    #[tokio::test]
    async fn test_open_graph_fallback() {
        let resolver = ThumbnailResolver::default();
        let pages = PageFetcher::serving(
            r#"<html><head><meta property="og:image" content="https://img.example.org/og.jpg" /></head></html>"#,
        );
        let item = RawItem {
            link: Some("https://example.org/post".to_string()),
            description: Some("plain text".to_string()),
            ..RawItem::default()
        };

        let thumb = resolver.resolve(&item, Some(&pages)).await;

        assert_eq!(thumb.as_deref(), Some("https://img.example.org/og.jpg"));
        assert_eq!(pages.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_sources_yields_none() {
        let item = RawItem {
            link: Some("https://example.org/post".to_string()),
            description: Some("just words".to_string()),
            ..RawItem::default()
        };

        // og:image disabled
        let offline = ThumbnailResolver::new(ThumbnailStrategy::ALL[..5].to_vec());
        let pages = PageFetcher::serving(r#"<meta property="og:image" content="https://x/og.jpg">"#);
        assert_eq!(offline.resolve(&item, Some(&pages)).await, None);
        assert_eq!(pages.calls.load(Ordering::SeqCst), 0);

        // og:image enabled but the page fetch fails
        let failing = PageFetcher::failing();
        assert_eq!(
            ThumbnailResolver::default().resolve(&item, Some(&failing)).await,
            None
        );
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

        // og:image enabled, no fetcher supplied
        assert_eq!(ThumbnailResolver::default().resolve(&item, None).await, None);
    }

    #[tokio::test]
    async fn test_open_graph_skipped_without_link() {
        let pages = PageFetcher::serving(r#"<meta property="og:image" content="https://x/og.jpg">"#);
        let thumb = ThumbnailResolver::default()
            .resolve(&RawItem::default(), Some(&pages))
            .await;

        assert_eq!(thumb, None);
        assert_eq!(pages.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_strategy_names() {
        let names: Vec<String> = ThumbnailStrategy::ALL
            .iter()
            .map(|s| serde_json::to_value(s).unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "media_thumbnail",
                "enclosure",
                "vendor_image",
                "content_image",
                "description_image",
                "open_graph"
            ]
        );
    }
}
