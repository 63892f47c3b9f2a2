use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, CacheStore, FileCache};
use crate::config::AppConfig;
use crate::feed::{
    parse_feed, parse_pub_date, source_domain, FeedItem, Fetcher, HttpFetcher, MergedItem,
    ParsedFeed, TimeoutFetcher,
};
use crate::thumbnail::ThumbnailResolver;
use crate::Result;

/// Tunables for one aggregation pipeline
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Dated items kept per source, in document order
    pub items_per_feed: usize,
    /// Cached documents younger than this are served without fetching
    pub freshness_window: Duration,
    /// Sources processed at once (1 = sequential)
    pub concurrency: usize,
    /// Deadline applied to every fetch, feed or linked page
    pub fetch_timeout: Duration,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            items_per_feed: 5,
            freshness_window: Duration::from_secs(7200),
            concurrency: 1,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl AggregatorOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            items_per_feed: config.aggregator.items_per_feed,
            freshness_window: config.freshness_window(),
            concurrency: config.aggregator.concurrency.max(1),
            fetch_timeout: config.request_timeout(),
        }
    }
}

/// What the cache holds for a source at the start of its pass
enum CacheState {
    Fresh(Bytes),
    Stale(Bytes),
    Missing,
}

/// Fetches, caches, parses and merges a set of feeds into one ordered list
#[derive(Clone)]
pub struct Aggregator {
    cache: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<ThumbnailResolver>,
    options: AggregatorOptions,
    feeds: Arc<[String]>,
}

impl Aggregator {
    pub fn new(cache: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache,
            fetcher,
            resolver: Arc::new(ThumbnailResolver::default()),
            options: AggregatorOptions::default(),
            feeds: Arc::from(Vec::new()),
        }
    }

    /// Build the file-cached, HTTP-backed pipeline described by `config`.
    ///
    /// This is the only fallible step: an invalid configuration or an
    /// unusable cache directory is reported here, never from [`Aggregator::run`].
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let cache = FileCache::new(config.cache_dir())?;
        let fetcher = HttpFetcher::new(config)?;

        Ok(Self::new(Arc::new(cache), Arc::new(fetcher))
            .with_resolver(ThumbnailResolver::new(config.thumbnail.strategies.clone()))
            .with_options(AggregatorOptions::from_config(config))
            .with_feeds(config.aggregator.feeds.clone()))
    }

    /// Feed list used by [`Aggregator::run_configured`]
    pub fn with_feeds(mut self, feeds: Vec<String>) -> Self {
        self.feeds = Arc::from(feeds);
        self
    }

    pub fn feeds(&self) -> &[String] {
        &self.feeds
    }

    pub fn with_resolver(mut self, resolver: ThumbnailResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_options(mut self, options: AggregatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// Aggregate `sources` into a single list, newest first.
    ///
    /// Sources that cannot be fetched or parsed contribute nothing; this
    /// never fails. Items with equal timestamps keep source order, then
    /// document order.
    pub async fn run(&self, sources: &[String]) -> Vec<MergedItem> {
        let per_source = if self.options.concurrency <= 1 || sources.len() <= 1 {
            let mut results = Vec::with_capacity(sources.len());
            for url in sources {
                results.push(self.process_source(url).await);
            }
            results
        } else {
            self.run_concurrent(sources).await
        };

        let merged = merge(per_source);
        info!("Aggregated {} items from {} feeds", merged.len(), sources.len());
        merged
    }

    /// Aggregate the configured feed list
    pub async fn run_configured(&self) -> Vec<MergedItem> {
        let feeds = Arc::clone(&self.feeds);
        self.run(&feeds).await
    }

    async fn run_concurrent(&self, sources: &[String]) -> Vec<Vec<FeedItem>> {
        let mut results: Vec<Vec<FeedItem>> = vec![Vec::new(); sources.len()];
        let mut join_set: JoinSet<(usize, Vec<FeedItem>)> = JoinSet::new();
        let mut pending = sources.iter().cloned().enumerate();

        fn spawn_task(
            join_set: &mut JoinSet<(usize, Vec<FeedItem>)>,
            aggregator: Aggregator,
            index: usize,
            url: String,
        ) {
            join_set.spawn(async move {
                let items = aggregator.process_source(&url).await;
                (index, items)
            });
        }

        for _ in 0..self.options.concurrency {
            if let Some((index, url)) = pending.next() {
                spawn_task(&mut join_set, self.clone(), index, url);
            }
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((index, items)) => results[index] = items,
                Err(e) => tracing::error!("Feed task failed: {}", e),
            }

            if let Some((index, url)) = pending.next() {
                spawn_task(&mut join_set, self.clone(), index, url);
            }
        }

        results
    }

    /// One source's full pass: cache or fetch, parse, collect dated items
    async fn process_source(&self, url: &str) -> Vec<FeedItem> {
        info!("Processing feed: {}", url);

        let fetcher = TimeoutFetcher::new(Arc::clone(&self.fetcher), self.options.fetch_timeout);
        let key = cache_key(url);

        let Some(document) = self.load_document(&fetcher, url, &key).await else {
            return Vec::new();
        };

        let feed = match parse_feed(&document) {
            Ok(feed) => feed,
            Err(e) => {
                warn!("Skipping feed {}: {}", url, e);
                return Vec::new();
            }
        };

        debug!(
            "Feed {} ({}) lists {} items",
            url,
            feed.channel.title.as_deref().unwrap_or("untitled"),
            feed.items.len()
        );

        let items = self.collect_items(&fetcher, feed).await;
        info!("Feed {}: {} items", url, items.len());
        items
    }

    /// Cache-aside load of a source's raw document
    async fn load_document(&self, fetcher: &dyn Fetcher, url: &str, key: &str) -> Option<Bytes> {
        let stale = match self.cache_state(key).await {
            CacheState::Fresh(bytes) => {
                debug!("Cache hit for {}", url);
                return Some(bytes);
            }
            CacheState::Stale(bytes) => Some(bytes),
            CacheState::Missing => None,
        };

        match fetcher.fetch(url).await {
            Ok(bytes) => {
                self.store(key, &bytes, stale.is_some()).await;
                Some(bytes)
            }
            Err(e) => match stale {
                Some(bytes) => {
                    warn!("Fetch failed for {}, serving stale cache: {}", url, e);
                    Some(bytes)
                }
                None => {
                    warn!("Fetch failed for {}, skipping: {}", url, e);
                    None
                }
            },
        }
    }

    async fn cache_state(&self, key: &str) -> CacheState {
        if !self.cache.exists(key).await {
            return CacheState::Missing;
        }

        let age = match self.cache.age(key).await {
            Ok(age) => age,
            Err(e) => {
                debug!("Cache entry {} vanished: {}", key, e);
                return CacheState::Missing;
            }
        };

        match self.cache.read(key).await {
            Ok(bytes) if age < self.options.freshness_window => CacheState::Fresh(bytes),
            Ok(bytes) => {
                debug!("Cache entry {} is stale ({}s old)", key, age.as_secs());
                CacheState::Stale(bytes)
            }
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", key, e);
                CacheState::Missing
            }
        }
    }

    /// Persist freshly fetched bytes. Failures only cost a refetch next run.
    async fn store(&self, key: &str, bytes: &[u8], replace: bool) {
        if replace {
            if let Err(e) = self.cache.delete(key).await {
                debug!("Failed to delete stale cache entry {}: {}", key, e);
            }
        }

        if let Err(e) = self.cache.write(key, bytes).await {
            warn!("Failed to write cache entry {}: {}", key, e);
        }
    }

    /// The first `items_per_feed` items that carry a parseable publish date
    async fn collect_items(&self, fetcher: &dyn Fetcher, feed: ParsedFeed) -> Vec<FeedItem> {
        let mut items = Vec::new();

        for raw in feed.items {
            if items.len() >= self.options.items_per_feed {
                break;
            }

            let Some(pub_date) = raw.pub_date.clone() else {
                continue;
            };
            let Some(published_at) = parse_pub_date(&pub_date) else {
                debug!("Dropping item with unparseable date '{}'", pub_date);
                continue;
            };

            let thumbnail = self.resolver.resolve(&raw, Some(fetcher)).await;
            let source = source_domain(raw.link.as_deref());

            items.push(FeedItem {
                title: raw.title.unwrap_or_default(),
                link: raw.link.unwrap_or_default(),
                description: raw.description.unwrap_or_default(),
                pub_date,
                published_at,
                thumbnail,
                source,
            });
        }

        items
    }
}

/// Concatenate per-source lists in source order and sort newest first.
///
/// The sort is stable, so equal timestamps keep their relative order.
pub fn merge(per_source: Vec<Vec<FeedItem>>) -> Vec<MergedItem> {
    let mut items: Vec<FeedItem> = per_source.into_iter().flatten().collect();
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.into_iter().map(MergedItem::from).collect()
}
