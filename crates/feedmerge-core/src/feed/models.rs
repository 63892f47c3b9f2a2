use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Sentinel used as the source domain when an item has no link
pub const UNDEFINED_SOURCE: &str = "undefined!";

/// Channel-level metadata of a parsed feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMeta {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
}

/// One item node as it appears in the feed document, before any resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    /// Full-content block such as `content:encoded`
    pub content_encoded: Option<String>,
    /// `url` attribute of `media:thumbnail` (or `media:content`)
    pub media_thumbnail: Option<String>,
    pub enclosure_url: Option<String>,
    /// Nested `url` of a namespaced `image` element
    pub vendor_image: Option<String>,
}

/// Parsed feed data
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub channel: ChannelMeta,
    pub items: Vec<RawItem>,
}

/// A dated feed item ready to be merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// Raw markup as provided by the feed
    pub description: String,
    /// Publish date exactly as written in the feed
    pub pub_date: String,
    /// Absolute timestamp, keeping the feed's own UTC offset
    pub published_at: DateTime<FixedOffset>,
    pub thumbnail: Option<String>,
    /// Display name of the originating site, e.g. "Example.org"
    pub source: String,
}

/// Calendar fields of a publish date in the feed's own offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateParts {
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub hour: u32,
    pub minute: u32,
}

impl DateParts {
    pub fn from_datetime(dt: &DateTime<FixedOffset>) -> Self {
        Self {
            day: dt.day(),
            month: dt.month(),
            year: dt.year(),
            hour: dt.hour(),
            minute: dt.minute(),
        }
    }
}

/// An entry of the final merged list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedItem {
    #[serde(flatten)]
    pub item: FeedItem,
    #[serde(flatten)]
    pub date: DateParts,
}

impl From<FeedItem> for MergedItem {
    fn from(item: FeedItem) -> Self {
        let date = DateParts::from_datetime(&item.published_at);
        Self { item, date }
    }
}

/// Parse a feed publish date.
///
/// Accepts RFC 2822 (RSS), RFC 3339 (Atom, Dublin Core) and a few common
/// variants; dates without an offset are taken as UTC. The RFC 2822 weekday
/// is not checked against the date, and date-only values mean midnight UTC.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt);
    }
    if let Some(dt) = strip_weekday(raw).and_then(|rest| DateTime::parse_from_rfc2822(rest).ok()) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt);
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().fixed_offset())
}

/// The remainder of an RFC 2822 date after a leading `Ddd,`
fn strip_weekday(raw: &str) -> Option<&str> {
    let (day, rest) = raw.split_once(',')?;
    day.trim()
        .chars()
        .all(|c| c.is_ascii_alphabetic())
        .then(|| rest.trim_start())
}

/// Display name of the site an item links to.
///
/// Takes the link's host, strips a leading "www." and capitalizes the first
/// letter. Returns [`UNDEFINED_SOURCE`] when there is no link.
pub fn source_domain(link: Option<&str>) -> String {
    let link = match link.map(str::trim) {
        Some(link) if !link.is_empty() => link,
        _ => return UNDEFINED_SOURCE.to_string(),
    };

    let host = match url::Url::parse(link) {
        Ok(url) => url.host_str().map(str::to_string),
        // Not an absolute URL; fall back to the third slash-separated segment
        Err(_) => link.split('/').nth(2).map(str::to_string),
    };

    let host = match host {
        Some(host) if !host.is_empty() => host,
        _ => return UNDEFINED_SOURCE.to_string(),
    };

    let host = host.strip_prefix("www.").unwrap_or(&host);
    let mut chars = host.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => UNDEFINED_SOURCE.to_string(),
    }
}
