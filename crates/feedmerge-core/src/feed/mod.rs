mod fetcher;
mod models;
mod parser;

pub use fetcher::{Fetcher, HttpFetcher, Identity, TimeoutFetcher, UserAgentPool};
pub use models::{
    parse_pub_date, source_domain, ChannelMeta, DateParts, FeedItem, MergedItem, ParsedFeed,
    RawItem, UNDEFINED_SOURCE,
};
pub use parser::parse_feed;
