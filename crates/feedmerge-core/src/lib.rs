pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod thumbnail;

pub use aggregator::{merge, Aggregator, AggregatorOptions};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use feed::{FeedItem, MergedItem};
