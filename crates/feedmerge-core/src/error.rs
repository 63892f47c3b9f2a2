use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Empty response body for URL: {0}")]
    EmptyBody(String),

    #[error("Feed too large ({size} bytes) for URL: {url}")]
    TooLarge { size: usize, url: String },

    #[error("Fetch timed out after {secs}s for URL: {url}")]
    Timeout { secs: u64, url: String },

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Cache entry not found: {0}")]
    CacheMiss(String),

    #[error("Cache write failed for {key}: {source}")]
    CacheWrite {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
