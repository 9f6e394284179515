use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Network Error while fetching {url}: {source}")]
    Network { url: String, source: FetchError },
    #[error("Malformed response for page {page}: {reason}")]
    MalformedResponse { page: usize, reason: String },
    #[error("Can't read metadata document: {0}")]
    MalformedDocument(String),
    #[error("Posterous returned an error for page {page} (stat=\"{stat}\")")]
    ServiceReported { page: usize, stat: String },

    #[error("Download failed for {url}: {source}")]
    AssetFetch { url: String, source: FetchError },
    #[error("Can't map asset url to a local path: {0}")]
    AssetPath(String),

    #[error("The selector you are trying to scrape for is missing. Selector: {0}")]
    ParseMissingSelector(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),
    #[error("Backup was cancelled.")]
    Cancelled,

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Failure of a single HTTP request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
}
