//! Error types for hoursync.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A remote service answered with a non-success status or an
    /// unusable payload. Fatal to the current sync — never retried here.
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
