//! Error types for the fetch → save → delete workflow
//!
//! Each stage has its own error kind so callers can decide what is fatal
//! for a whole batch (the contact list) and what only affects one item
//! (a single photo download, a single save or delete).

use thiserror::Error;

use crate::state::data::StorageLocation;

/// Failure while fetching the contact list
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The HTTP client could not be built (TLS backend, bad settings)
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body is not JSON, or the top-level value is not an array
    #[error("malformed contact payload from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Failure while downloading or decoding a single photo
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("contact has no picture URL")]
    EmptyUrl,

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("content of {url} is not a decodable image: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("decode task failed: {0}")]
    Task(String),
}

/// Failure while saving, listing or deleting album entries
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("failed to encode JPEG: {0}")]
    Encode(#[from] image::ImageError),

    /// The handle does not (or no longer) point at an album entry
    #[error("no album entry at {0}")]
    NotFound(StorageLocation),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("media index lock poisoned")]
    Poisoned,
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::Task(err.to_string())
    }
}
