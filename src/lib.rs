//! Contact Gallery
//!
//! Fetches a contact list from a JSON endpoint, downloads the photos the
//! user picks and keeps them in a local album that can be browsed and
//! pruned later.

pub mod config;
pub mod error;
pub mod remote;
pub mod state;

pub use config::Settings;
pub use error::{FetchError, NetworkError, StorageError};
