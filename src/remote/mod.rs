//! Remote sources: the contact list endpoint and photo downloads
//!
//! Both go through one `reqwest::Client` carrying the configured
//! timeouts, so a stalled server can't hang a fetch forever.

pub mod contacts;
pub mod photo;

use reqwest::Client;

use crate::config::Settings;

pub use contacts::{ContactSource, HttpContactSource};
pub use photo::{HttpPhotoFetcher, PhotoFetcher};

/// Build the HTTP client shared by the contact source and photo fetcher
pub fn build_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(settings.request_timeout())
        .connect_timeout(settings.connect_timeout())
        .user_agent(concat!("contact-gallery/", env!("CARGO_PKG_VERSION")))
        .build()
}
