use async_trait::async_trait;
use image::DynamicImage;
use log::debug;
use reqwest::Client;
use tokio::task;

use super::build_client;
use crate::config::Settings;
use crate::error::{FetchError, NetworkError};

/// Downloads one photo and decodes it into a bitmap
#[async_trait]
pub trait PhotoFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<DynamicImage, FetchError>;
}

/// Photo fetcher over plain HTTP GET
pub struct HttpPhotoFetcher {
    client: Client,
}

impl HttpPhotoFetcher {
    pub fn new(settings: &Settings) -> Result<Self, NetworkError> {
        let client = build_client(settings).map_err(NetworkError::Client)?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PhotoFetcher for HttpPhotoFetcher {
    async fn fetch(&self, url: &str) -> Result<DynamicImage, FetchError> {
        if url.trim().is_empty() {
            return Err(FetchError::EmptyUrl);
        }
        debug!("Downloading photo {}", url);

        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let res = self.client.get(url).send().await.map_err(transport)?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = res.bytes().await.map_err(transport)?;

        // Decoding is CPU-bound, keep it off the async workers
        let url = url.to_string();
        task::spawn_blocking(move || {
            image::load_from_memory(&body).map_err(|source| FetchError::Decode { url, source })
        })
        .await?
    }
}
