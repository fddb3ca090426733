use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;

use super::build_client;
use crate::config::Settings;
use crate::error::NetworkError;
use crate::state::data::ContactRecord;

/// Anything able to produce the full contact list in one go
#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<ContactRecord>, NetworkError>;
}

/// Contact source reading a JSON array from a fixed endpoint
pub struct HttpContactSource {
    client: Client,
    endpoint: String,
}

impl HttpContactSource {
    pub fn new(settings: &Settings) -> Result<Self, NetworkError> {
        let client = build_client(settings).map_err(NetworkError::Client)?;
        Ok(Self::with_client(client, settings.endpoint.clone()))
    }

    pub fn with_client(client: Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ContactSource for HttpContactSource {
    async fn fetch_all(&self) -> Result<Vec<ContactRecord>, NetworkError> {
        let url = &self.endpoint;
        debug!("GET {}", url);

        let transport = |source| NetworkError::Transport {
            url: url.clone(),
            source,
        };

        let res = self.client.get(url).send().await.map_err(transport)?;
        let status = res.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let body = res.bytes().await.map_err(transport)?;
        let contacts = decode_contacts(&body).map_err(|reason| NetworkError::Malformed {
            url: url.clone(),
            reason,
        })?;

        info!("Fetched {} contacts from {}", contacts.len(), url);
        Ok(contacts)
    }
}

/// Decode a contact payload.
///
/// Only the top level is strict: it must be a JSON array. Each element
/// is decoded leniently, see `ContactRecord::from_value`.
pub fn decode_contacts(body: &[u8]) -> Result<Vec<ContactRecord>, String> {
    let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    match value {
        Value::Array(items) => Ok(items.into_iter().map(ContactRecord::from_value).collect()),
        Value::Object(_) => Err("expected a JSON array, got an object".to_string()),
        other => Err(format!("expected a JSON array, got {}", other)),
    }
}
