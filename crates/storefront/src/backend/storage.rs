//! Object storage client for product images.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::instrument;
use url::Url;

use super::auth::TokenStore;
use super::{BackendError, error_from_response};
use crate::config::{ConfigError, StoreConfig};

/// Client for the hosted object storage.
#[derive(Clone)]
pub struct StorageClient {
    inner: Arc<StorageClientInner>,
}

struct StorageClientInner {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    tokens: TokenStore,
}

impl StorageClient {
    /// Create a new storage client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage path cannot be joined onto the backend
    /// URL.
    pub fn new(config: &StoreConfig, tokens: TokenStore) -> Result<Self, ConfigError> {
        let base = config.backend_url.join("storage/v1/").map_err(|e| {
            ConfigError::InvalidEnvVar("LUXE_BACKEND_URL".to_string(), e.to_string())
        })?;

        Ok(Self {
            inner: Arc::new(StorageClientInner {
                client: reqwest::Client::new(),
                base,
                anon_key: config.anon_key.expose_secret().to_string(),
                tokens,
            }),
        })
    }

    /// Upload an object and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload is rejected or the path is invalid.
    #[instrument(skip(self, bytes), fields(bucket = %bucket, path = %path, len = bytes.len()))]
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = self
            .inner
            .base
            .join(&format!("object/{bucket}/{path}"))
            .map_err(|_| BackendError::Api {
                status: 0,
                code: None,
                message: format!("invalid storage path: {bucket}/{path}"),
            })?;

        let bearer = self
            .inner
            .tokens
            .access_token()
            .unwrap_or_else(|| self.inner.anon_key.clone());

        let response = self
            .inner
            .client
            .post(url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(self.public_url(bucket, path))
    }

    /// The public URL an uploaded object is served from.
    #[must_use]
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}object/public/{bucket}/{path}", self.inner.base)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> StoreConfig {
        StoreConfig {
            backend_url: Url::parse("https://project.example.co").unwrap(),
            anon_key: SecretString::from("anon-key"),
            state_dir: std::path::PathBuf::from(".luxe"),
            order_poll_interval: std::time::Duration::from_secs(5),
        }
    }

    #[test]
    fn test_public_url_shape() {
        let client = StorageClient::new(&config(), TokenStore::in_memory()).unwrap();
        assert_eq!(
            client.public_url("products", "product-images/a.jpg"),
            "https://project.example.co/storage/v1/object/public/products/product-images/a.jpg"
        );
    }
}
