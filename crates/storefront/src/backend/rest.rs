//! Record CRUD client for the hosted backend's REST surface.
//!
//! Speaks the PostgREST dialect: filters are query parameters
//! (`category=eq.men`, `price=gte.50`, `colors=cs.{Black}`), writes are
//! JSON bodies, and upserts use the `resolution=merge-duplicates` preference
//! keyed by an `on_conflict` column.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::auth::TokenStore;
use super::{BackendError, error_from_response};
use crate::config::{ConfigError, StoreConfig};

/// Sort direction for ordered selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

/// A filtered, ordered, paginated query against one collection.
///
/// Builds up the PostgREST query parameters; [`RestClient`] executes it.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl Query {
    /// An unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality filter: `column = value`.
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// Greater-than filter: `column > value`.
    #[must_use]
    pub fn gt(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("gt.{}", value.to_string())));
        self
    }

    /// Range filter: `column >= value`.
    #[must_use]
    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("gte.{}", value.to_string())));
        self
    }

    /// Range filter: `column <= value`.
    #[must_use]
    pub fn lte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("lte.{}", value.to_string())));
        self
    }

    /// Array contains filter: `column @> {value}`.
    #[must_use]
    pub fn contains(mut self, column: &str, value: &str) -> Self {
        self.filters
            .push((column.to_string(), format!("cs.{{{value}}}")));
        self
    }

    /// Case-insensitive text search across several columns
    /// (`or=(a.ilike.*term*,b.ilike.*term*)`).
    #[must_use]
    pub fn search(mut self, columns: &[&str], term: &str) -> Self {
        let clauses = columns
            .iter()
            .map(|col| format!("{col}.ilike.*{term}*"))
            .collect::<Vec<_>>()
            .join(",");
        self.filters.push(("or".to_string(), format!("({clauses})")));
        self
    }

    /// Order results by a column.
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.order = Some(format!("{column}.{}", direction.as_str()));
        self
    }

    /// Offset+limit pagination.
    #[must_use]
    pub const fn range(mut self, offset: u32, limit: u32) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Limit without an offset.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the query parameters this query contributes.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = self.filters.clone();
        if let Some(order) = &self.order {
            params.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }
}

// =============================================================================
// RestClient
// =============================================================================

/// Client for record CRUD against the hosted backend.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    tokens: TokenStore,
}

impl RestClient {
    /// Create a new record client.
    ///
    /// # Errors
    ///
    /// Returns an error if the REST path cannot be joined onto the backend URL.
    pub fn new(config: &StoreConfig, tokens: TokenStore) -> Result<Self, ConfigError> {
        let base = config.backend_url.join("rest/v1/").map_err(|e| {
            ConfigError::InvalidEnvVar("LUXE_BACKEND_URL".to_string(), e.to_string())
        })?;

        Ok(Self {
            inner: Arc::new(RestClientInner {
                client: reqwest::Client::new(),
                base,
                anon_key: config.anon_key.expose_secret().to_string(),
                tokens,
            }),
        })
    }

    fn collection_url(&self, collection: &str) -> Result<Url, BackendError> {
        self.inner.base.join(collection).map_err(|_| BackendError::Api {
            status: 0,
            code: None,
            message: format!("invalid collection name: {collection}"),
        })
    }

    /// Attach the API key and the current authorization context.
    ///
    /// Requests run as the signed-in user when a session token is held,
    /// otherwise under the anonymous key.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self
            .inner
            .tokens
            .access_token()
            .unwrap_or_else(|| self.inner.anon_key.clone());
        request
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
    }

    /// Select all rows matching a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response does not parse.
    #[instrument(skip(self, query), fields(collection = %collection))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.collection_url(collection)?;
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query.to_params());

        let response = self
            .authorize(self.inner.client.get(url).query(&params))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(response.json().await?)
    }

    /// Select exactly one row matching a query.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] when no row matches; other failures
    /// as usual.
    #[instrument(skip(self, query), fields(collection = %collection))]
    pub async fn select_single<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<T, BackendError> {
        let rows: Vec<T> = self.select(collection, &query.clone().limit(1)).await?;
        rows.into_iter().next().ok_or(BackendError::NotFound)
    }

    /// Count rows matching a query (exact count, no row transfer).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the count header is missing.
    #[instrument(skip(self, query), fields(collection = %collection))]
    pub async fn count(&self, collection: &str, query: &Query) -> Result<u64, BackendError> {
        let url = self.collection_url(collection)?;
        let mut params = vec![("select".to_string(), "id".to_string())];
        params.extend(query.to_params());

        let response = self
            .authorize(self.inner.client.head(url).query(&params))
            .header("Prefer", "count=exact")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        parse_total_count(content_range).ok_or_else(|| BackendError::Api {
            status: response.status().as_u16(),
            code: None,
            message: format!("missing or malformed content-range header: {content_range:?}"),
        })
    }

    /// Insert rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    #[instrument(skip(self, rows), fields(collection = %collection))]
    pub async fn insert<T: Serialize + Sync>(
        &self,
        collection: &str,
        rows: &T,
    ) -> Result<(), BackendError> {
        let url = self.collection_url(collection)?;
        let response = self
            .authorize(self.inner.client.post(url).json(rows))
            .header("Prefer", "return=minimal")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Insert rows and return the stored representation (with generated
    /// columns filled in).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write or the response does
    /// not parse.
    #[instrument(skip(self, rows), fields(collection = %collection))]
    pub async fn insert_returning<T: Serialize + Sync, R: DeserializeOwned>(
        &self,
        collection: &str,
        rows: &T,
    ) -> Result<Vec<R>, BackendError> {
        let url = self.collection_url(collection)?;
        let response = self
            .authorize(self.inner.client.post(url).json(rows))
            .header("Prefer", "return=representation")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Update rows matching a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    #[instrument(skip(self, query, patch), fields(collection = %collection))]
    pub async fn update<T: Serialize + Sync>(
        &self,
        collection: &str,
        query: &Query,
        patch: &T,
    ) -> Result<(), BackendError> {
        let url = self.collection_url(collection)?;
        let response = self
            .authorize(
                self.inner
                    .client
                    .patch(url)
                    .query(&query.to_params())
                    .json(patch),
            )
            .header("Prefer", "return=minimal")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Delete rows matching a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self, query), fields(collection = %collection))]
    pub async fn delete(&self, collection: &str, query: &Query) -> Result<(), BackendError> {
        let url = self.collection_url(collection)?;
        let response = self
            .authorize(self.inner.client.delete(url).query(&query.to_params()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Insert-or-update a row, keyed by `on_conflict` column.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    #[instrument(skip(self, row), fields(collection = %collection))]
    pub async fn upsert<T: Serialize + Sync>(
        &self,
        collection: &str,
        on_conflict: &str,
        row: &T,
    ) -> Result<(), BackendError> {
        let url = self.collection_url(collection)?;
        let response = self
            .authorize(
                self.inner
                    .client
                    .post(url)
                    .query(&[("on_conflict", on_conflict)])
                    .json(row),
            )
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// Call a stored procedure and return its scalar/row result.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response does not parse.
    #[instrument(skip(self, args), fields(function = %function))]
    pub async fn rpc<A: Serialize + Sync, R: DeserializeOwned>(
        &self,
        function: &str,
        args: &A,
    ) -> Result<R, BackendError> {
        let url = self
            .inner
            .base
            .join(&format!("rpc/{function}"))
            .map_err(|_| BackendError::Api {
                status: 0,
                code: None,
                message: format!("invalid function name: {function}"),
            })?;

        let response = self
            .authorize(self.inner.client.post(url).json(args))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }
}

/// Parse the total from a `content-range` header (`0-14/25` or `*/25`).
fn parse_total_count(content_range: &str) -> Option<u64> {
    content_range.rsplit('/').next()?.parse().ok()
}
