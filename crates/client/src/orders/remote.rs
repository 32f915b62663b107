//! Backend order endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use cartsync_core::ActorKey;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use super::{ConfirmationRequest, OrderHistoryEntry, parse_history};
use crate::origin::Origin;

/// Errors from the confirmation call.
#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("confirmation rejected ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Errors from fetching the order history.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("history request failed ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Sends the confirmation of a locally placed order.
#[async_trait]
pub trait OrderConfirmer: Send + Sync {
    /// Make one confirmation attempt.
    ///
    /// Any successful response body is acceptable; it is returned as JSON
    /// (`Value::Null` when empty or not JSON).
    async fn confirm(&self, request: &ConfirmationRequest<'_>) -> Result<Value, ConfirmError>;
}

/// Loads the authoritative order history of an actor.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    async fn fetch_history(&self, actor: &ActorKey) -> Result<Vec<OrderHistoryEntry>, FetchError>;
}

/// Shared HTTP plumbing for the order endpoints.
#[derive(Clone)]
struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    token: Option<SecretString>,
}

impl ApiClient {
    fn new(token: Option<SecretString>) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner { client, token }),
        })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match &self.inner.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }
}

/// [`OrderConfirmer`] posting to `{origin}/api/orders/confirm`.
#[derive(Clone)]
pub struct HttpConfirmer {
    api: ApiClient,
    url: Url,
}

impl HttpConfirmer {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(origin: &Origin, token: Option<SecretString>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api: ApiClient::new(token)?,
            url: origin.endpoint(&["api", "orders", "confirm"]),
        })
    }
}

#[async_trait]
impl OrderConfirmer for HttpConfirmer {
    #[instrument(skip(self, request), fields(local_id = %request.local_id))]
    async fn confirm(&self, request: &ConfirmationRequest<'_>) -> Result<Value, ConfirmError> {
        let response = self
            .api
            .request(reqwest::Method::POST, self.url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ConfirmError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
    }
}

/// [`HistoryFetcher`] reading `{origin}/api/orders`.
///
/// The backend identifies the actor from the bearer token. The response may be
/// a bare array or an object with an `orders` array.
#[derive(Clone)]
pub struct HttpHistoryFetcher {
    api: ApiClient,
    url: Url,
}

impl HttpHistoryFetcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(origin: &Origin, token: Option<SecretString>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api: ApiClient::new(token)?,
            url: origin.endpoint(&["api", "orders"]),
        })
    }
}

#[async_trait]
impl HistoryFetcher for HttpHistoryFetcher {
    #[instrument(skip(self, actor), fields(actor = %actor))]
    async fn fetch_history(&self, actor: &ActorKey) -> Result<Vec<OrderHistoryEntry>, FetchError> {
        let response = self
            .api
            .request(reqwest::Method::GET, self.url.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Parse(format!("Failed to parse order history: {e}")))?;
        if !value.is_array() && value.get("orders").is_none_or(|orders| !orders.is_array()) {
            return Err(FetchError::Parse(
                "expected an array or an object with `orders`".to_string(),
            ));
        }
        let history = parse_history(&value);
        tracing::debug!(count = history.len(), "Fetched order history");
        Ok(history)
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
