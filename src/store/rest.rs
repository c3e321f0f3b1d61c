use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{until_cancelled, ListParams, RecordStore};
use crate::category::{CategoryId, CategoryPatch, CategoryRecord, NewCategory};
use crate::error::CategoryError;

/// Upper bound on a response body. Category lists are small; anything
/// larger is treated as a broken server.
const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("API URL cannot be used as a base: {0}")]
    NotABase(String),
    #[error("Insecure API URL: HTTPS required (except localhost for testing)")]
    Insecure,
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Store backed by the inventory REST API.
///
/// Endpoints, relative to the base URL:
/// - `GET categories?search=&sort=&order=` → `{"items": [...]}`
/// - `POST categories` → created record
/// - `PATCH categories/{id}` → updated record
/// - `DELETE categories/{id}`
pub struct RestStore {
    client: reqwest::Client,
    collection: Url,
    token: Option<SecretString>,
    timeout: Duration,
    max_body: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody {
    Wrapped { items: Vec<CategoryRecord> },
    Bare(Vec<CategoryRecord>),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl RestStore {
    /// Validate `base_url` and build a client.
    ///
    /// The bearer token is only ever sent over HTTPS, or plain HTTP to localhost.
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let mut base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(EndpointError::NotABase(base_url.to_string()));
        }
        match base.scheme() {
            "https" => {}
            "http" if is_localhost(&base) => {
                tracing::warn!(base_url = %base, "Using non-HTTPS API base URL (localhost only)");
            }
            _ => {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS API base URL");
                return Err(EndpointError::Insecure);
            }
        }

        // Without a trailing slash `join` would replace the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let collection = base.join("categories")?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("stockroom/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            collection,
            token,
            timeout,
            max_body: MAX_BODY_SIZE,
        })
    }

    /// Lower the response size cap. Bodies past `limit` bytes fail with a
    /// network error before they are fully read.
    #[must_use]
    pub fn with_max_body(mut self, limit: usize) -> Self {
        self.max_body = limit;
        self
    }

    fn item_url(&self, id: &CategoryId) -> Url {
        let mut url = self.collection.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(&id.to_string());
        }
        url
    }

    /// Send a request and read the body, all within the configured timeout.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, CategoryError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        };

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| CategoryError::Network(e.to_string()))?;
            let status = response.status();
            let body = read_limited(response, self.max_body).await?;
            if status.is_success() {
                Ok(body)
            } else {
                Err(classify_status(status.as_u16(), &body))
            }
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                CategoryError::Network(format!(
                    "Request timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
    }

    fn json_body<T: serde::Serialize>(
        request: reqwest::RequestBuilder,
        payload: &T,
    ) -> Result<reqwest::RequestBuilder, CategoryError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| CategoryError::Conflict(format!("Cannot encode request: {}", e)))?;
        Ok(request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body))
    }
}

#[async_trait]
impl RecordStore for RestStore {
    async fn list(
        &self,
        params: ListParams,
        cancel: CancellationToken,
    ) -> Result<Vec<CategoryRecord>, CategoryError> {
        let mut url = self.collection.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
                query.append_pair("search", search);
            }
            if let Some(sort) = params.sort {
                query.append_pair("sort", sort.as_param());
            }
            if let Some(order) = params.order {
                query.append_pair("order", order.as_param());
            }
        }
        // An empty query would leave a dangling `?`.
        if url.query() == Some("") {
            url.set_query(None);
        }

        tracing::debug!(url = %url, "Listing categories");
        let body = until_cancelled(&cancel, self.execute(self.client.get(url))).await?;
        let items = match decode::<ListBody>(&body)? {
            ListBody::Wrapped { items } | ListBody::Bare(items) => items,
        };
        tracing::debug!(count = items.len(), "Listed categories");
        Ok(items)
    }

    async fn create(&self, draft: NewCategory) -> Result<CategoryRecord, CategoryError> {
        let request = Self::json_body(self.client.post(self.collection.clone()), &draft)?;
        let body = self.execute(request).await?;
        decode(&body)
    }

    async fn update(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<CategoryRecord, CategoryError> {
        let request = Self::json_body(self.client.patch(self.item_url(&id)), &patch)?;
        let body = self.execute(request).await?;
        decode(&body)
    }

    async fn remove(&self, id: CategoryId) -> Result<(), CategoryError> {
        self.execute(self.client.delete(self.item_url(&id))).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, CategoryError> {
    serde_json::from_slice(body)
        .map_err(|e| CategoryError::Network(format!("Malformed response from server: {}", e)))
}

async fn read_limited(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, CategoryError> {
    let too_large = || CategoryError::Network(format!("Response larger than {} bytes", limit));

    // Fast path: declared length already over the cap
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(too_large());
        }
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CategoryError::Network(e.to_string()))?;
        if body.len().saturating_add(chunk.len()) > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Map a non-success status to the error taxonomy.
///
/// Client errors are the server rejecting the request and surface verbatim as
/// `Conflict`. Server errors, 408 and 429 are transient and surface as `Network`.
fn classify_status(status: u16, body: &[u8]) -> CategoryError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty() && text.len() <= 200).then_some(text)
        });

    match status {
        408 | 429 => CategoryError::Network(format!(
            "HTTP {}: {}",
            status,
            message.unwrap_or_else(|| "try again later".to_string())
        )),
        400..=499 => CategoryError::Conflict(
            message.unwrap_or_else(|| format!("Request rejected by server (HTTP {})", status)),
        ),
        _ => CategoryError::Network(match message {
            Some(m) => format!("HTTP {}: {}", status, m),
            None => format!("HTTP {}", status),
        }),
    }
}

fn is_localhost(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
}
