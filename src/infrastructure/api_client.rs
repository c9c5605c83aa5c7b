//! Authenticated REST and GraphQL client for platform APIs
//!
//! One client per platform and token. Responses are read in chunks up to a
//! size ceiling, non-2xx bodies are surfaced verbatim so callers can match
//! on provider error text, and nothing is retried here.

use std::time::Duration;

use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ApiError;

/// Ceiling for REST response bodies
pub const REST_RESPONSE_LIMIT: usize = 8 * 1024 * 1024;

/// Ceiling for GraphQL response bodies
pub const GRAPHQL_RESPONSE_LIMIT: usize = 4 * 1024 * 1024;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared reqwest client with request and connect deadlines
pub fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("sol-cloud/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!("⚠️  Falling back to default HTTP client: {}", err);
            Client::new()
        })
}

/// Whether an ensure-style call created the resource or found it already there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Created,
    Existing,
}

impl Ensured {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Existing => "already present",
        }
    }
}

/// Status and body of a response, for callers that classify statuses themselves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Platform API client
pub struct ApiClient {
    http: Client,
    rest_base: String,
    graphql_url: String,
    token: SecretString,
    rest_limit: usize,
    graphql_limit: usize,
}

impl ApiClient {
    pub fn new(token: SecretString) -> Self {
        Self {
            http: build_http_client(DEFAULT_REQUEST_TIMEOUT),
            rest_base: String::new(),
            graphql_url: String::new(),
            token,
            rest_limit: REST_RESPONSE_LIMIT,
            graphql_limit: GRAPHQL_RESPONSE_LIMIT,
        }
    }

    pub fn with_rest_base(mut self, url: impl Into<String>) -> Self {
        self.rest_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = build_http_client(timeout);
        self
    }

    #[cfg(test)]
    pub fn with_response_limits(mut self, rest: usize, graphql: usize) -> Self {
        self.rest_limit = rest;
        self.graphql_limit = graphql;
        self
    }

    pub fn rest_url(&self, path: &str) -> String {
        format!("{}/{}", self.rest_base, path.trim_start_matches('/'))
    }

    /// Send a REST request and return status and body without judging the status
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, ApiError> {
        let url = self.rest_url(path);
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| ApiError::Transport {
            method: method.to_string(),
            url: url.clone(),
            source,
        })?;
        let status = response.status().as_u16();
        let bytes = read_limited(response, &method, &url, self.rest_limit).await?;

        Ok(RawResponse {
            status,
            body: String::from_utf8_lossy(&bytes).trim().to_string(),
        })
    }

    /// REST request decoded as JSON; non-2xx is `ApiError::Status`
    pub async fn rest<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = self.rest_url(path);
        let raw = self.checked(method, path, body).await?;
        serde_json::from_str(&raw.body).map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }

    /// REST request whose response body is ignored on success
    pub async fn rest_no_content(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(), ApiError> {
        self.checked(method, path, body).await.map(|_| ())
    }

    async fn checked(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, ApiError> {
        let raw = self.send_raw(method.clone(), path, body).await?;
        if !raw.is_success() {
            return Err(ApiError::Status {
                method: method.to_string(),
                url: self.rest_url(path),
                status: raw.status,
                body: raw.body,
            });
        }
        Ok(raw)
    }

    /// Run a GraphQL operation and decode its `data`
    ///
    /// A 2xx envelope with a non-empty `errors` array is `ApiError::GraphQl`.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, ApiError> {
        let url = self.graphql_url.clone();
        let payload = json!({ "query": query, "variables": variables });

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                method: "POST".to_string(),
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let bytes = read_limited(response, &Method::POST, &url, self.graphql_limit).await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                method: "POST".to_string(),
                url,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }

        let envelope: Value = serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let messages = graphql_error_messages(&envelope);
        if !messages.is_empty() {
            return Err(ApiError::GraphQl { messages });
        }

        let data = envelope
            .get("data")
            .filter(|data| !data.is_null())
            .cloned()
            .ok_or_else(|| ApiError::Decode {
                url: url.clone(),
                message: "response has no data".to_string(),
            })?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

fn graphql_error_messages(envelope: &Value) -> Vec<String> {
    envelope
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|err| {
                    err.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn read_limited(
    mut response: reqwest::Response,
    method: &Method,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    let too_large = || ApiError::ResponseTooLarge {
        url: url.to_string(),
        limit,
    };
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|source| ApiError::Transport {
        method: method.to_string(),
        url: url.to_string(),
        source,
    })? {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// True when `message` contains any of `markers`, ignoring case
pub fn contains_any(message: &str, markers: &[&str]) -> bool {
    let message = message.to_lowercase();
    markers.iter().any(|marker| message.contains(marker))
}
