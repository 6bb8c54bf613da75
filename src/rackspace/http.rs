//! HTTP utilities for Rackspace REST API calls

use crate::context::QueryContext;
use crate::error::{Error, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Header carrying the auth token on every Rackspace call
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A successful JSON response, or an explicit "no content"
#[derive(Debug)]
pub enum Body<T> {
    Json(T),
    NoContent,
}

/// HTTP client wrapper for Rackspace API calls
#[derive(Clone)]
pub struct RackspaceHttpClient {
    client: Client,
}

impl RackspaceHttpClient {
    /// Create a new HTTP client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rackscan/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport("create HTTP client", &e))?;

        Ok(Self { client })
    }

    pub(crate) fn inner(&self) -> &Client {
        &self.client
    }

    /// GET a JSON document
    pub async fn get<T: DeserializeOwned>(
        &self,
        ctx: &QueryContext,
        operation: &str,
        url: &str,
        headers: HeaderMap,
    ) -> Result<Body<T>> {
        tracing::debug!("GET {}", url);

        let request = self.client.get(url).headers(headers);
        ctx.run(operation, async {
            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(operation, &e))?;
            decode_json(operation, response).await
        })
        .await
    }

    /// HEAD a resource, returning its headers
    pub async fn head(
        &self,
        ctx: &QueryContext,
        operation: &str,
        url: &str,
        headers: HeaderMap,
    ) -> Result<HeaderMap> {
        tracing::debug!("HEAD {}", url);

        let request = self.client.head(url).headers(headers);
        ctx.run(operation, async {
            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(operation, &e))?;
            let status = response.status();
            if !status.is_success() {
                tracing::error!("API error: {} on HEAD {}", status, url);
                return Err(status_error(operation, status));
            }
            Ok(response.headers().clone())
        })
        .await
    }
}

/// Map a non-success status to an error
pub(crate) fn status_error(operation: &str, status: StatusCode) -> Error {
    Error::UpstreamStatus {
        operation: operation.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().map(str::to_string),
    }
}

/// Check the status and decode the body of a response
pub(crate) async fn decode_json<T: DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<Body<T>> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::transport(operation, &e))?;

    if !status.is_success() {
        // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
        tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        return Err(status_error(operation, status));
    }

    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return Ok(Body::NoContent);
    }

    serde_json::from_str(&body)
        .map(Body::Json)
        .map_err(|e| Error::extraction(operation, e))
}
