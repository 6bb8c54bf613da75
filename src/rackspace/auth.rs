//! Rackspace Authentication
//!
//! Exchanges the configured token for an authenticated session (token plus
//! service catalog) and caches that session for the life of the connection.

use super::http::{decode_json, Body};
use crate::config::ConnectionParams;
use crate::context::QueryContext;
use crate::error::{Error, Result};
use crate::resource::parse_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Key under which a connection stores its session
pub const SESSION_CACHE_KEY: &str = "rackspace";

/// One endpoint of a catalog service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEndpoint {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "tenantId", default)]
    pub tenant_id: Option<String>,
    #[serde(rename = "publicURL")]
    pub public_url: String,
}

/// A service entry in the identity service catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogService {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// Authenticated session. Region-agnostic: endpoints are picked per call.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub expires: Option<DateTime<Utc>>,
    pub tenant_id: String,
    pub catalog: Vec<CatalogService>,
}

impl Session {
    /// Find the public URL for a service type in a region (case-insensitive)
    pub fn endpoint_for(&self, service_type: &str, region: &str) -> Option<&str> {
        self.catalog
            .iter()
            .filter(|s| s.service_type == service_type)
            .flat_map(|s| s.endpoints.iter())
            .find(|e| {
                e.region
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(region))
            })
            .map(|e| e.public_url.as_str())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: TokenInfo,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogService>,
}

#[derive(Deserialize)]
struct TokenInfo {
    id: String,
    #[serde(default)]
    expires: Option<String>,
    #[serde(default)]
    tenant: Option<TenantInfo>,
}

#[derive(Deserialize)]
struct TenantInfo {
    id: String,
}

/// Exchanges connection parameters for a session
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, ctx: &QueryContext, params: &ConnectionParams) -> Result<Session>;
}

/// Keystone v2 token authentication against the configured identity endpoint
pub struct IdentityAuthenticator {
    http: reqwest::Client,
}

impl IdentityAuthenticator {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn tokens_url(identity_endpoint: &str) -> Result<Url> {
        let mut base = identity_endpoint.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
            .and_then(|u| u.join("tokens"))
            .map_err(|e| Error::Auth(format!("invalid identity endpoint '{identity_endpoint}': {e}")))
    }
}

#[async_trait]
impl Authenticator for IdentityAuthenticator {
    async fn authenticate(&self, ctx: &QueryContext, params: &ConnectionParams) -> Result<Session> {
        let url = Self::tokens_url(&params.identity_endpoint)?;
        tracing::debug!("POST {}", url);

        let body = serde_json::json!({
            "auth": {
                "token": { "id": params.token_id },
                "tenantId": params.tenant_id,
            }
        });

        let request = self.http.post(url).json(&body);
        let result = ctx
            .run("authenticate", async {
                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::transport("authenticate", &e))?;
                decode_json::<TokenResponse>("authenticate", response).await
            })
            .await;

        let access = match result {
            Ok(Body::Json(token)) => token.access,
            Ok(Body::NoContent) => {
                return Err(Error::Auth("identity service returned an empty body".to_string()))
            },
            // Cancellation is the caller's doing, not an auth failure
            Err(e @ Error::Cancelled { .. }) => return Err(e),
            Err(e) => return Err(Error::Auth(e.to_string())),
        };

        let tenant_id = access
            .token
            .tenant
            .map(|t| t.id)
            .unwrap_or_else(|| params.tenant_id.clone());

        tracing::info!(
            "Authenticated tenant {} ({} catalog services)",
            tenant_id,
            access.service_catalog.len()
        );

        Ok(Session {
            token: access.token.id,
            expires: access.token.expires.as_deref().and_then(parse_timestamp),
            tenant_id,
            catalog: access.service_catalog,
        })
    }
}

type Flight<S> = Shared<BoxFuture<'static, Result<Arc<S>>>>;

enum Slot<S> {
    Ready(Arc<S>),
    Pending(Flight<S>),
}

/// Session cache with single-flight creation.
///
/// Concurrent first callers share one in-flight authentication and all see
/// its outcome. A failed flight is dropped so the next call tries again.
/// Each caller waits under its own context; a caller that gives up leaves the
/// flight running for the others.
pub struct SessionCache<S> {
    slots: Mutex<HashMap<String, Slot<S>>>,
}

impl<S> Default for SessionCache<S> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<S: Send + Sync + 'static> SessionCache<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached session for `key`, creating it with `create` if needed.
    ///
    /// `create` must not depend on `ctx`: the flight it starts is shared with
    /// callers that have their own contexts.
    pub async fn get_or_create<F, Fut>(&self, ctx: &QueryContext, key: &str, create: F) -> Result<Arc<S>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        let flight = {
            let mut slots = self.slots.lock().await;
            match slots.get(key) {
                Some(Slot::Ready(session)) => return Ok(session.clone()),
                Some(Slot::Pending(flight)) => flight.clone(),
                None => {
                    let flight = create().map(|r| r.map(Arc::new)).boxed().shared();
                    slots.insert(key.to_string(), Slot::Pending(flight.clone()));
                    flight
                },
            }
        };

        let outcome = match ctx.run("authenticate", flight.clone().map(Ok)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!("Stopped waiting for session: {}", e);
                return Err(e);
            },
        };

        let mut slots = self.slots.lock().await;
        let ours = matches!(slots.get(key), Some(Slot::Pending(f)) if f.ptr_eq(&flight));
        if ours {
            match &outcome {
                Ok(session) => {
                    slots.insert(key.to_string(), Slot::Ready(session.clone()));
                },
                Err(e) => {
                    tracing::warn!("Session creation failed, not caching: {}", e);
                    slots.remove(key);
                },
            }
        }

        outcome
    }

    /// Whether a ready session is cached under `key`
    pub async fn contains(&self, key: &str) -> bool {
        matches!(self.slots.lock().await.get(key), Some(Slot::Ready(_)))
    }
}
