//! Rackspace Client
//!
//! The per-connection context object (config, HTTP client, session cache)
//! and the factory for region-scoped service clients.

use super::auth::{Authenticator, IdentityAuthenticator, Session, SessionCache, SESSION_CACHE_KEY};
use super::http::{Body, RackspaceHttpClient, AUTH_TOKEN_HEADER};
use crate::config::ConnectionConfig;
use crate::context::QueryContext;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Public domain of the Rackspace REST services
pub const PROVIDER_DOMAIN: &str = "api.rackspacecloud.com";

/// Catalog-routed services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Compute,
    Image,
    ObjectStore,
}

impl ServiceKind {
    /// Service type as it appears in the identity catalog
    pub fn catalog_type(self) -> &'static str {
        match self {
            ServiceKind::Compute => "compute",
            ServiceKind::Image => "image",
            ServiceKind::ObjectStore => "object-store",
        }
    }

    fn normalize_endpoint(self, public_url: &str) -> String {
        let trimmed = public_url.trim_end_matches('/');
        match self {
            ServiceKind::Image if !trimmed.ends_with("/v2") => format!("{trimmed}/v2"),
            _ => trimmed.to_string(),
        }
    }
}

/// Services reached by direct REST calls, outside the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestService {
    Dns,
    LoadBalancers,
    Queues,
    Networks,
    BlockStorage,
}

impl RestService {
    fn host_label(self) -> &'static str {
        match self {
            RestService::Dns => "dns",
            RestService::LoadBalancers => "loadbalancers",
            RestService::Queues => "queues",
            RestService::Networks => "networks",
            RestService::BlockStorage => "blockstorage",
        }
    }

    fn api_version(self) -> &'static str {
        match self {
            RestService::Dns | RestService::LoadBalancers => "v1.0",
            RestService::Queues | RestService::BlockStorage => "v1",
            RestService::Networks => "v2.0",
        }
    }

    fn is_regional(self) -> bool {
        !matches!(self, RestService::Dns)
    }

    fn is_tenant_scoped(self) -> bool {
        !matches!(self, RestService::Networks)
    }
}

/// Client bound to one service endpoint, carrying the auth headers
#[derive(Clone)]
pub struct ServiceClient {
    http: RackspaceHttpClient,
    base: Url,
    headers: HeaderMap,
}

impl ServiceClient {
    fn new(http: RackspaceHttpClient, base: &str, token: &str) -> Result<Self> {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| Error::InvalidEndpoint {
            url: base.clone(),
            message: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(token)
            .map_err(|_| Error::Auth("token contains characters not valid in a header".to_string()))?;
        headers.insert(AUTH_TOKEN_HEADER, token);

        Ok(Self {
            http,
            base,
            headers,
        })
    }

    fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a path against the service base
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::extraction("build request URL", e))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        ctx: &QueryContext,
        operation: &str,
        url: &Url,
    ) -> Result<Body<T>> {
        self.http
            .get(ctx, operation, url.as_str(), self.headers.clone())
            .await
    }

    /// GET that must return a body
    pub async fn get_required<T: DeserializeOwned>(
        &self,
        ctx: &QueryContext,
        operation: &str,
        url: &Url,
    ) -> Result<T> {
        match self.get(ctx, operation, url).await? {
            Body::Json(value) => Ok(value),
            Body::NoContent => Err(Error::extraction(operation, "empty response body")),
        }
    }

    pub async fn head(&self, ctx: &QueryContext, operation: &str, url: &Url) -> Result<HeaderMap> {
        self.http
            .head(ctx, operation, url.as_str(), self.headers.clone())
            .await
    }
}

/// Per-connection context, owned by the host and passed into every operation
pub struct Connection {
    config: ConnectionConfig,
    http: RackspaceHttpClient,
    authenticator: Arc<dyn Authenticator>,
    sessions: SessionCache<Session>,
    client_id: Uuid,
}

impl Connection {
    /// Create a connection that authenticates against the configured identity endpoint
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let http = RackspaceHttpClient::new(config.request_timeout())?;
        let authenticator = Arc::new(IdentityAuthenticator::new(http.inner().clone()));
        Ok(Self::build(config, http, authenticator))
    }

    /// Create a connection with a custom authenticator
    pub fn with_authenticator(
        config: ConnectionConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let http = RackspaceHttpClient::new(config.request_timeout())?;
        Ok(Self::build(config, http, authenticator))
    }

    fn build(
        config: ConnectionConfig,
        http: RackspaceHttpClient,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config,
            http,
            authenticator,
            sessions: SessionCache::new(),
            client_id: Uuid::new_v4(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get the cached session, authenticating on first use
    pub async fn session(&self, ctx: &QueryContext) -> Result<Arc<Session>> {
        let params = self.config.resolve()?;
        let authenticator = self.authenticator.clone();

        // The flight outlives any one query, so it runs detached; the HTTP
        // timeout still bounds it
        self.sessions
            .get_or_create(ctx, SESSION_CACHE_KEY, move || async move {
                authenticator.authenticate(&QueryContext::default(), &params).await
            })
            .await
    }

    /// Build a client for a catalog service in the configured region
    pub async fn service_client(&self, ctx: &QueryContext, kind: ServiceKind) -> Result<ServiceClient> {
        let params = self.config.resolve()?;
        let session = self.session(ctx).await?;

        let endpoint = session
            .endpoint_for(kind.catalog_type(), &params.region)
            .ok_or_else(|| Error::EndpointNotFound {
                service: kind.catalog_type().to_string(),
                region: params.region.clone(),
            })?;

        tracing::debug!("Using {} endpoint {}", kind.catalog_type(), endpoint);
        ServiceClient::new(self.http.clone(), &kind.normalize_endpoint(endpoint), &session.token)
    }

    /// Build a client for a direct REST service from the configured token,
    /// tenant and region. No authentication round trip.
    pub fn rest_client(&self, service: RestService) -> Result<ServiceClient> {
        let creds = self
            .config
            .rest_credentials(service.is_tenant_scoped(), service.is_regional())?;

        let host = match (&self.config.endpoint_override, &creds.region) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(region)) => format!(
                "https://{}.{}.{}",
                region.to_lowercase(),
                service.host_label(),
                PROVIDER_DOMAIN
            ),
            (None, None) => format!("https://{}.{}", service.host_label(), PROVIDER_DOMAIN),
        };

        let base = match &creds.tenant_id {
            Some(tenant) => format!(
                "{}/{}/{}",
                host,
                service.api_version(),
                urlencoding::encode(tenant)
            ),
            None => format!("{}/{}", host, service.api_version()),
        };

        let client = ServiceClient::new(self.http.clone(), &base, &creds.token_id)?;
        Ok(match service {
            // Cloud Queues rejects requests without a client id
            RestService::Queues => client.with_header("client-id", &self.client_id.to_string()),
            _ => client,
        })
    }
}
