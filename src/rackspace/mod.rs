//! Rackspace API interaction module
//!
//! This module provides the core functionality for talking to Rackspace Cloud
//! APIs: authentication, the per-connection context, service clients and the
//! HTTP layer.
//!
//! # Module Structure
//!
//! - [`auth`] - Token authentication and the single-flight session cache
//! - [`client`] - Per-connection context and region-scoped service clients
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use rackscan::rackspace::client::{Connection, RestService};
//!
//! async fn example(config: rackscan::ConnectionConfig) -> rackscan::Result<()> {
//!     let conn = Connection::new(config)?;
//!     let dns = conn.rest_client(RestService::Dns)?;
//!     let url = dns.url("domains")?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;

pub use auth::{Authenticator, IdentityAuthenticator, Session, SessionCache};
pub use client::{Connection, RestService, ServiceClient, ServiceKind};
