//! rackscan - Rackspace Cloud resources as queryable tables
//!
//! A data-source plugin for a host query engine. Each table lists or looks up
//! one kind of Rackspace resource and streams typed rows back to the host.
//!
//! ```ignore
//! use rackscan::{ConnectionConfig, Plugin, Query, QueryContext, RowSink};
//!
//! async fn domains(config: ConnectionConfig) -> rackscan::Result<()> {
//!     let plugin = Plugin::new(config)?;
//!     let (sink, mut rows) = RowSink::channel(64);
//!     let query = Query::new(QueryContext::default());
//!     tokio::spawn(async move {
//!         while let Some(row) = rows.recv().await {
//!             println!("{}", serde_json::to_string(&row).unwrap());
//!         }
//!     });
//!     plugin.list("rackspace_dns_domain", &query, &sink).await
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod plugin;
pub mod rackspace;
pub mod resource;

pub use config::ConnectionConfig;
pub use context::{CancelHandle, QueryContext};
pub use error::{Error, Result};
pub use plugin::{Plugin, Query, RowSink};
pub use resource::{Cell, Row};
