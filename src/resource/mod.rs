//! Resource abstraction layer
//!
//! This module provides a data-driven approach to exposing Rackspace resources
//! as tables. Table schemas are loaded from JSON files at compile time; each
//! table names the list and get methods that feed it.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches table definitions from embedded JSON
//! - [`model`] - Typed resource structs and the [`ResourceItem`] variant
//! - [`pager`] - Link and marker pagination
//! - [`fetcher`] - Single-item lookups, including the container composite
//! - [`row`] - Projection of items into typed rows
//! - [`sdk_dispatch`] - Maps table method names to concrete REST API calls
//!
//! # Table Definitions
//!
//! Tables are defined in JSON files under `src/resources/`:
//! - `compute.json` - Cloud Servers (servers, flavors, keypairs, limits) and images
//! - `storage.json` - Block Storage volumes and snapshots, Cloud Files
//! - `network.json` - Cloud Networks and Load Balancers
//! - `services.json` - Cloud DNS and Cloud Queues
//!
//! # Example
//!
//! ```ignore
//! use rackscan::resource::{get_table, to_row};
//!
//! let table = get_table("rackspace_dns_domain").unwrap();
//! let row = to_row(table, &serde_json::json!({"id": "d1", "name": "example.com"}), &Default::default());
//! ```

pub mod fetcher;
pub mod model;
pub mod pager;
pub mod registry;
pub mod row;
pub mod sdk_dispatch;

pub use model::ResourceItem;
pub use pager::{for_each_page, Page, PageSource};
pub use registry::{all_tables, get_table, ColumnDef, ColumnType, TableDef};
pub use row::{parse_timestamp, to_row, Cell, Row};
