//! Host-facing API
//!
//! The host engine calls [`Plugin::list`] and [`Plugin::get`] per table with
//! the qualifiers it extracted from the query. Listed rows are streamed into a
//! [`RowSink`] as pages arrive.

use crate::config::ConnectionConfig;
use crate::context::QueryContext;
use crate::error::{Error, Result};
use crate::rackspace::client::Connection;
use crate::resource::registry::{all_tables, get_table, TableDef};
use crate::resource::row::{to_row, Row};
use crate::resource::sdk_dispatch;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// One List or Get request from the host
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Equality qualifiers, by column name
    pub quals: BTreeMap<String, String>,
    /// Columns the host will read; `None` means all of them
    pub columns: Option<Vec<String>>,
    pub ctx: QueryContext,
}

impl Query {
    pub fn new(ctx: QueryContext) -> Self {
        Self {
            ctx,
            ..Default::default()
        }
    }

    pub fn with_qual(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.quals.insert(column.into(), value.into());
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn qual(&self, column: &str) -> Option<&str> {
        self.quals.get(column).map(String::as_str)
    }

    /// Whether a requested column needs the given per-row hydration
    pub fn wants(&self, table: &TableDef, hydrate: &str) -> bool {
        table.needs_hydrate(hydrate, self.columns.as_deref())
    }
}

/// Where listed rows go
#[derive(Debug, Clone)]
pub struct RowSink {
    tx: mpsc::Sender<Row>,
}

impl RowSink {
    /// Create a sink and the receiver the host reads rows from
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Row>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Send a row. Returns `false` once the host stopped reading.
    pub async fn send(&self, row: Row) -> bool {
        self.tx.send(row).await.is_ok()
    }
}

/// The Rackspace data source, bound to one connection
pub struct Plugin {
    connection: Connection,
}

impl Plugin {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Ok(Self {
            connection: Connection::new(config)?,
        })
    }

    pub fn with_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Schemas of every table, sorted by name
    pub fn tables(&self) -> Vec<&'static TableDef> {
        all_tables()
    }

    /// Stream every row of `table` into `sink`
    pub async fn list(&self, table: &str, query: &Query, sink: &RowSink) -> Result<()> {
        let def = get_table(table).ok_or_else(|| Error::UnknownTable(table.to_string()))?;

        if let Some(missing) = def
            .list
            .required_quals
            .iter()
            .find(|q| query.qual(q).is_none_or(|v| v.trim().is_empty()))
        {
            return Err(Error::MissingQualifier(missing.clone()));
        }

        tracing::info!("list {} ({})", def.name, def.list.method);
        let result = sdk_dispatch::invoke_list(&self.connection, def, query, sink).await;
        if let Err(e) = &result {
            tracing::error!("list {} failed: {}", def.name, e);
        }
        result
    }

    /// Fetch the row of `table` whose key column equals the query's qualifier.
    ///
    /// A key that matches nothing, or an empty key, is `Ok(None)`.
    pub async fn get(&self, table: &str, query: &Query) -> Result<Option<Row>> {
        let def = get_table(table).ok_or_else(|| Error::UnknownTable(table.to_string()))?;
        let get = def
            .get
            .as_ref()
            .ok_or_else(|| Error::NoKeyLookup(def.name.clone()))?;

        let key = query.qual(&get.key_column).unwrap_or_default().trim();
        if key.is_empty() {
            tracing::debug!("get {}: empty key", def.name);
            return Ok(None);
        }

        tracing::info!("get {} {}={}", def.name, get.key_column, key);
        match sdk_dispatch::invoke_get(&self.connection, def, query, key).await {
            Ok(item) => Ok(Some(to_row(def, &item.to_document()?, &query.quals))),
            Err(e) if e.is_not_found() => {
                tracing::debug!("get {}: {}", def.name, e);
                Ok(None)
            }
            Err(e) => {
                tracing::error!("get {} failed: {}", def.name, e);
                Err(e)
            }
        }
    }
}
