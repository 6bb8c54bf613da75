//! Table Registry - Load table definitions from JSON
//!
//! This module loads all table schemas from embedded JSON files and provides
//! lookup functions for the rest of the crate.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded table JSON files (compiled into the binary)
const TABLE_FILES: &[&str] = &[
    include_str!("../resources/compute.json"),
    include_str!("../resources/storage.json"),
    include_str!("../resources/network.json"),
    include_str!("../resources/services.json"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Int,
    Double,
    Bool,
    Timestamp,
    Json,
}

/// Column definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub description: String,
    /// Dot path into the resource document; defaults to the column name
    #[serde(default)]
    pub path: Option<String>,
    /// Zero is a real value for this column, not "unknown"
    #[serde(default)]
    pub keep_zero: bool,
    /// Extra per-row call needed to fill this column
    #[serde(default)]
    pub hydrate: Option<String>,
    /// Column echoes a qualifier instead of a provider field
    #[serde(default)]
    pub from_qual: Option<String>,
}

impl ColumnDef {
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListDef {
    pub method: String,
    #[serde(default)]
    pub required_quals: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetDef {
    pub method: String,
    pub key_column: String,
}

/// Table definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    /// Filled from the map key on load
    #[serde(default)]
    pub name: String,
    pub description: String,
    pub list: ListDef,
    #[serde(default)]
    pub get: Option<GetDef>,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether any requested column needs the given hydration. `None` means
    /// every column was requested.
    pub fn needs_hydrate(&self, hydrate: &str, requested: Option<&[String]>) -> bool {
        self.columns
            .iter()
            .filter(|c| c.hydrate.as_deref() == Some(hydrate))
            .any(|c| requested.is_none_or(|cols| cols.iter().any(|r| *r == c.name)))
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub tables: HashMap<String, TableDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<TableConfig> = OnceLock::new();

/// Get the table registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static TableConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = TableConfig {
            tables: HashMap::new(),
        };

        for content in TABLE_FILES {
            let partial: TableConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded table JSON: {}", e));
            for (key, mut table) in partial.tables {
                table.name = key.clone();
                final_config.tables.insert(key, table);
            }
        }

        final_config
    })
}

/// Get a table definition by name
pub fn get_table(name: &str) -> Option<&'static TableDef> {
    get_registry().tables.get(name)
}

/// All table definitions, sorted by name
pub fn all_tables() -> Vec<&'static TableDef> {
    let mut tables: Vec<_> = get_registry().tables.values().collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));
    tables
}
