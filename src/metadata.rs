//! Catalog metadata discovery.
//!
//! Tables and columns reported by the engine are normalized into
//! JDBC-shaped records and filtered through a per-project exposure policy.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::engine::{CatalogColumn, CatalogTable, Connection};
use crate::error::{GatewayError, Result};

/// Catalog name reported when the source has none.
pub const DEFAULT_CATALOG: &str = "defaultCatalog";

/// Schema name reported when the source has none.
pub const DEFAULT_SCHEMA: &str = "defaultSchema";

/// A table visible to metadata clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub table_cat: String,
    pub table_schem: String,
    pub table_name: String,
    pub table_type: Option<String>,
    pub remarks: Option<String>,
    pub type_cat: Option<String>,
    pub type_schem: Option<String>,
    pub type_name: Option<String>,
    pub self_referencing_col_name: Option<String>,
    pub ref_generation: Option<String>,
    /// Exposed columns of this table, in discovery order.
    pub columns: Vec<ColumnMeta>,
}

impl TableMeta {
    fn from_catalog(table: CatalogTable) -> Self {
        Self {
            table_cat: table.catalog.unwrap_or_else(|| DEFAULT_CATALOG.to_string()),
            table_schem: table.schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            table_name: table.name,
            table_type: table.table_type,
            remarks: table.remarks,
            type_cat: None,
            type_schem: None,
            type_name: None,
            self_referencing_col_name: None,
            ref_generation: None,
            columns: Vec::new(),
        }
    }
}

/// A column visible to metadata clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub table_cat: String,
    pub table_schem: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: i32,
    pub type_name: String,
    pub column_size: i32,
    pub buffer_length: i32,
    pub decimal_digits: i32,
    pub num_prec_radix: i32,
    pub nullable: i32,
    pub remarks: Option<String>,
    pub column_def: Option<String>,
    pub sql_data_type: i32,
    pub sql_datetime_sub: i32,
    pub char_octet_length: i32,
    pub ordinal_position: i32,
    pub is_nullable: String,
    pub scope_catalog: Option<String>,
    pub scope_schema: Option<String>,
    pub scope_table: Option<String>,
    pub source_data_type: i32,
    pub is_autoincrement: String,
}

impl ColumnMeta {
    fn from_catalog(column: CatalogColumn) -> Self {
        Self {
            table_cat: column
                .catalog
                .unwrap_or_else(|| DEFAULT_CATALOG.to_string()),
            table_schem: column.schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            table_name: column.table_name,
            column_name: column.column_name,
            data_type: column.data_type,
            type_name: column.type_name,
            column_size: column.column_size,
            buffer_length: parse_or_sentinel(column.buffer_length.as_deref()),
            decimal_digits: column.decimal_digits,
            num_prec_radix: column.num_prec_radix,
            nullable: column.nullable,
            remarks: column.remarks,
            column_def: column.column_def,
            sql_data_type: parse_or_sentinel(column.sql_data_type.as_deref()),
            sql_datetime_sub: parse_or_sentinel(column.sql_datetime_sub.as_deref()),
            char_octet_length: column.char_octet_length,
            ordinal_position: column.ordinal_position,
            is_nullable: column.is_nullable.unwrap_or_default(),
            scope_catalog: column.scope_catalog,
            scope_schema: column.scope_schema,
            scope_table: column.scope_table,
            source_data_type: parse_or_sentinel(column.source_data_type.as_deref()),
            is_autoincrement: column.is_autoincrement.unwrap_or_default(),
        }
    }
}

/// Parses a numeric attribute some providers report as free text.
/// Missing or malformed values become `-1`.
pub fn parse_or_sentinel(raw: Option<&str>) -> i32 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(-1)
}

/// Decides which tables and columns of a project clients may see.
pub trait ExposurePolicy: Send + Sync {
    fn is_exposed_table(&self, project: &str, schema: &str, table: &str) -> bool;

    fn is_exposed_column(&self, project: &str, schema: &str, table: &str, column: &str) -> bool;
}

/// Exposes everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExposeAll;

impl ExposurePolicy for ExposeAll {
    fn is_exposed_table(&self, _project: &str, _schema: &str, _table: &str) -> bool {
        true
    }

    fn is_exposed_column(&self, _: &str, _: &str, _: &str, _: &str) -> bool {
        true
    }
}

/// Per-project table allow-lists.
///
/// Entries are either `table` or `schema.table` and match
/// case-insensitively. Projects without a list expose every table. A
/// column is exposed iff its table is.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredExposure {
    allowed: HashMap<String, HashSet<String>>,
}

impl ConfiguredExposure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the policy from every project's `exposed_tables`.
    pub fn from_config(config: &Config) -> Self {
        config
            .projects
            .iter()
            .filter_map(|(name, project)| {
                project
                    .exposed_tables
                    .as_ref()
                    .map(|tables| (name.as_str(), tables.as_slice()))
            })
            .fold(Self::new(), |policy, (name, tables)| {
                policy.with_project(name, tables)
            })
    }

    /// Restricts `project` to `tables`.
    pub fn with_project(mut self, project: &str, tables: &[String]) -> Self {
        self.allowed.insert(
            project.to_string(),
            tables.iter().map(|t| t.trim().to_lowercase()).collect(),
        );
        self
    }
}

impl ExposurePolicy for ConfiguredExposure {
    fn is_exposed_table(&self, project: &str, schema: &str, table: &str) -> bool {
        let Some(allowed) = self.allowed.get(project) else {
            return true;
        };
        let table = table.to_lowercase();
        allowed.contains(&table) || allowed.contains(&format!("{}.{}", schema.to_lowercase(), table))
    }

    fn is_exposed_column(&self, project: &str, schema: &str, table: &str, _column: &str) -> bool {
        self.is_exposed_table(project, schema, table)
    }
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}#{}", schema, table)
}

pub(crate) fn into_metadata_error(error: GatewayError) -> GatewayError {
    match error {
        GatewayError::Metadata(_) | GatewayError::Cancelled => error,
        other => GatewayError::metadata(other.to_string()),
    }
}

/// Reads the catalog through `conn` and returns the exposed tables of
/// `project`, each carrying its exposed columns.
///
/// Columns whose table was not accepted are dropped, never reattached.
pub async fn discover(
    conn: &mut dyn Connection,
    policy: &dyn ExposurePolicy,
    project: &str,
) -> Result<Vec<TableMeta>> {
    let mut tables = Vec::new();
    let mut index = HashMap::new();

    for table in conn.tables().await.map_err(into_metadata_error)? {
        let table = TableMeta::from_catalog(table);
        if !policy.is_exposed_table(project, &table.table_schem, &table.table_name) {
            continue;
        }
        index.insert(table_key(&table.table_schem, &table.table_name), tables.len());
        tables.push(table);
    }

    let mut skipped = 0usize;
    for column in conn.columns().await.map_err(into_metadata_error)? {
        let column = ColumnMeta::from_catalog(column);
        let Some(&position) = index.get(&table_key(&column.table_schem, &column.table_name))
        else {
            skipped += 1;
            continue;
        };
        if policy.is_exposed_column(
            project,
            &column.table_schem,
            &column.table_name,
            &column.column_name,
        ) {
            tables[position].columns.push(column);
        }
    }

    debug!(
        "Discovered {} tables for project {} ({} columns skipped)",
        tables.len(),
        project,
        skipped
    );
    Ok(tables)
}
