//! Core data structures for the table-copy engine.
//!
//! This module defines the fundamental types used throughout tablesmith:
//! - Schema descriptors built from live introspection (tables, columns, keys)
//! - Universal value types for cross-database data representation
//! - Pagination cursors for keyset and offset paging
//! - Run parameters and the final run outcome
//! - Error types for database operations

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use thiserror::Error;

/// A single column as seen by the schema inspector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Identifier quoted for the dialect of the inspected connection
    pub quoted_name: String,
    /// Normalized type name as reported by the database catalog (lowercase)
    pub type_name: String,
}

/// A table as seen by the schema inspector: name, quoting, row count,
/// primary key and columns.
///
/// Built fresh per run from the live schema and immutable afterwards.
/// Source and destination descriptors for the same table differ only in
/// quoting and type names when the dialects differ.
///
/// # Examples
///
/// ```
/// use tablesmith::core::TableDescriptor;
///
/// let table = TableDescriptor::new("users", "`users`");
/// assert_eq!(table.name, "users");
/// assert!(table.primary_key_columns.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableDescriptor {
    /// Unquoted table name
    pub name: String,
    /// Identifier quoted for the dialect of the inspected connection
    pub quoted_name: String,
    /// Exact row count at inspection time (`SELECT count(*)`)
    pub row_count: i64,
    /// Ordered primary key column names, empty if the table has none
    pub primary_key_columns: Vec<String>,
    /// Columns keyed by unquoted name, in catalog order
    pub columns: IndexMap<String, ColumnDescriptor>,
}

impl TableDescriptor {
    #[must_use]
    pub fn new(name: &str, quoted_name: &str) -> Self {
        Self {
            name: name.to_string(),
            quoted_name: quoted_name.to_string(),
            ..Default::default()
        }
    }
}

/// All tables visible to one connection, keyed by unquoted table name.
///
/// Invariant: the keys equal the live table names at inspection time.
/// There is no caching across runs.
pub type TableSet = IndexMap<String, TableDescriptor>;

/// One fetched (or to-be-inserted) row. Keys are unquoted column names in
/// `SELECT *` order; the order is significant because the generated INSERT
/// takes its column list from the first row of a chunk.
pub type CopyRow = IndexMap<String, SqlValue>;

/// One table scheduled for copying, carrying the descriptor of both ends.
#[derive(Debug, Clone)]
pub struct CopyEntry {
    pub source: TableDescriptor,
    pub destination: TableDescriptor,
}

/// The resolved, filtered list of tables to transfer in a run.
///
/// Invariant: every entry has the same table name on both sides. Column
/// compatibility is deliberately not verified here; a width or type
/// mismatch surfaces as a runtime insert failure.
#[derive(Debug, Clone, Default)]
pub struct CopyPlan {
    pub entries: Vec<CopyEntry>,
    /// Tables present in the source but absent at the destination
    pub missing_tables: Vec<String>,
}

impl CopyPlan {
    /// Sum of source row counts, used as the progress total.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::try_from(e.source.row_count).unwrap_or(0))
            .sum()
    }
}

/// Per-table pagination state, threaded through each page fetch.
///
/// For tables with exactly one primary key column the copier pages by
/// key value (`WHERE pk > last`); for zero or composite keys it pages by
/// offset. Offset paging without a primary key has no stable order and
/// is a documented fragility under concurrent source writes.
///
/// # Examples
///
/// ```
/// use tablesmith::core::PageCursor;
///
/// let cursor = PageCursor::default();
/// assert_eq!(cursor.offset, 0);
/// assert!(cursor.last_primary_key.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PageCursor {
    /// Rows fetched so far, used for OFFSET paging
    pub offset: u64,
    /// Highest key value seen, used for keyset paging
    pub last_primary_key: Option<SqlValue>,
}

impl PageCursor {
    /// Advances the cursor past a fetched page. Captures the key value of
    /// the last row when the table pages by keyset; pages are ordered by
    /// the key column, so the last row holds the page maximum.
    pub fn advance(&mut self, table: &TableDescriptor, rows: &[CopyRow]) {
        self.offset += rows.len() as u64;

        if table.primary_key_columns.len() == 1
            && let Some(last_row) = rows.last()
            && let Some(value) = last_row.get(&table.primary_key_columns[0])
        {
            self.last_primary_key = Some(value.clone());
        }
    }
}

/// Caller-supplied parameters for one copy run.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Rows per SELECT page (default 1000)
    pub batch_size: usize,
    /// Skip tables missing at the destination instead of aborting
    pub ignore_missing_tables: bool,
    /// Truncate each destination table right before its copy
    pub truncate_before_insert: bool,
    /// Execute the full write path but roll back at the end
    pub dry_run: bool,
    /// Hide the progress bar
    pub quiet: bool,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            ignore_missing_tables: false,
            truncate_before_insert: false,
            dry_run: false,
            quiet: false,
        }
    }
}

/// Final result of a copy run. Never persisted beyond the run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Rows copied per table, in copy order
    pub rows_copied: IndexMap<String, u64>,
    /// Total rows copied across all tables
    pub total_rows: u64,
    /// `false` exactly when the run was a dry run and got rolled back
    pub committed: bool,
}

/// One sequence adjusted during reconciliation, reported for logging.
#[derive(Debug, Clone)]
pub struct SequenceUpdate {
    /// Fully qualified sequence name
    pub sequence: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    /// Value the sequence was set to, `None` when the column was empty
    pub value: Option<i64>,
}

/// Universal value type for cross-database data representation.
///
/// Provides a common representation for values read from any of the
/// supported database families, so a page fetched from one dialect can be
/// bound positionally into an INSERT on another.
///
/// # Examples
///
/// ```
/// use tablesmith::core::SqlValue;
///
/// let int_val = SqlValue::Integer(42);
/// let text_val = SqlValue::Text("hello".to_string());
/// let null_val = SqlValue::Null;
/// assert_ne!(int_val, null_val);
/// # let _ = text_val;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value
    Null,
    /// Signed 64-bit integer
    Integer(i64),
    /// Unsigned 64-bit integer (MySQL unsigned columns)
    UnsignedInteger(u64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 text string
    Text(String),
    /// Binary data (BLOB, BYTEA)
    Bytes(Vec<u8>),
    /// Boolean value
    Boolean(bool),
    /// Arbitrary precision decimal
    Decimal(Decimal),
    /// Date without time
    Date(NaiveDate),
    /// Time without date
    Time(NaiveTime),
    /// Date and time without timezone
    DateTime(NaiveDateTime),
    /// Date and time with timezone (TIMESTAMP/TIMESTAMPTZ)
    Timestamp(DateTime<Utc>),
    /// UUID value
    Uuid(sqlx::types::Uuid),
    /// JSON value
    Json(serde_json::Value),
    /// IP network address (PostgreSQL INET/CIDR)
    Inet(sqlx::types::ipnetwork::IpNetwork),
}

/// Error types for tablesmith operations.
///
/// Provides detailed error information for introspection, copying and
/// configuration failures. None of these are retried; every data-layer
/// error surfaces at the top level and aborts the run.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Standard database error from sqlx.
    ///
    /// Automatically converted from `sqlx::Error` via the `?` operator.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A connection name was requested that the configuration does not define.
    #[error("Connection `{name}` is not configured in [connections]")]
    UnknownConnection { name: String },

    /// The connection URL does not match any supported database family.
    #[error("Unsupported database protocol in URL: {url}")]
    UnsupportedUrl { url: String },

    /// Tables exist in the source but not at the destination and skipping
    /// them was not allowed.
    #[error("The following tables are missing at the destination: {}", .tables.join(", "))]
    MissingDestinationTables { tables: Vec<String> },

    /// Column data decoding error.
    ///
    /// The type is recognized but the actual data cannot be decoded.
    #[error("Error decoding column '{column}' (type: {type_name}): {source}")]
    ColumnDecode {
        column: String,
        type_name: String,
        source: sqlx::Error,
    },

    /// A column type the engine cannot represent yet.
    #[error("{dialect}: column '{column}' has unsupported type '{type_name}'")]
    UnsupportedColumnType {
        dialect: crate::drivers::Dialect,
        column: String,
        type_name: String,
    },

    /// A multi-row INSERT failed; identifies the failing table.
    #[error("Insert into table {table} failed: {source}")]
    Insert { table: String, source: sqlx::Error },

    /// A configured structure command exited unsuccessfully.
    #[error("Structure command `{name}` failed with {status}")]
    StructureCommand { name: String, status: String },

    /// General internal error.
    ///
    /// Indicates an unexpected internal state that should not occur during
    /// normal operation.
    #[error("General internal error: {0}")]
    Internal(String),
}
