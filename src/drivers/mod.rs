pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use crate::DatabaseDriver;
use crate::core::{CopyError, CopyRow, PageCursor, SqlValue, TableDescriptor};

/// The SQL variant and operational idioms of a database engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positional parameter style of the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (MySQL, SQLite)
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    Numbered,
}

/// Hard cap of bound parameters per generated statement.
pub const MAX_BIND_PARAMETERS: usize = 65_000;

/// Maximum rows per multi-row INSERT so that `rows * columns` stays
/// within [`MAX_BIND_PARAMETERS`]. Always at least 1, even for tables
/// wider than the cap.
#[must_use]
pub fn rows_per_insert(column_count: usize) -> usize {
    if column_count == 0 {
        return 1;
    }
    (MAX_BIND_PARAMETERS / column_count).max(1)
}

/// Connects to the database behind `url` and wraps it in the driver for
/// its family. The dialect is selected here, once per connection.
pub async fn create_driver(url: &str) -> Result<Box<dyn DatabaseDriver>, CopyError> {
    if url.starts_with("mysql://") {
        Ok(Box::new(MySqlDriver::connect(url).await?))
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Box::new(PostgresDriver::connect(url).await?))
    } else if url.starts_with("sqlite:") {
        Ok(Box::new(SqliteDriver::connect(url).await?))
    } else {
        Err(CopyError::UnsupportedUrl {
            url: url.to_string(),
        })
    }
}

/// Backtick quoting for MySQL identifiers.
#[must_use]
pub fn quote_mysql_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Double-quote quoting for PostgreSQL and SQLite identifiers.
#[must_use]
pub fn quote_ansi_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_primary_key_columns(table: &TableDescriptor) -> Vec<&str> {
    table
        .primary_key_columns
        .iter()
        .map(|pk| {
            table
                .columns
                .get(pk)
                .map_or(pk.as_str(), |c| c.quoted_name.as_str())
        })
        .collect()
}

/// Builds the SELECT for one page of a table.
///
/// Single-column primary keys page by keyset: `WHERE pk > ?` once a key
/// value is known, ordered by the key. Zero or composite keys page by
/// OFFSET, ordered by all key columns (or database order if there are
/// none, which is a documented fragility under concurrent writes).
#[must_use]
pub fn page_query(
    table: &TableDescriptor,
    cursor: &PageCursor,
    batch: usize,
    style: Placeholder,
) -> String {
    let mut query = format!("SELECT * FROM {}", table.quoted_name);
    let key_columns = quoted_primary_key_columns(table);

    if key_columns.len() == 1 && cursor.last_primary_key.is_some() {
        let param = match style {
            Placeholder::Question => "?".to_string(),
            Placeholder::Numbered => "$1".to_string(),
        };
        query.push_str(&format!(" WHERE {} > {param}", key_columns[0]));
    }
    if !key_columns.is_empty() {
        query.push_str(&format!(" ORDER BY {}", key_columns.join(", ")));
    }
    query.push_str(&format!(" LIMIT {batch}"));
    if key_columns.len() != 1 {
        query.push_str(&format!(" OFFSET {}", cursor.offset));
    }

    query
}

/// Builds a multi-row INSERT with positional placeholders, row-major.
/// Values are never interpolated into the statement text.
#[must_use]
pub fn insert_statement(
    quoted_table: &str,
    quoted_columns: &[String],
    row_count: usize,
    style: Placeholder,
) -> String {
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        quoted_table,
        quoted_columns.join(", ")
    );

    let mut param = 0usize;
    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let placeholders: Vec<String> = quoted_columns
            .iter()
            .map(|_| {
                param += 1;
                match style {
                    Placeholder::Question => "?".to_string(),
                    Placeholder::Numbered => format!("${param}"),
                }
            })
            .collect();
        rows.push(format!("({})", placeholders.join(", ")));
    }
    sql.push_str(&rows.join(", "));

    sql
}

/// Applies the per-value fixups needed for a clean insert:
///
/// 1. An empty string headed for a column whose destination type contains
///    `json` becomes the empty-object literal `{}`; databases reject the
///    empty string as invalid JSON.
/// 2. PostgreSQL destinations get NUL characters stripped from every
///    non-empty string value; the text protocol cannot carry them.
pub fn sanitize_row(row: &mut CopyRow, destination: &TableDescriptor, dialect: Dialect) {
    for (column, value) in row.iter_mut() {
        let is_json_column = destination
            .columns
            .get(column)
            .is_some_and(|c| c.type_name.contains("json"));

        if is_json_column && matches!(value, SqlValue::Text(s) if s.is_empty()) {
            *value = SqlValue::Text("{}".to_string());
            continue;
        }

        if dialect == Dialect::Postgres
            && let SqlValue::Text(s) = value
            && !s.is_empty()
            && s.contains('\0')
        {
            *value = SqlValue::Text(s.replace('\0', ""));
        }
    }
}
