use crate::DatabaseDriver;
use crate::core::{
    ColumnDescriptor, CopyError, CopyRow, PageCursor, SqlValue, TableDescriptor, TableSet,
};
use crate::drivers::{self, Dialect, Placeholder};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Row, Sqlite, TypeInfo, ValueRef};
use tokio::sync::Mutex;

/// Driver for SQLite databases, bound to a single connection. In-memory
/// databases (`sqlite::memory:`) live and die with this connection.
pub struct SqliteDriver {
    conn: Mutex<SqliteConnection>,
}

impl SqliteDriver {
    pub async fn connect(url: &str) -> Result<Self, CopyError> {
        let conn = SqliteConnection::connect(url).await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn decode<'r, T>(
    row: &'r SqliteRow,
    idx: usize,
    column: &str,
    type_name: &str,
) -> Result<Option<T>, CopyError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get::<Option<T>, _>(idx)
        .map_err(|e| CopyError::ColumnDecode {
            column: column.to_string(),
            type_name: type_name.to_string(),
            source: e,
        })
}

/// SQLite columns are dynamically typed; the declared column type says
/// little about what a given row actually stores. Decoding therefore
/// follows the runtime storage class of each value.
fn decode_row(row: &SqliteRow) -> Result<CopyRow, CopyError> {
    let mut out = CopyRow::new();

    for (idx, col) in row.columns().iter().enumerate() {
        let name = col.name();
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            out.insert(name.to_string(), SqlValue::Null);
            continue;
        }
        let type_name = raw.type_info().name().to_string();

        let value = match type_name.as_str() {
            "INTEGER" => decode::<i64>(row, idx, name, &type_name)?.map(SqlValue::Integer),
            "BOOLEAN" => decode::<bool>(row, idx, name, &type_name)?.map(SqlValue::Boolean),
            "REAL" | "NUMERIC" => decode::<f64>(row, idx, name, &type_name)?.map(SqlValue::Float),
            "BLOB" => decode::<Vec<u8>>(row, idx, name, &type_name)?.map(SqlValue::Bytes),
            "TEXT" | "DATE" | "TIME" | "DATETIME" => {
                decode::<String>(row, idx, name, &type_name)?.map(SqlValue::Text)
            }
            other => match decode::<String>(row, idx, name, other) {
                Ok(v) => v.map(SqlValue::Text),
                Err(_) => decode::<Vec<u8>>(row, idx, name, other)?.map(SqlValue::Bytes),
            },
        };

        out.insert(name.to_string(), value.unwrap_or(SqlValue::Null));
    }

    Ok(out)
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(v) => query.bind(v),
        // SQLite integers are signed 64-bit; larger values survive as text
        SqlValue::UnsignedInteger(v) => match i64::try_from(v) {
            Ok(v) => query.bind(v),
            Err(_) => query.bind(v.to_string()),
        },
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Boolean(v) => query.bind(v),
        SqlValue::Decimal(v) => query.bind(v.to_string()),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
        SqlValue::Uuid(v) => query.bind(v.to_string()),
        SqlValue::Json(v) => query.bind(v.to_string()),
        SqlValue::Inet(v) => query.bind(v.to_string()),
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn quote_identifier(&self, name: &str) -> String {
        drivers::quote_ansi_identifier(name)
    }

    async fn execute(&self, sql: &str) -> Result<u64, CopyError> {
        tracing::debug!(query = %sql, "sqlite execute");
        let mut conn = self.conn.lock().await;
        let done = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(done.rows_affected())
    }

    async fn fetch_table_set(&self) -> Result<TableSet, CopyError> {
        let mut conn = self.conn.lock().await;
        let mut tables = TableSet::new();

        let table_rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await?;

        for table_row in &table_rows {
            let table_name: String = table_row.try_get(0)?;
            let quoted_name = drivers::quote_ansi_identifier(&table_name);
            let mut table = TableDescriptor::new(&table_name, &quoted_name);

            // PRAGMA table_info: cid, name, type, notnull, dflt_value, pk.
            // The pk column carries the 1-based position within the
            // primary key, 0 for non-key columns.
            let info_sql = format!("PRAGMA table_info({quoted_name})");
            let column_rows = sqlx::query(&info_sql).fetch_all(&mut *conn).await?;

            let mut key_columns: Vec<(i64, String)> = Vec::new();
            for column_row in &column_rows {
                let column_name: String = column_row.try_get(1)?;
                let type_name: String = column_row.try_get::<String, _>(2)?.to_lowercase();
                let pk_position: i64 = column_row.try_get(5)?;

                if pk_position > 0 {
                    key_columns.push((pk_position, column_name.clone()));
                }
                table.columns.insert(
                    column_name.clone(),
                    ColumnDescriptor {
                        quoted_name: drivers::quote_ansi_identifier(&column_name),
                        type_name,
                    },
                );
            }
            key_columns.sort_by_key(|(position, _)| *position);
            table.primary_key_columns = key_columns.into_iter().map(|(_, name)| name).collect();

            let count_sql = format!("SELECT count(*) FROM {quoted_name}");
            tracing::debug!(query = %count_sql, "sqlite table stats");
            let row_count: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *conn).await?;
            table.row_count = row_count;

            tables.insert(table_name, table);
        }

        Ok(tables)
    }

    async fn fetch_page(
        &self,
        table: &TableDescriptor,
        cursor: &PageCursor,
        batch: usize,
    ) -> Result<Vec<CopyRow>, CopyError> {
        let sql = drivers::page_query(table, cursor, batch, Placeholder::Question);
        tracing::debug!(table = %table.name, query = %sql, "sqlite fetch page");

        let mut query = sqlx::query(&sql);
        if table.primary_key_columns.len() == 1
            && let Some(last) = cursor.last_primary_key.as_ref()
        {
            query = bind_value(query, last.clone());
        }

        let mut conn = self.conn.lock().await;
        let rows = query.fetch_all(&mut *conn).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn insert_chunk(
        &self,
        table: &TableDescriptor,
        rows: &[CopyRow],
    ) -> Result<(), CopyError> {
        let Some(first_row) = rows.first() else {
            return Ok(());
        };

        let columns: Vec<String> = first_row.keys().cloned().collect();
        let quoted_columns: Vec<String> = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        let sql = drivers::insert_statement(
            &table.quoted_name,
            &quoted_columns,
            rows.len(),
            Placeholder::Question,
        );
        tracing::debug!(table = %table.name, rows = rows.len(), "sqlite insert chunk");

        let mut query = sqlx::query(&sql);
        for row in rows {
            for column in &columns {
                let value = row.get(column).cloned().unwrap_or(SqlValue::Null);
                query = bind_value(query, value);
            }
        }

        let mut conn = self.conn.lock().await;
        query
            .execute(&mut *conn)
            .await
            .map_err(|e| CopyError::Insert {
                table: table.name.clone(),
                source: e,
            })?;
        Ok(())
    }

    async fn toggle_foreign_key_checks(&self, enabled: bool) -> Result<(), CopyError> {
        self.execute(&format!(
            "PRAGMA foreign_keys = {}",
            if enabled { 1 } else { 0 }
        ))
        .await?;
        Ok(())
    }

    /// SQLite has no TRUNCATE statement; an unqualified DELETE takes the
    /// truncate optimization path instead.
    async fn truncate(&self, quoted_table: &str) -> Result<(), CopyError> {
        self.execute(&format!("DELETE FROM {quoted_table}")).await?;
        Ok(())
    }
}
