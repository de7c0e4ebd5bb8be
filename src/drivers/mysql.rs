use crate::DatabaseDriver;
use crate::core::{
    ColumnDescriptor, CopyError, CopyRow, PageCursor, SqlValue, TableDescriptor, TableSet,
};
use crate::drivers::{self, Dialect, Placeholder};
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, MySql, Row, TypeInfo};
use tokio::sync::Mutex;

/// Driver for MySQL-family databases, bound to a single connection so
/// that transaction state and session variables stick to the session the
/// copy runs on.
pub struct MySqlDriver {
    conn: Mutex<MySqlConnection>,
}

impl MySqlDriver {
    pub async fn connect(url: &str) -> Result<Self, CopyError> {
        let conn = MySqlConnection::connect(url).await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Reads a string column that MySQL may report as VARBINARY depending on
/// collation (information_schema does this for some server versions).
/// Failing both decodes is fatal; introspection must never drop names.
fn string_at(row: &MySqlRow, idx: usize) -> Result<String, CopyError> {
    match row.try_get::<String, _>(idx) {
        Ok(value) => Ok(value),
        Err(_) => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn decode<'r, T>(
    row: &'r MySqlRow,
    idx: usize,
    column: &str,
    type_name: &str,
) -> Result<Option<T>, CopyError>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<Option<T>, _>(idx)
        .map_err(|e| CopyError::ColumnDecode {
            column: column.to_string(),
            type_name: type_name.to_string(),
            source: e,
        })
}

fn decode_row(row: &MySqlRow) -> Result<CopyRow, CopyError> {
    let mut out = CopyRow::new();

    for (idx, col) in row.columns().iter().enumerate() {
        let name = col.name();
        let type_name = col.type_info().name();

        let value = match type_name {
            t if t.contains("UNSIGNED") => {
                decode::<u64>(row, idx, name, t)?.map(SqlValue::UnsignedInteger)
            }
            "BOOLEAN" => decode::<bool>(row, idx, name, type_name)?.map(SqlValue::Boolean),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                decode::<i64>(row, idx, name, type_name)?.map(SqlValue::Integer)
            }
            "YEAR" => {
                decode::<u16>(row, idx, name, type_name)?.map(|v| SqlValue::Integer(i64::from(v)))
            }
            "FLOAT" => {
                decode::<f32>(row, idx, name, type_name)?.map(|v| SqlValue::Float(f64::from(v)))
            }
            "DOUBLE" => decode::<f64>(row, idx, name, type_name)?.map(SqlValue::Float),
            "DECIMAL" => {
                decode::<rust_decimal::Decimal>(row, idx, name, type_name)?.map(SqlValue::Decimal)
            }
            "DATE" => decode::<chrono::NaiveDate>(row, idx, name, type_name)?.map(SqlValue::Date),
            "TIME" => decode::<chrono::NaiveTime>(row, idx, name, type_name)?.map(SqlValue::Time),
            "DATETIME" => {
                decode::<chrono::NaiveDateTime>(row, idx, name, type_name)?.map(SqlValue::DateTime)
            }
            "TIMESTAMP" => decode::<chrono::DateTime<chrono::Utc>>(row, idx, name, type_name)?
                .map(SqlValue::Timestamp),
            "JSON" => decode::<serde_json::Value>(row, idx, name, type_name)?.map(SqlValue::Json),
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => decode::<String>(row, idx, name, type_name)?.map(SqlValue::Text),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => decode::<Vec<u8>>(row, idx, name, type_name)?.map(SqlValue::Bytes),
            "NULL" => None,
            // MySQL reports more names than the protocol distinguishes;
            // try text first, then raw bytes.
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
    query: Query<'q, MySql, MySqlArguments>,
    value: SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::UnsignedInteger(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Boolean(v) => query.bind(v),
        SqlValue::Decimal(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
        SqlValue::Uuid(v) => query.bind(v.to_string()),
        SqlValue::Json(v) => query.bind(v),
        SqlValue::Inet(v) => query.bind(v.to_string()),
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote_identifier(&self, name: &str) -> String {
        drivers::quote_mysql_identifier(name)
    }

    async fn execute(&self, sql: &str) -> Result<u64, CopyError> {
        tracing::debug!(query = %sql, "mysql execute");
        let mut conn = self.conn.lock().await;
        let done = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(done.rows_affected())
    }

    async fn fetch_table_set(&self) -> Result<TableSet, CopyError> {
        let mut conn = self.conn.lock().await;
        let mut tables = TableSet::new();

        let table_rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&mut *conn)
        .await?;

        for table_row in &table_rows {
            let table_name = string_at(table_row, 0)?;
            let quoted_name = drivers::quote_mysql_identifier(&table_name);
            let mut table = TableDescriptor::new(&table_name, &quoted_name);

            let column_rows = sqlx::query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? \
                 ORDER BY ordinal_position",
            )
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await?;

            for column_row in &column_rows {
                let column_name = string_at(column_row, 0)?;
                let type_name = string_at(column_row, 1)?.to_lowercase();
                table.columns.insert(
                    column_name.clone(),
                    ColumnDescriptor {
                        quoted_name: drivers::quote_mysql_identifier(&column_name),
                        type_name,
                    },
                );
            }

            let key_rows = sqlx::query(
                "SELECT column_name FROM information_schema.key_column_usage \
                 WHERE table_schema = DATABASE() AND table_name = ? \
                 AND constraint_name = 'PRIMARY' \
                 ORDER BY ordinal_position",
            )
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await?;
            table.primary_key_columns = key_rows
                .iter()
                .map(|r| string_at(r, 0))
                .collect::<Result<_, _>>()?;

            let count_sql = format!("SELECT count(*) FROM {quoted_name}");
            tracing::debug!(query = %count_sql, "mysql table stats");
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
        tracing::debug!(table = %table.name, query = %sql, "mysql fetch page");

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
        tracing::debug!(table = %table.name, rows = rows.len(), "mysql insert chunk");

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
            "SET foreign_key_checks = {}",
            if enabled { 1 } else { 0 }
        ))
        .await?;
        Ok(())
    }
}
