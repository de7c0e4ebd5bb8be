use crate::DatabaseDriver;
use crate::core::{
    ColumnDescriptor, CopyError, CopyRow, PageCursor, SequenceUpdate, SqlValue, TableDescriptor,
    TableSet,
};
use crate::drivers::{self, Dialect, Placeholder};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::types::Uuid;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Column, Connection, Postgres, Row, TypeInfo};
use tokio::sync::Mutex;

/// Driver for PostgreSQL-family databases, bound to a single connection
/// so that the long-lived transaction and session settings stick to the
/// session the copy runs on.
pub struct PostgresDriver {
    conn: Mutex<PgConnection>,
}

impl PostgresDriver {
    pub async fn connect(url: &str) -> Result<Self, CopyError> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn decode<'r, T>(
    row: &'r PgRow,
    idx: usize,
    column: &str,
    type_name: &str,
) -> Result<Option<T>, CopyError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
        .map_err(|e| CopyError::ColumnDecode {
            column: column.to_string(),
            type_name: type_name.to_string(),
            source: e,
        })
}

fn decode_row(row: &PgRow) -> Result<CopyRow, CopyError> {
    let mut out = CopyRow::new();

    for (idx, col) in row.columns().iter().enumerate() {
        let name = col.name();
        let type_name = col.type_info().name();

        let value = match type_name {
            "BOOL" => decode::<bool>(row, idx, name, type_name)?.map(SqlValue::Boolean),
            "INT2" => {
                decode::<i16>(row, idx, name, type_name)?.map(|v| SqlValue::Integer(i64::from(v)))
            }
            "INT4" => {
                decode::<i32>(row, idx, name, type_name)?.map(|v| SqlValue::Integer(i64::from(v)))
            }
            "INT8" => decode::<i64>(row, idx, name, type_name)?.map(SqlValue::Integer),
            "FLOAT4" => {
                decode::<f32>(row, idx, name, type_name)?.map(|v| SqlValue::Float(f64::from(v)))
            }
            "FLOAT8" => decode::<f64>(row, idx, name, type_name)?.map(SqlValue::Float),
            "NUMERIC" => decode::<Decimal>(row, idx, name, type_name)?.map(SqlValue::Decimal),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                decode::<String>(row, idx, name, type_name)?.map(SqlValue::Text)
            }
            "BYTEA" => decode::<Vec<u8>>(row, idx, name, type_name)?.map(SqlValue::Bytes),
            "DATE" => decode::<NaiveDate>(row, idx, name, type_name)?.map(SqlValue::Date),
            "TIME" => decode::<NaiveTime>(row, idx, name, type_name)?.map(SqlValue::Time),
            "TIMESTAMP" => {
                decode::<NaiveDateTime>(row, idx, name, type_name)?.map(SqlValue::DateTime)
            }
            "TIMESTAMPTZ" => {
                decode::<DateTime<Utc>>(row, idx, name, type_name)?.map(SqlValue::Timestamp)
            }
            "UUID" => decode::<Uuid>(row, idx, name, type_name)?.map(SqlValue::Uuid),
            "JSON" | "JSONB" => {
                decode::<serde_json::Value>(row, idx, name, type_name)?.map(SqlValue::Json)
            }
            "INET" | "CIDR" => decode::<IpNetwork>(row, idx, name, type_name)?.map(SqlValue::Inet),
            other => {
                return Err(CopyError::UnsupportedColumnType {
                    dialect: Dialect::Postgres,
                    column: name.to_string(),
                    type_name: other.to_string(),
                });
            }
        };

        out.insert(name.to_string(), value.unwrap_or(SqlValue::Null));
    }

    Ok(out)
}

/// Binds a NULL with the parameter type the destination column expects.
/// The extended protocol rejects a parameter whose declared type has no
/// assignment cast to the column, even when the value is NULL.
fn bind_typed_null<'q>(
    query: Query<'q, Postgres, PgArguments>,
    declared_type: Option<&str>,
) -> Query<'q, Postgres, PgArguments> {
    match declared_type.unwrap_or("") {
        t if t.contains("int") => query.bind(None::<i64>),
        "boolean" => query.bind(None::<bool>),
        "numeric" => query.bind(None::<Decimal>),
        "real" | "double precision" => query.bind(None::<f64>),
        "date" => query.bind(None::<NaiveDate>),
        "time without time zone" => query.bind(None::<NaiveTime>),
        "timestamp without time zone" => query.bind(None::<NaiveDateTime>),
        "timestamp with time zone" => query.bind(None::<DateTime<Utc>>),
        "uuid" => query.bind(None::<Uuid>),
        "json" | "jsonb" => query.bind(None::<serde_json::Value>),
        "bytea" => query.bind(None::<Vec<u8>>),
        "inet" | "cidr" => query.bind(None::<IpNetwork>),
        _ => query.bind(None::<String>),
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: SqlValue,
    declared_type: Option<&str>,
) -> Result<Query<'q, Postgres, PgArguments>, CopyError> {
    let query = match value {
        SqlValue::Null => bind_typed_null(query, declared_type),
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::UnsignedInteger(v) => {
            let v = i64::try_from(v).map_err(|_| {
                CopyError::Internal(format!("unsigned value {v} out of range for bigint"))
            })?;
            query.bind(v)
        }
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Boolean(v) => query.bind(v),
        SqlValue::Decimal(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
        SqlValue::Uuid(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(v),
        SqlValue::Inet(v) => query.bind(v),
    };
    Ok(query)
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn quote_identifier(&self, name: &str) -> String {
        drivers::quote_ansi_identifier(name)
    }

    async fn execute(&self, sql: &str) -> Result<u64, CopyError> {
        tracing::debug!(query = %sql, "postgres execute");
        let mut conn = self.conn.lock().await;
        let done = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(done.rows_affected())
    }

    async fn fetch_table_set(&self) -> Result<TableSet, CopyError> {
        let mut conn = self.conn.lock().await;
        let mut tables = TableSet::new();

        let table_rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&mut *conn)
        .await?;

        for table_row in &table_rows {
            let table_name: String = table_row.try_get(0)?;
            let quoted_name = drivers::quote_ansi_identifier(&table_name);
            let mut table = TableDescriptor::new(&table_name, &quoted_name);

            let column_rows = sqlx::query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position",
            )
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await?;

            for column_row in &column_rows {
                let column_name: String = column_row.try_get(0)?;
                let type_name: String = column_row.try_get::<String, _>(1)?.to_lowercase();
                table.columns.insert(
                    column_name.clone(),
                    ColumnDescriptor {
                        quoted_name: drivers::quote_ansi_identifier(&column_name),
                        type_name,
                    },
                );
            }

            let key_rows = sqlx::query(
                "SELECT kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                  AND tc.table_schema = kcu.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY' \
                   AND tc.table_schema = 'public' AND tc.table_name = $1 \
                 ORDER BY kcu.ordinal_position",
            )
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await?;
            table.primary_key_columns = key_rows
                .iter()
                .map(|r| r.try_get::<String, _>(0))
                .collect::<Result<_, _>>()?;

            let count_sql = format!("SELECT count(*) FROM {quoted_name}");
            tracing::debug!(query = %count_sql, "postgres table stats");
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
        let sql = drivers::page_query(table, cursor, batch, Placeholder::Numbered);
        tracing::debug!(table = %table.name, query = %sql, "postgres fetch page");

        let mut query = sqlx::query(&sql);
        if table.primary_key_columns.len() == 1
            && let Some(last) = cursor.last_primary_key.as_ref()
        {
            query = bind_value(query, last.clone(), None)?;
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
            Placeholder::Numbered,
        );
        tracing::debug!(table = %table.name, rows = rows.len(), "postgres insert chunk");

        let mut query = sqlx::query(&sql);
        for row in rows {
            for column in &columns {
                let value = row.get(column).cloned().unwrap_or(SqlValue::Null);
                let declared_type = table.columns.get(column).map(|c| c.type_name.as_str());
                query = bind_value(query, value, declared_type)?;
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
            "SET session_replication_role = '{}'",
            if enabled { "origin" } else { "replica" }
        ))
        .await?;
        Ok(())
    }

    /// PostgreSQL raises `cannot truncate a table referenced in a foreign
    /// key constraint` even with checks relaxed, so truncation cascades.
    async fn truncate(&self, quoted_table: &str) -> Result<(), CopyError> {
        self.execute(&format!("TRUNCATE TABLE {quoted_table} CASCADE"))
            .await?;
        Ok(())
    }

    async fn reconcile_sequences(&self) -> Result<Vec<SequenceUpdate>, CopyError> {
        let mut conn = self.conn.lock().await;

        let sequence_rows = sqlx::query(
            "SELECT t.schemaname AS s, t.tablename AS t, c.column_name AS c, \
                    pg_get_serial_sequence('\"' || t.schemaname || '\".\"' || t.tablename || '\"', c.column_name) AS se \
             FROM pg_tables t \
             JOIN information_schema.columns c \
               ON c.table_schema = t.schemaname AND c.table_name = t.tablename \
             WHERE t.schemaname <> 'pg_catalog' AND t.schemaname <> 'information_schema' \
               AND pg_get_serial_sequence('\"' || t.schemaname || '\".\"' || t.tablename || '\"', c.column_name) IS NOT NULL",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut updates = Vec::with_capacity(sequence_rows.len());
        for row in &sequence_rows {
            let schema: String = row.try_get("s")?;
            let table: String = row.try_get("t")?;
            let column: String = row.try_get("c")?;
            let sequence: String = row.try_get("se")?;

            // Set the sequence to the column maximum, marked "called" so
            // the next nextval continues past it. setval is strict: a
            // NULL maximum (empty table) leaves the sequence untouched.
            let setval_sql = format!(
                "SELECT setval($1::regclass, (SELECT max({}) FROM {}.{}), true)",
                drivers::quote_ansi_identifier(&column),
                drivers::quote_ansi_identifier(&schema),
                drivers::quote_ansi_identifier(&table),
            );
            tracing::debug!(query = %setval_sql, sequence = %sequence, "postgres sequence update");
            let value: Option<i64> = sqlx::query_scalar(&setval_sql)
                .bind(&sequence)
                .fetch_one(&mut *conn)
                .await?;

            updates.push(SequenceUpdate {
                sequence,
                schema,
                table,
                column,
                value,
            });
        }

        Ok(updates)
    }
}
