pub mod config;
pub mod core;
pub mod drivers;
pub mod ops;

// Re-exports for convenient access: use tablesmith::TableSet;
pub use crate::core::{
    CopyError, CopyPlan, CopyRow, PageCursor, RunOutcome, RunParams, SequenceUpdate, SqlValue,
    TableDescriptor, TableSet,
};
pub use crate::drivers::Dialect;

use async_trait::async_trait;

/// One open database session bound to a dialect.
///
/// The engine consumes two of these per run: a read-only source and a
/// destination that carries the single long-lived transaction. Every
/// dialect-specific idiom (identifier quoting, foreign key toggling,
/// truncate semantics, sequence reconciliation) lives behind this trait;
/// the default methods encode the "unsupported operation is a no-op"
/// policy for engines without such a concept.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// The database family this driver speaks.
    fn dialect(&self) -> Dialect;

    /// Quotes an identifier according to the dialect's quoting rules.
    fn quote_identifier(&self, name: &str) -> String;

    /// Executes a single statement, returns affected rows.
    async fn execute(&self, sql: &str) -> Result<u64, CopyError>;

    /// Reads every visible table: columns, types, primary key and an
    /// exact row count. Any failure here is fatal for the run; partial
    /// schema knowledge is unsafe to proceed on.
    async fn fetch_table_set(&self) -> Result<TableSet, CopyError>;

    /// Fetches up to `batch` rows, paged according to the cursor and the
    /// table's primary key shape.
    async fn fetch_page(
        &self,
        table: &TableDescriptor,
        cursor: &PageCursor,
        batch: usize,
    ) -> Result<Vec<CopyRow>, CopyError>;

    /// Writes a chunk of rows as one multi-row INSERT with positional
    /// parameter binding. The column list is taken from the first row.
    async fn insert_chunk(&self, table: &TableDescriptor, rows: &[CopyRow])
        -> Result<(), CopyError>;

    async fn begin_transaction(&self) -> Result<(), CopyError> {
        self.execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), CopyError> {
        self.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), CopyError> {
        self.execute("ROLLBACK").await?;
        Ok(())
    }

    /// Enables or disables foreign key checks for the session. Dialects
    /// without such a switch silently skip this.
    async fn toggle_foreign_key_checks(&self, _enabled: bool) -> Result<(), CopyError> {
        Ok(())
    }

    /// Empties a destination table right before its copy.
    async fn truncate(&self, quoted_table: &str) -> Result<(), CopyError> {
        self.execute(&format!("TRUNCATE TABLE {quoted_table}")).await?;
        Ok(())
    }

    /// Aligns auto-increment generators with the data after a bulk load.
    /// Only PostgreSQL keeps sequences that need this; everywhere else
    /// this is a no-op.
    async fn reconcile_sequences(&self) -> Result<Vec<SequenceUpdate>, CopyError> {
        Ok(Vec::new())
    }
}
