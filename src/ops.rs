use crate::DatabaseDriver;
use crate::core::{
    CopyEntry, CopyError, CopyPlan, PageCursor, RunOutcome, RunParams, TableSet,
};
use crate::drivers;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};

/// Intersects the source and destination table sets into a copy plan.
///
/// Ignore-list filtering matches the exact table name or its quoted form
/// and applies to both sets before the intersection; an empty list means
/// no filtering at all. Tables present in the source but absent at the
/// destination land in `missing_tables`; unless skipping them was
/// explicitly allowed, their presence aborts the run before any copy.
pub fn resolve_copy_plan(
    source_tables: &TableSet,
    destination_tables: &TableSet,
    ignore_tables: &[String],
    ignore_missing_tables: bool,
) -> Result<CopyPlan, CopyError> {
    let is_ignored = |name: &String, quoted_name: &String| -> bool {
        !ignore_tables.is_empty()
            && (ignore_tables.contains(name) || ignore_tables.contains(quoted_name))
    };

    let mut plan = CopyPlan::default();
    for (name, source) in source_tables {
        if is_ignored(&source.name, &source.quoted_name) {
            continue;
        }
        match destination_tables.get(name) {
            Some(destination) if !is_ignored(&destination.name, &destination.quoted_name) => {
                plan.entries.push(CopyEntry {
                    source: source.clone(),
                    destination: destination.clone(),
                });
            }
            // matched the ignore list through its destination quoting
            Some(_) => {}
            None => plan.missing_tables.push(name.clone()),
        }
    }

    if !plan.missing_tables.is_empty() && !ignore_missing_tables {
        return Err(CopyError::MissingDestinationTables {
            tables: plan.missing_tables.clone(),
        });
    }

    Ok(plan)
}

/// Copies all planned tables from `source` to `destination` under a
/// single destination transaction.
///
/// Sequence of events: introspect both ends, resolve the plan, open the
/// transaction, disable foreign key checks (copy order therefore needs no
/// dependency sorting), copy table by table in bounded batches, reconcile
/// sequences, re-enable foreign key checks, then commit. Dry runs and
/// failures roll back instead. The destination is never left
/// half-migrated: every error path issues an explicit rollback.
pub async fn copy_tables(
    source: &dyn DatabaseDriver,
    destination: &dyn DatabaseDriver,
    ignore_tables: &[String],
    params: &RunParams,
) -> Result<RunOutcome, CopyError> {
    // a zero batch would fetch empty pages and commit without copying
    if params.batch_size == 0 {
        return Err(CopyError::Config(
            "batch size must be at least 1".to_string(),
        ));
    }

    tracing::info!("generating source table stats");
    let source_tables = source.fetch_table_set().await?;
    tracing::info!("generating destination table stats");
    let destination_tables = destination.fetch_table_set().await?;

    let plan = match resolve_copy_plan(
        &source_tables,
        &destination_tables,
        ignore_tables,
        params.ignore_missing_tables,
    ) {
        Ok(plan) => {
            if !plan.missing_tables.is_empty() {
                tracing::warn!(
                    tables = ?plan.missing_tables,
                    "tables missing at the destination will be ignored"
                );
            }
            plan
        }
        Err(e) => {
            if let CopyError::MissingDestinationTables { tables } = &e {
                tracing::warn!(tables = ?tables, "tables missing at the destination");
            }
            return Err(e);
        }
    };

    let progress = if params.quiet {
        ProgressBar::hidden()
    } else {
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} rows ({msg}) {per_sec}",
        )
        .map_err(|e| CopyError::Internal(e.to_string()))?
        .progress_chars("#>-");
        ProgressBar::new(plan.total_rows()).with_style(style)
    };

    destination.begin_transaction().await?;

    tracing::info!("disable foreign key checks");
    if let Err(e) = destination.toggle_foreign_key_checks(false).await {
        let _ = destination.rollback().await;
        return Err(e);
    }

    let mut result = copy_all_tables(source, destination, &plan, params, &progress).await;

    // The matching enable runs exactly once, also when the copy failed.
    // For dry runs the enable statement is itself rolled back afterwards;
    // that mirrors the transactional check-state semantics of the
    // supported dialects and is documented behavior.
    tracing::info!("enable foreign key checks");
    if let Err(e) = destination.toggle_foreign_key_checks(true).await {
        if result.is_ok() {
            result = Err(e);
        } else {
            tracing::warn!(error = %e, "re-enabling foreign key checks failed");
        }
    }

    match result {
        Ok(rows_copied) => {
            progress.finish_with_message("done");
            let total_rows: u64 = rows_copied.values().sum();
            if params.dry_run {
                tracing::info!("dry run requested, rolling back");
                destination.rollback().await?;
                Ok(RunOutcome {
                    rows_copied,
                    total_rows,
                    committed: false,
                })
            } else {
                destination.commit().await?;
                Ok(RunOutcome {
                    rows_copied,
                    total_rows,
                    committed: true,
                })
            }
        }
        Err(e) => {
            progress.abandon();
            if let Err(rollback_error) = destination.rollback().await {
                tracing::error!(error = %rollback_error, "rollback after failure also failed");
            }
            Err(e)
        }
    }
}

async fn copy_all_tables(
    source: &dyn DatabaseDriver,
    destination: &dyn DatabaseDriver,
    plan: &CopyPlan,
    params: &RunParams,
    progress: &ProgressBar,
) -> Result<IndexMap<String, u64>, CopyError> {
    let mut rows_copied = IndexMap::new();

    for entry in &plan.entries {
        if params.truncate_before_insert {
            tracing::info!(table = %entry.destination.name, "truncate");
            destination.truncate(&entry.destination.quoted_name).await?;
        }

        tracing::info!(table = %entry.source.name, rows = entry.source.row_count, "copy from");
        progress.set_message(entry.source.name.clone());

        let copied = copy_table_rows(source, destination, entry, params, progress).await?;
        tracing::info!(table = %entry.source.name, rows = copied, "table done");
        rows_copied.insert(entry.source.name.clone(), copied);
    }

    // Still inside the transaction, so a dry run exercises and then
    // discards the sequence updates as well.
    for update in destination.reconcile_sequences().await? {
        tracing::info!(
            sequence = %update.sequence,
            table = %update.table,
            schema = %update.schema,
            column = %update.column,
            value = ?update.value,
            "sequence updated"
        );
    }

    Ok(rows_copied)
}

/// The per-table copy loop: paged reads, value sanitization, chunked
/// multi-row inserts, progress accounting. Pages terminate on the first
/// empty fetch.
async fn copy_table_rows(
    source: &dyn DatabaseDriver,
    destination: &dyn DatabaseDriver,
    entry: &CopyEntry,
    params: &RunParams,
    progress: &ProgressBar,
) -> Result<u64, CopyError> {
    let mut cursor = PageCursor::default();
    let mut copied: u64 = 0;

    loop {
        let mut rows = source
            .fetch_page(&entry.source, &cursor, params.batch_size)
            .await?;
        if rows.is_empty() {
            break;
        }
        cursor.advance(&entry.source, &rows);

        for row in &mut rows {
            drivers::sanitize_row(row, &entry.destination, destination.dialect());
        }

        let column_count = rows.first().map_or(0, IndexMap::len);
        let chunk_rows = drivers::rows_per_insert(column_count);
        for chunk in rows.chunks(chunk_rows) {
            destination.insert_chunk(&entry.destination, chunk).await?;
        }

        copied += rows.len() as u64;
        progress.inc(rows.len() as u64);
    }

    Ok(copied)
}
