//! Deduplication strategies: exact-ID, fuzzy, and pending-supersession.

use std::collections::HashSet;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::timeout;

use crate::errors::{Result, SyncError};
use crate::models::TransactionRecord;
use crate::schema::{self, TransactionColumn};
use crate::store::{self, TabularStore, PROBE_CELL};

use super::progress::{ProgressSender, SyncProgress};

/// Budget for the empty-tab probe. A tab exhibiting the phantom-rows
/// failure mode can take minutes to answer a read; past this budget the
/// sync assumes empty and appends without dedup rather than blocking.
pub const EMPTY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn is_blank(values: &[Vec<String>]) -> bool {
    values
        .iter()
        .all(|row| row.iter().all(|cell| cell.trim().is_empty()))
}

async fn append_all<S: TabularStore + ?Sized>(
    store: &S,
    tab: &str,
    rows: Vec<Vec<String>>,
    progress: &ProgressSender,
) -> Result<usize> {
    let count = rows.len();
    if count > 0 {
        store.append_rows(tab, &store::data_range(), rows).await?;
    }
    progress.emit(SyncProgress::RowsAppended {
        tab: tab.to_string(),
        count,
    });
    Ok(count)
}

/// Append rows not already present in the tab, keyed by the identifier
/// column titled `id_title` (`id_index` is that column's position within
/// the incoming rows).
///
/// Fast path: a single bounded cell probe raced against
/// [`EMPTY_PROBE_TIMEOUT`]. An empty tab, or one too slow to answer,
/// skips the dedup scan entirely and appends raw. The full path reads only
/// the identifier column, never the whole sheet, keeping read volume
/// proportional to row count.
///
/// Identifier comparison is case-sensitive; within-batch duplicates are
/// caught by the same set the existing ids seed. Returns the count
/// appended.
pub async fn append_unique_rows<S: TabularStore + ?Sized>(
    store: &S,
    tab: &str,
    id_title: &str,
    id_index: usize,
    rows: Vec<Vec<String>>,
    progress: &ProgressSender,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    match timeout(EMPTY_PROBE_TIMEOUT, store.read_range(tab, PROBE_CELL)).await {
        Ok(Ok(values)) => {
            if is_blank(&values) {
                debug!("tab '{}' has no data rows, appending without dedup scan", tab);
                return append_all(store, tab, rows, progress).await;
            }
        }
        Ok(Err(err)) => return Err(err),
        Err(_) => {
            warn!(
                "empty probe on tab '{}' exceeded {:?}; assuming empty and appending raw",
                tab, EMPTY_PROBE_TIMEOUT
            );
            progress.emit(SyncProgress::ProbeDegraded {
                tab: tab.to_string(),
            });
            return append_all(store, tab, rows, progress).await;
        }
    }

    let header = store.read_range(tab, &store::header_scan_range()).await?;
    let header_row = header.into_iter().next().unwrap_or_default();
    let column = schema::find_column(&header_row, id_title).ok_or_else(|| {
        SyncError::schema(format!("column '{}' not found in tab '{}'", id_title, tab))
    })?;

    let existing = store
        .read_range(tab, &store::column_data_range(column))
        .await?;
    let mut seen: HashSet<String> = existing
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter(|id| !id.is_empty())
        .collect();

    let survivors: Vec<Vec<String>> = rows
        .into_iter()
        .filter(|row| match row.get(id_index) {
            Some(id) if !id.is_empty() => seen.insert(id.clone()),
            _ => false,
        })
        .collect();

    append_all(store, tab, survivors, progress).await
}

fn normalize_description(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Composite dedup key: date, amount, and normalized description.
pub fn fuzzy_key(date: &str, amount: &str, description: &str) -> String {
    format!(
        "{}|{}|{}",
        date.trim(),
        amount.trim(),
        normalize_description(description)
    )
}

fn fuzzy_key_for_sheet_row(
    row: &[String],
    date_idx: usize,
    amount_idx: usize,
    desc_idx: usize,
) -> String {
    let cell = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");
    fuzzy_key(cell(date_idx), cell(amount_idx), cell(desc_idx))
}

/// Append rows not matching any existing row by the fuzzy composite key.
///
/// Reads the full existing table once, more expensive than the exact-ID
/// path and reserved for recovery scenarios where identifiers are unstable
/// across sync modes. `columns` is the expected order of the incoming rows.
pub async fn append_unique_fuzzy_rows<S: TabularStore + ?Sized>(
    store: &S,
    tab: &str,
    columns: &[TransactionColumn],
    rows: Vec<Vec<String>>,
    progress: &ProgressSender,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let missing = |c: TransactionColumn| {
        SyncError::schema(format!(
            "column '{}' absent from expected transaction schema",
            c.title()
        ))
    };
    let in_date = schema::column_index(columns, TransactionColumn::Date)
        .ok_or_else(|| missing(TransactionColumn::Date))?;
    let in_amount = schema::column_index(columns, TransactionColumn::Amount)
        .ok_or_else(|| missing(TransactionColumn::Amount))?;
    let in_desc = schema::column_index(columns, TransactionColumn::Description)
        .ok_or_else(|| missing(TransactionColumn::Description))?;

    let table = store.read_range(tab, &store::full_scan_range()).await?;
    let mut table = table.into_iter();
    let header_row = table.next().unwrap_or_default();

    let sheet_date = schema::find_column(&header_row, TransactionColumn::Date.title())
        .ok_or_else(|| {
            SyncError::schema(format!("date column not found in tab '{}'", tab))
        })?;
    let sheet_amount = schema::find_column(&header_row, TransactionColumn::Amount.title())
        .ok_or_else(|| {
            SyncError::schema(format!("amount column not found in tab '{}'", tab))
        })?;
    // The description field is the one most often renamed by users; fall
    // back to the merchant column before giving up.
    let sheet_desc = schema::find_column(&header_row, TransactionColumn::Description.title())
        .or_else(|| schema::find_column(&header_row, TransactionColumn::Merchant.title()))
        .ok_or_else(|| {
            SyncError::schema(format!(
                "neither description nor merchant column found in tab '{}'",
                tab
            ))
        })?;

    let mut seen: HashSet<String> = table
        .map(|row| fuzzy_key_for_sheet_row(&row, sheet_date, sheet_amount, sheet_desc))
        .collect();

    let survivors: Vec<Vec<String>> = rows
        .into_iter()
        .filter(|row| seen.insert(fuzzy_key_for_sheet_row(row, in_date, in_amount, in_desc)))
        .collect();

    append_all(store, tab, survivors, progress).await
}

/// Remove existing rows superseded by incoming posted transactions.
///
/// Scans the incoming batch for `pending_transaction_id` back-references;
/// rows whose identifier is referenced are deleted, highest row first, so
/// index shifts cannot corrupt the deletion. Must run before the batch is
/// appended. Returns the number of rows removed.
pub async fn remove_pending_transactions<S: TabularStore + ?Sized>(
    store: &S,
    tab: &str,
    id_title: &str,
    incoming: &[TransactionRecord],
) -> Result<usize> {
    let references: HashSet<&str> = incoming
        .iter()
        .filter_map(|t| t.pending_transaction_id.as_deref())
        .filter(|id| !id.is_empty())
        .collect();
    if references.is_empty() {
        return Ok(0);
    }

    let header = store.read_range(tab, &store::header_scan_range()).await?;
    let header_row = header.into_iter().next().unwrap_or_default();
    let column = schema::find_column(&header_row, id_title).ok_or_else(|| {
        SyncError::schema(format!("column '{}' not found in tab '{}'", id_title, tab))
    })?;

    let existing = store
        .read_range(tab, &store::column_data_range(column))
        .await?;
    let mut doomed: Vec<usize> = existing
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.first()
                .map_or(false, |id| references.contains(id.as_str()))
        })
        // Data starts at sheet row 1 (the header is row 0).
        .map(|(offset, _)| offset + 1)
        .collect();
    if doomed.is_empty() {
        return Ok(0);
    }

    doomed.sort_unstable_by(|a, b| b.cmp(a));
    debug!(
        "removing {} superseded pending row(s) from tab '{}'",
        doomed.len(),
        tab
    );
    store.delete_rows(tab, &doomed).await?;
    Ok(doomed.len())
}
