//! Tab lifecycle: ensure a tab exists with a current-or-wider header.

use log::{debug, info};

use crate::errors::Result;
use crate::schema;
use crate::store::{self, TabularStore};

use super::progress::{ProgressSender, SyncProgress};

/// Ensure `name` exists and its header row matches-or-exceeds
/// `expected_headers`.
///
/// The header is read across [`store::HEADER_SCAN_COLUMNS`] columns so
/// user-added trailing columns are detected. A header that is empty or
/// shorter than expected is cleared and rewritten; a header with equal or
/// more columns is left untouched (never-shrink). Concurrent creators are
/// not guarded here; the engine serializes its own entry points.
pub async fn ensure_tab<S: TabularStore + ?Sized>(
    store: &S,
    name: &str,
    expected_headers: &[String],
    progress: &ProgressSender,
) -> Result<()> {
    let tabs = store.list_tabs().await?;
    if !tabs.iter().any(|t| t.title == name) {
        info!("creating missing tab '{}'", name);
        store.create_tab(name, false).await?;
    }

    let header = store.read_range(name, &store::header_scan_range()).await?;
    let header_row = header.into_iter().next().unwrap_or_default();
    // Trailing blank cells don't count as columns.
    let existing_width = header_row
        .iter()
        .rposition(|cell| !cell.trim().is_empty())
        .map_or(0, |i| i + 1);

    if existing_width >= expected_headers.len() {
        debug!(
            "tab '{}' header has {} columns (expected {}), leaving untouched",
            name,
            existing_width,
            expected_headers.len()
        );
        progress.emit(SyncProgress::TabEnsured {
            tab: name.to_string(),
        });
        return Ok(());
    }

    info!(
        "rewriting header of tab '{}' ({} -> {} columns)",
        name,
        existing_width,
        expected_headers.len()
    );
    store.clear_range(name, &store::header_scan_range()).await?;
    store
        .write_range(
            name,
            &store::row_range(1, expected_headers.len()),
            vec![expected_headers.to_vec()],
        )
        .await?;
    progress.emit(SyncProgress::HeaderRewritten {
        tab: name.to_string(),
        columns: expected_headers.len(),
    });
    progress.emit(SyncProgress::TabEnsured {
        tab: name.to_string(),
    });
    Ok(())
}

/// Ensure the hidden config tab exists.
pub(crate) async fn ensure_config_tab<S: TabularStore + ?Sized>(store: &S) -> Result<()> {
    let tabs = store.list_tabs().await?;
    if !tabs.iter().any(|t| t.title == schema::CONFIG_TAB) {
        info!("creating hidden config tab '{}'", schema::CONFIG_TAB);
        store.create_tab(schema::CONFIG_TAB, true).await?;
    }
    Ok(())
}
