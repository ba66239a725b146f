//! Write orchestrator: drives lifecycle, dedup, and row projection.

use std::collections::HashSet;

use chrono::Utc;
use log::{debug, info};
use tokio::sync::Mutex;

use crate::errors::{Result, SyncError};
use crate::models::{
    account_row, transaction_row, AccountIndex, AccountRecord, SyncSummary, Tier,
    TransactionRecord,
};
use crate::schema::{self, TransactionColumn, ACCOUNTS_TAB, CONFIG_TAB, TRANSACTIONS_TAB};
use crate::store::{self, TabularStore, CONFIG_RANGE};

use super::dedup;
use super::lifecycle;
use super::progress::{ProgressSender, SyncProgress};

const PLACEHOLDER_ROW_COUNT: usize = 3;
/// Marker written into placeholder rows after a clear-and-reschema, so the
/// UI has visible feedback during the ensuing re-backfill.
pub const PLACEHOLDER_MARKER: &str = "Loading transactions...";

/// Orchestrates all writes against the destination sheet.
///
/// Entry points are serialized by an in-process mutex so one process cannot
/// race its own dedup scans. Two *processes* syncing the same sheet are not
/// guarded — callers must hold a single-active-sync flag per destination.
/// Writes are idempotent by identifier but not atomic: a failed sync is
/// retried wholesale.
pub struct SheetSyncEngine<S: TabularStore> {
    store: S,
    progress: ProgressSender,
    sync_guard: Mutex<()>,
}

impl<S: TabularStore> SheetSyncEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_progress(store, ProgressSender::disabled())
    }

    pub fn with_progress(store: S, progress: ProgressSender) -> Self {
        Self {
            store,
            progress,
            sync_guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn progress(&self) -> &ProgressSender {
        &self.progress
    }

    /// Ensure a tab exists with at least the given header columns.
    pub async fn ensure_tab(&self, name: &str, headers: &[String]) -> Result<()> {
        lifecycle::ensure_tab(&self.store, name, headers, &self.progress).await
    }

    /// Replace the account tab wholesale with the given snapshot.
    ///
    /// Accounts carry no history; the whole table is the dedup unit, so
    /// existing data rows are cleared and the snapshot is appended in full.
    pub async fn write_accounts(&self, records: &[AccountRecord]) -> Result<usize> {
        let _guard = self.sync_guard.lock().await;
        self.write_accounts_locked(records).await
    }

    async fn write_accounts_locked(&self, records: &[AccountRecord]) -> Result<usize> {
        let headers = schema::account_headers();
        lifecycle::ensure_tab(&self.store, ACCOUNTS_TAB, &headers, &self.progress).await?;
        self.store
            .clear_range(ACCOUNTS_TAB, &store::data_range())
            .await?;

        if !records.is_empty() {
            let synced_at = Utc::now();
            let rows = records
                .iter()
                .map(|record| account_row(record, synced_at))
                .collect();
            self.store
                .append_rows(ACCOUNTS_TAB, &store::data_range(), rows)
                .await?;
        }
        info!("replaced account tab with {} record(s)", records.len());
        self.progress.emit(SyncProgress::AccountsReplaced {
            count: records.len(),
        });
        Ok(records.len())
    }

    /// Sync a transaction batch into the transaction tab.
    ///
    /// Incremental syncs (`clear_existing == false`) first remove pending
    /// rows superseded by the batch; full re-syncs delete all data rows and
    /// rewrite the header for the tier before writing anything. The batch
    /// is deduplicated against itself by identifier, sorted oldest-first,
    /// enriched from `enrichment_accounts`, and appended through the
    /// exact-ID dedup path.
    pub async fn write_transactions(
        &self,
        records: &[TransactionRecord],
        enrichment_accounts: &[AccountRecord],
        tier: Tier,
        rules_enabled: bool,
        clear_existing: bool,
    ) -> Result<SyncSummary> {
        let _guard = self.sync_guard.lock().await;

        let columns = schema::transaction_columns(tier, rules_enabled);
        let headers = schema::transaction_headers(tier, rules_enabled);
        lifecycle::ensure_tab(&self.store, TRANSACTIONS_TAB, &headers, &self.progress).await?;

        let id_title = TransactionColumn::TransactionId.title();

        if !clear_existing && !records.is_empty() {
            let removed = dedup::remove_pending_transactions(
                &self.store,
                TRANSACTIONS_TAB,
                id_title,
                records,
            )
            .await?;
            if removed > 0 {
                self.progress
                    .emit(SyncProgress::PendingRemoved { count: removed });
            }
        }

        if clear_existing {
            self.reschema_transactions_tab(&headers).await?;
        }

        // Provider pagination can return the same id twice; drop in-batch
        // duplicates before anything else. First occurrence wins.
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
        let mut batch: Vec<&TransactionRecord> = records
            .iter()
            .filter(|t| !t.transaction_id.is_empty() && seen.insert(t.transaction_id.as_str()))
            .collect();
        let total = batch.len();

        // Oldest first, so appends preserve chronological order relative
        // to prior appends.
        batch.sort_by_key(|t| t.date);

        let id_index = schema::column_index(&columns, TransactionColumn::TransactionId)
            .ok_or_else(|| SyncError::schema("transaction schema is missing the id column"))?;
        let accounts = AccountIndex::new(enrichment_accounts);
        let synced_at = Utc::now();
        let rows: Vec<Vec<String>> = batch
            .iter()
            .map(|t| transaction_row(t, &columns, &accounts, synced_at))
            .collect();

        let appended = dedup::append_unique_rows(
            &self.store,
            TRANSACTIONS_TAB,
            id_title,
            id_index,
            rows,
            &self.progress,
        )
        .await?;

        debug!(
            "transaction sync complete: total={} new={} tier={:?}",
            total, appended, tier
        );
        Ok(SyncSummary {
            accounts_written: enrichment_accounts.len(),
            transactions_total: total,
            transactions_new: appended,
        })
    }

    /// Clear all transaction data and rewrite the header for a new tier.
    ///
    /// Used on tier change or detected column-count mismatch, after the
    /// caller has confirmed with the user. Unless `skip_placeholders`,
    /// a few loading-marker rows are written for UI feedback during the
    /// re-backfill that follows.
    pub async fn clear_transactions_tab(
        &self,
        tier: Tier,
        rules_enabled: bool,
        skip_placeholders: bool,
    ) -> Result<()> {
        let _guard = self.sync_guard.lock().await;

        let columns = schema::transaction_columns(tier, rules_enabled);
        let headers = schema::transaction_headers(tier, rules_enabled);
        lifecycle::ensure_tab(&self.store, TRANSACTIONS_TAB, &headers, &self.progress).await?;
        self.reschema_transactions_tab(&headers).await?;

        if !skip_placeholders {
            let desc_index = schema::column_index(&columns, TransactionColumn::Description)
                .unwrap_or(0);
            let mut placeholder = vec![String::new(); headers.len()];
            placeholder[desc_index] = PLACEHOLDER_MARKER.to_string();
            let rows = vec![placeholder; PLACEHOLDER_ROW_COUNT];
            self.store
                .append_rows(TRANSACTIONS_TAB, &store::data_range(), rows)
                .await?;
        }
        Ok(())
    }

    /// Delete all data rows and force-rewrite the header, regardless of its
    /// current width. This is the only place the never-shrink policy is
    /// bypassed: the old schema's rows are gone, so stale extra header cells would
    /// misalign everything written after.
    async fn reschema_transactions_tab(&self, headers: &[String]) -> Result<()> {
        self.store
            .clear_range(TRANSACTIONS_TAB, &store::data_range())
            .await?;
        self.store
            .clear_range(TRANSACTIONS_TAB, &store::header_scan_range())
            .await?;
        self.store
            .write_range(
                TRANSACTIONS_TAB,
                &store::row_range(1, headers.len()),
                vec![headers.to_vec()],
            )
            .await?;
        self.progress.emit(SyncProgress::HeaderRewritten {
            tab: TRANSACTIONS_TAB.to_string(),
            columns: headers.len(),
        });
        Ok(())
    }

    /// Read one value from the hidden config tab.
    pub async fn read_config_value(&self, key: &str) -> Result<Option<String>> {
        lifecycle::ensure_config_tab(&self.store).await?;
        let rows = self.store.read_range(CONFIG_TAB, CONFIG_RANGE).await?;
        Ok(rows
            .into_iter()
            .find(|row| row.first().map(String::as_str) == Some(key))
            .map(|row| row.into_iter().nth(1).unwrap_or_default()))
    }

    /// Write one key/value pair to the hidden config tab, replacing any
    /// existing row for the key.
    pub async fn write_config_value(&self, key: &str, value: &str) -> Result<()> {
        lifecycle::ensure_config_tab(&self.store).await?;
        let rows = self.store.read_range(CONFIG_TAB, CONFIG_RANGE).await?;
        let row = vec![vec![key.to_string(), value.to_string()]];
        match rows
            .iter()
            .position(|r| r.first().map(String::as_str) == Some(key))
        {
            Some(index) => {
                self.store
                    .write_range(CONFIG_TAB, &store::row_range(index + 1, 2), row)
                    .await
            }
            None => self.store.append_rows(CONFIG_TAB, CONFIG_RANGE, row).await,
        }
    }
}
