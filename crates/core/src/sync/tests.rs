//! Engine-level tests against an in-memory destination store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use crate::errors::Result;
use crate::models::{Tier, TransactionRecord};
use crate::schema::{self, TransactionColumn, CONFIG_TAB, TRANSACTIONS_TAB};
use crate::store::{self, TabInfo, TabularStore};

use super::dedup;
use super::{ProgressSender, SheetSyncEngine, PLACEHOLDER_MARKER};

#[derive(Default)]
struct State {
    tabs: Vec<TabInfo>,
    grids: HashMap<String, Vec<Vec<String>>>,
    reads: Vec<(String, String)>,
    read_delay: Option<Duration>,
}

/// In-memory [`TabularStore`] with call recording. Row 0 of each grid is
/// the header, matching the destination's sheet layout.
struct MemoryStore {
    state: Mutex<State>,
}

struct CellRange {
    start_col: usize,
    start_row: usize,
    end_col: Option<usize>,
    end_row: Option<usize>,
}

fn parse_cell(cell: &str) -> (usize, Option<usize>) {
    let letters: String = cell
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let digits: String = cell
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .collect();
    let mut col = 0usize;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    (col.saturating_sub(1), digits.parse::<usize>().ok().map(|r| r - 1))
}

fn parse_range(range: &str) -> CellRange {
    match range.split_once(':') {
        Some((start, end)) => {
            let (start_col, start_row) = parse_cell(start);
            let (end_col, end_row) = parse_cell(end);
            CellRange {
                start_col,
                start_row: start_row.unwrap_or(0),
                end_col: Some(end_col),
                end_row,
            }
        }
        None => {
            let (col, row) = parse_cell(range);
            CellRange {
                start_col: col,
                start_row: row.unwrap_or(0),
                end_col: Some(col),
                end_row: row,
            }
        }
    }
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    async fn seed_tab(&self, title: &str, grid: Vec<Vec<String>>) {
        let mut state = self.state.lock().await;
        let sheet_id = state.tabs.len() as i64;
        state.tabs.push(TabInfo {
            sheet_id,
            title: title.to_string(),
            hidden: false,
        });
        state.grids.insert(title.to_string(), grid);
    }

    async fn set_read_delay(&self, delay: Duration) {
        self.state.lock().await.read_delay = Some(delay);
    }

    async fn grid(&self, tab: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .await
            .grids
            .get(tab)
            .cloned()
            .unwrap_or_default()
    }

    async fn data_rows(&self, tab: &str) -> Vec<Vec<String>> {
        let grid = self.grid(tab).await;
        grid.into_iter().skip(1).collect()
    }

    async fn reads(&self) -> Vec<(String, String)> {
        self.state.lock().await.reads.clone()
    }

    async fn tab_info(&self, title: &str) -> Option<TabInfo> {
        self.state
            .lock()
            .await
            .tabs
            .iter()
            .find(|t| t.title == title)
            .cloned()
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        Ok(self.state.lock().await.tabs.clone())
    }

    async fn create_tab(&self, title: &str, hidden: bool) -> Result<TabInfo> {
        let mut state = self.state.lock().await;
        let info = TabInfo {
            sheet_id: state.tabs.len() as i64,
            title: title.to_string(),
            hidden,
        };
        state.tabs.push(info.clone());
        state.grids.entry(title.to_string()).or_default();
        Ok(info)
    }

    async fn read_range(&self, tab: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let delay = {
            let mut state = self.state.lock().await;
            state.reads.push((tab.to_string(), range.to_string()));
            state.read_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().await;
        let grid = match state.grids.get(tab) {
            Some(grid) if !grid.is_empty() => grid,
            _ => return Ok(Vec::new()),
        };
        let r = parse_range(range);
        if r.start_row >= grid.len() {
            return Ok(Vec::new());
        }
        let last_row = r.end_row.unwrap_or(grid.len() - 1).min(grid.len() - 1);

        let mut out = Vec::new();
        for row in &grid[r.start_row..=last_row] {
            let end_col = r.end_col.unwrap_or(row.len().saturating_sub(1));
            let cells: Vec<String> = (r.start_col..=end_col)
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect();
            out.push(cells);
        }
        for row in &mut out {
            while row.last().map_or(false, |cell| cell.is_empty()) {
                row.pop();
            }
        }
        while out.last().map_or(false, |row| row.is_empty()) {
            out.pop();
        }
        Ok(out)
    }

    async fn write_range(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let mut state = self.state.lock().await;
        let r = parse_range(range);
        let grid = state.grids.entry(tab.to_string()).or_default();
        for (i, row) in rows.into_iter().enumerate() {
            let target = r.start_row + i;
            while grid.len() <= target {
                grid.push(Vec::new());
            }
            let grid_row = &mut grid[target];
            for (j, cell) in row.into_iter().enumerate() {
                let col = r.start_col + j;
                while grid_row.len() <= col {
                    grid_row.push(String::new());
                }
                grid_row[col] = cell;
            }
        }
        Ok(())
    }

    async fn append_rows(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let mut state = self.state.lock().await;
        let r = parse_range(range);
        let grid = state.grids.entry(tab.to_string()).or_default();
        while grid
            .last()
            .map_or(false, |row| row.iter().all(|cell| cell.is_empty()))
        {
            grid.pop();
        }
        let mut target = grid.len().max(r.start_row);
        for row in rows {
            let mut padded = vec![String::new(); r.start_col];
            padded.extend(row);
            while grid.len() <= target {
                grid.push(Vec::new());
            }
            grid[target] = padded;
            target += 1;
        }
        Ok(())
    }

    async fn clear_range(&self, tab: &str, range: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let r = parse_range(range);
        if let Some(grid) = state.grids.get_mut(tab) {
            if grid.is_empty() || r.start_row >= grid.len() {
                return Ok(());
            }
            let last_row = r.end_row.unwrap_or(grid.len() - 1).min(grid.len() - 1);
            for row in &mut grid[r.start_row..=last_row] {
                let end_col = r.end_col.unwrap_or(row.len().saturating_sub(1));
                for col in r.start_col..row.len().min(end_col + 1) {
                    row[col] = String::new();
                }
            }
            while grid
                .last()
                .map_or(false, |row| row.iter().all(|cell| cell.is_empty()))
            {
                grid.pop();
            }
        }
        Ok(())
    }

    async fn delete_rows(&self, tab: &str, row_indices_desc: &[usize]) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(grid) = state.grids.get_mut(tab) {
            for &index in row_indices_desc {
                if index < grid.len() {
                    grid.remove(index);
                }
            }
        }
        Ok(())
    }
}

fn txn(id: &str, date: &str) -> TransactionRecord {
    TransactionRecord {
        transaction_id: id.to_string(),
        account_id: "acct_1".to_string(),
        date: date.parse().expect("test date"),
        amount: dec!(-4.20),
        name: Some(format!("purchase {id}")),
        ..Default::default()
    }
}

/// Column scan range the exact-ID dedup would read for the free tier.
fn free_tier_id_scan() -> String {
    let columns = schema::transaction_columns(Tier::Free, false);
    let index = schema::column_index(&columns, TransactionColumn::TransactionId).unwrap();
    store::column_data_range(index)
}

fn free_header_grid() -> Vec<Vec<String>> {
    vec![schema::transaction_headers(Tier::Free, false)]
}

#[tokio::test]
async fn second_sync_of_same_batch_appends_nothing() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    let batch = vec![txn("t1", "2024-01-01"), txn("t2", "2024-01-02")];

    let first = engine
        .write_transactions(&batch, &[], Tier::Free, false, false)
        .await
        .unwrap();
    assert_eq!(first.transactions_new, 2);
    let rows_before = engine.store().data_rows(TRANSACTIONS_TAB).await.len();

    let second = engine
        .write_transactions(&batch, &[], Tier::Free, false, false)
        .await
        .unwrap();
    assert_eq!(second.transactions_total, 2);
    assert_eq!(second.transactions_new, 0);
    assert_eq!(
        engine.store().data_rows(TRANSACTIONS_TAB).await.len(),
        rows_before
    );
}

#[tokio::test]
async fn identifiers_differing_only_by_case_are_distinct() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    let batch = vec![txn("abc", "2024-01-01"), txn("ABC", "2024-01-01")];

    let summary = engine
        .write_transactions(&batch, &[], Tier::Free, false, false)
        .await
        .unwrap();
    assert_eq!(summary.transactions_new, 2);
    assert_eq!(engine.store().data_rows(TRANSACTIONS_TAB).await.len(), 2);
}

#[tokio::test]
async fn duplicate_identifier_within_batch_writes_one_row() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    let batch = vec![txn("t1", "2024-01-01"), txn("t1", "2024-01-02")];

    let summary = engine
        .write_transactions(&batch, &[], Tier::Free, false, false)
        .await
        .unwrap();
    assert_eq!(summary.transactions_total, 1);
    assert_eq!(summary.transactions_new, 1);
    assert_eq!(engine.store().data_rows(TRANSACTIONS_TAB).await.len(), 1);
}

#[tokio::test]
async fn posted_transaction_removes_its_pending_ancestor() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    let mut pending = txn("P1", "2024-01-03");
    pending.pending = true;
    engine
        .write_transactions(&[pending], &[], Tier::Free, false, false)
        .await
        .unwrap();

    let mut posted = txn("T9", "2024-01-04");
    posted.pending_transaction_id = Some("P1".to_string());
    let summary = engine
        .write_transactions(&[posted], &[], Tier::Free, false, false)
        .await
        .unwrap();
    assert_eq!(summary.transactions_new, 1);

    let columns = schema::transaction_columns(Tier::Free, false);
    let id_index = schema::column_index(&columns, TransactionColumn::TransactionId).unwrap();
    let ids: Vec<String> = engine
        .store()
        .data_rows(TRANSACTIONS_TAB)
        .await
        .iter()
        .map(|row| row.get(id_index).cloned().unwrap_or_default())
        .collect();
    assert_eq!(ids, vec!["T9".to_string()]);
}

#[tokio::test]
async fn wider_existing_header_is_left_untouched() {
    let store = MemoryStore::new();
    let wide_header: Vec<String> = (1..=15).map(|i| format!("Column {i}")).collect();
    store
        .seed_tab(TRANSACTIONS_TAB, vec![wide_header.clone()])
        .await;
    let engine = SheetSyncEngine::new(store);

    let expected = schema::transaction_headers(Tier::Basic, false);
    assert_eq!(expected.len(), 13);
    engine.ensure_tab(TRANSACTIONS_TAB, &expected).await.unwrap();

    let grid = engine.store().grid(TRANSACTIONS_TAB).await;
    assert_eq!(grid[0], wide_header);
}

#[tokio::test]
async fn shorter_existing_header_is_cleared_and_rewritten() {
    let store = MemoryStore::new();
    let old_header: Vec<String> = (1..=10).map(|i| format!("Old {i}")).collect();
    store.seed_tab(TRANSACTIONS_TAB, vec![old_header]).await;
    let engine = SheetSyncEngine::new(store);

    let expected = schema::transaction_headers(Tier::Basic, false);
    engine.ensure_tab(TRANSACTIONS_TAB, &expected).await.unwrap();

    let grid = engine.store().grid(TRANSACTIONS_TAB).await;
    let header: Vec<String> = grid[0]
        .iter()
        .filter(|cell| !cell.is_empty())
        .cloned()
        .collect();
    assert_eq!(header, expected);
}

#[tokio::test]
async fn batch_is_appended_in_chronological_order() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    let batch = vec![txn("t5", "2024-01-05"), txn("t1", "2024-01-01")];

    engine
        .write_transactions(&batch, &[], Tier::Free, false, false)
        .await
        .unwrap();

    let columns = schema::transaction_columns(Tier::Free, false);
    let date_index = schema::column_index(&columns, TransactionColumn::Date).unwrap();
    let dates: Vec<String> = engine
        .store()
        .data_rows(TRANSACTIONS_TAB)
        .await
        .iter()
        .map(|row| row[date_index].clone())
        .collect();
    assert_eq!(dates, vec!["2024-01-01".to_string(), "2024-01-05".to_string()]);
}

#[tokio::test]
async fn empty_tab_fast_path_skips_the_column_scan() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    let batch = vec![txn("t1", "2024-01-01"), txn("t2", "2024-01-02")];

    let summary = engine
        .write_transactions(&batch, &[], Tier::Free, false, false)
        .await
        .unwrap();
    assert_eq!(summary.transactions_new, 2);

    let scan = free_tier_id_scan();
    let reads = engine.store().reads().await;
    assert!(
        !reads.iter().any(|(_, range)| *range == scan),
        "fast path must not read the id column, got reads: {reads:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn probe_timeout_degrades_to_raw_append() {
    let store = MemoryStore::new();
    let mut grid = free_header_grid();
    let mut existing = vec![String::new(); grid[0].len()];
    existing[0] = "2024-01-01".to_string();
    let columns = schema::transaction_columns(Tier::Free, false);
    let id_index = schema::column_index(&columns, TransactionColumn::TransactionId).unwrap();
    existing[id_index] = "t_old".to_string();
    grid.push(existing);
    store.seed_tab(TRANSACTIONS_TAB, grid).await;
    store.set_read_delay(Duration::from_secs(30)).await;

    let engine = SheetSyncEngine::new(store);
    let summary = engine
        .write_transactions(&[txn("t_new", "2024-02-02")], &[], Tier::Free, false, false)
        .await
        .unwrap();
    assert_eq!(summary.transactions_new, 1);

    let ids: Vec<String> = engine
        .store()
        .data_rows(TRANSACTIONS_TAB)
        .await
        .iter()
        .map(|row| row.get(id_index).cloned().unwrap_or_default())
        .collect();
    assert!(ids.contains(&"t_new".to_string()));

    let scan = free_tier_id_scan();
    let reads = engine.store().reads().await;
    assert!(!reads.iter().any(|(_, range)| *range == scan));
}

#[tokio::test]
async fn accounts_tab_is_replaced_wholesale() {
    use crate::models::AccountRecord;

    let engine = SheetSyncEngine::new(MemoryStore::new());
    let first = vec![
        AccountRecord {
            account_id: "a1".to_string(),
            name: Some("Checking".to_string()),
            ..Default::default()
        },
        AccountRecord {
            account_id: "a2".to_string(),
            name: Some("Savings".to_string()),
            ..Default::default()
        },
    ];
    engine.write_accounts(&first).await.unwrap();
    assert_eq!(engine.store().data_rows(schema::ACCOUNTS_TAB).await.len(), 2);

    // A later snapshot with one account must not leave the stale row.
    engine.write_accounts(&first[..1]).await.unwrap();
    let rows = engine.store().data_rows(schema::ACCOUNTS_TAB).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "a1");
}

#[tokio::test]
async fn clear_transactions_tab_reschemas_and_writes_placeholders() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    engine
        .write_transactions(&[txn("t1", "2024-01-01")], &[], Tier::Free, false, false)
        .await
        .unwrap();

    engine
        .clear_transactions_tab(Tier::Pro, false, false)
        .await
        .unwrap();

    let grid = engine.store().grid(TRANSACTIONS_TAB).await;
    let expected = schema::transaction_headers(Tier::Pro, false);
    let header: Vec<String> = grid[0]
        .iter()
        .filter(|cell| !cell.is_empty())
        .cloned()
        .collect();
    assert_eq!(header, expected);

    let data = engine.store().data_rows(TRANSACTIONS_TAB).await;
    assert_eq!(data.len(), 3);
    assert!(data
        .iter()
        .all(|row| row.iter().any(|cell| cell == PLACEHOLDER_MARKER)));
}

#[tokio::test]
async fn clear_transactions_tab_can_skip_placeholders() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    engine
        .write_transactions(&[txn("t1", "2024-01-01")], &[], Tier::Free, false, false)
        .await
        .unwrap();
    engine
        .clear_transactions_tab(Tier::Basic, false, true)
        .await
        .unwrap();
    assert!(engine.store().data_rows(TRANSACTIONS_TAB).await.is_empty());
}

#[tokio::test]
async fn fuzzy_dedup_filters_by_composite_key() {
    let store = MemoryStore::new();
    let columns = schema::transaction_columns(Tier::Free, false);
    let mut grid = free_header_grid();
    grid.push(vec![
        "2024-01-01".to_string(),
        "Coffee Shop".to_string(),
        "-4.20".to_string(),
        String::new(),
        String::new(),
        String::new(),
        "FALSE".to_string(),
        "t1".to_string(),
    ]);
    store.seed_tab(TRANSACTIONS_TAB, grid).await;

    // Same date/amount/description under a different id: a duplicate from
    // another sync mode.
    let duplicate = vec![
        "2024-01-01".to_string(),
        "  coffee   shop ".to_string(),
        "-4.20".to_string(),
        String::new(),
        String::new(),
        String::new(),
        "FALSE".to_string(),
        "t_other".to_string(),
    ];
    let fresh = vec![
        "2024-01-02".to_string(),
        "Bakery".to_string(),
        "-9.99".to_string(),
        String::new(),
        String::new(),
        String::new(),
        "FALSE".to_string(),
        "t_fresh".to_string(),
    ];

    let appended = dedup::append_unique_fuzzy_rows(
        &store,
        TRANSACTIONS_TAB,
        &columns,
        vec![duplicate, fresh],
        &ProgressSender::disabled(),
    )
    .await
    .unwrap();
    assert_eq!(appended, 1);
    assert_eq!(store.data_rows(TRANSACTIONS_TAB).await.len(), 2);
}

#[tokio::test]
async fn config_values_round_trip_through_hidden_tab() {
    let engine = SheetSyncEngine::new(MemoryStore::new());
    assert_eq!(engine.read_config_value("spreadsheet_rev").await.unwrap(), None);

    engine
        .write_config_value("spreadsheet_rev", "17")
        .await
        .unwrap();
    assert_eq!(
        engine.read_config_value("spreadsheet_rev").await.unwrap(),
        Some("17".to_string())
    );

    engine
        .write_config_value("spreadsheet_rev", "18")
        .await
        .unwrap();
    assert_eq!(
        engine.read_config_value("spreadsheet_rev").await.unwrap(),
        Some("18".to_string())
    );

    let info = engine.store().tab_info(CONFIG_TAB).await.expect("config tab");
    assert!(info.hidden);
}

#[tokio::test]
async fn progress_events_are_emitted_in_order() {
    let (sender, mut rx) = ProgressSender::channel(32);
    let engine = SheetSyncEngine::with_progress(MemoryStore::new(), sender);
    engine
        .write_transactions(&[txn("t1", "2024-01-01")], &[], Tier::Free, false, false)
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, super::SyncProgress::TabEnsured { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        super::SyncProgress::RowsAppended { count: 1, .. }
    )));
}
