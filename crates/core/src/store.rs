//! Destination store seam and A1 range helpers.
//!
//! The engine speaks to the destination through [`TabularStore`]; the
//! Sheets crate implements it over REST, tests implement it in memory.

use async_trait::async_trait;

use crate::errors::Result;

/// Width of the header scan range. Wider than any tier schema, so
/// user-added trailing columns are always visible to the lifecycle check.
pub const HEADER_SCAN_COLUMNS: usize = 52;

/// Bounded single-cell probe used by the empty-tab fast path.
pub const PROBE_CELL: &str = "A2";

/// Range of the hidden config tab's key/value pairs.
pub const CONFIG_RANGE: &str = "A1:B";

/// Properties of one tab in the destination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub sheet_id: i64,
    pub title: String,
    pub hidden: bool,
}

/// Access to the destination tabular store, scoped to a single sheet.
///
/// Ranges are A1 notation without the tab prefix; implementations qualify
/// them with the tab name. All operations complete or fail outright; no
/// internal retry or backoff lives behind this trait.
#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>>;

    async fn create_tab(&self, title: &str, hidden: bool) -> Result<TabInfo>;

    /// Read a range. Trailing empty rows and cells may be omitted, and an
    /// entirely empty range returns no rows.
    async fn read_range(&self, tab: &str, range: &str) -> Result<Vec<Vec<String>>>;

    /// Overwrite cells starting at the range's top-left corner.
    async fn write_range(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> Result<()>;

    /// Append rows after the last data row of the table in `range`.
    async fn append_rows(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> Result<()>;

    async fn clear_range(&self, tab: &str, range: &str) -> Result<()>;

    /// Delete whole rows by zero-based sheet index (header row is 0).
    /// Indices must already be sorted descending: deleting a lower row
    /// first would shift every subsequent index.
    async fn delete_rows(&self, tab: &str, row_indices_desc: &[usize]) -> Result<()>;
}

/// Convert a zero-based column index to its A1 letter ("A", "Z", "AA").
pub fn column_letter(index: usize) -> String {
    let mut index = index;
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.into_iter().rev().collect()
}

/// Header row across the full scan width.
pub fn header_scan_range() -> String {
    format!("A1:{}1", column_letter(HEADER_SCAN_COLUMNS - 1))
}

/// All data rows below the header, across the full scan width.
pub fn data_range() -> String {
    format!("A2:{}", column_letter(HEADER_SCAN_COLUMNS - 1))
}

/// Header plus all data rows, across the full scan width.
pub fn full_scan_range() -> String {
    format!("A1:{}", column_letter(HEADER_SCAN_COLUMNS - 1))
}

/// A single column from the first data row down.
pub fn column_data_range(index: usize) -> String {
    let letter = column_letter(index);
    format!("{letter}2:{letter}")
}

/// One row (1-based) spanning `width` columns.
pub fn row_range(row: usize, width: usize) -> String {
    format!("A{row}:{}{row}", column_letter(width.saturating_sub(1)))
}
