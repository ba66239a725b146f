//! Tab schema registry: the authoritative column sets per tier.
//!
//! The returned order is the column-to-index mapping used by every other
//! component. Row projection and column lookups must derive from these
//! functions, never from a hardcoded index — user edits or partial
//! migrations can shift columns.

use serde::{Deserialize, Serialize};

use crate::models::Tier;

/// Title of the append-only transaction tab.
pub const TRANSACTIONS_TAB: &str = "Transactions";
/// Title of the replace-on-sync account tab.
pub const ACCOUNTS_TAB: &str = "Accounts";
/// Title of the hidden key/value config tab.
pub const CONFIG_TAB: &str = "BanksheetConfig";

/// Typed identity of a transaction tab column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionColumn {
    Date,
    Description,
    Amount,
    Currency,
    Account,
    AccountMask,
    Pending,
    TransactionId,
    AuthorizedDate,
    Merchant,
    PaymentChannel,
    Category,
    Subcategory,
    LocationCity,
    LocationRegion,
    SyncedAt,
    CustomCategory,
}

impl TransactionColumn {
    /// Header-row title for this column.
    pub fn title(self) -> &'static str {
        match self {
            Self::Date => "Date",
            Self::Description => "Description",
            Self::Amount => "Amount",
            Self::Currency => "Currency",
            Self::Account => "Account",
            Self::AccountMask => "Account Mask",
            Self::Pending => "Pending",
            Self::TransactionId => "Transaction ID",
            Self::AuthorizedDate => "Authorized Date",
            Self::Merchant => "Merchant",
            Self::PaymentChannel => "Payment Channel",
            Self::Category => "Category",
            Self::Subcategory => "Subcategory",
            Self::LocationCity => "Location City",
            Self::LocationRegion => "Location Region",
            Self::SyncedAt => "Synced At",
            Self::CustomCategory => "Custom Category",
        }
    }
}

/// Ordered column set for the transaction tab.
///
/// Each tier is a strict prefix extension of the one below it, so a tier
/// upgrade only ever appends columns. The rules column, when enabled, is
/// always last.
pub fn transaction_columns(tier: Tier, rules_enabled: bool) -> Vec<TransactionColumn> {
    use TransactionColumn::*;

    let mut columns = vec![
        Date,
        Description,
        Amount,
        Currency,
        Account,
        AccountMask,
        Pending,
        TransactionId,
    ];
    if matches!(tier, Tier::Basic | Tier::Pro) {
        columns.extend([AuthorizedDate, Merchant, PaymentChannel, Category, Subcategory]);
    }
    if matches!(tier, Tier::Pro) {
        columns.extend([LocationCity, LocationRegion, SyncedAt]);
    }
    if rules_enabled {
        columns.push(CustomCategory);
    }
    columns
}

/// Header titles for the transaction tab.
pub fn transaction_headers(tier: Tier, rules_enabled: bool) -> Vec<String> {
    transaction_columns(tier, rules_enabled)
        .into_iter()
        .map(|c| c.title().to_string())
        .collect()
}

/// Fixed header titles for the account tab.
pub fn account_headers() -> Vec<String> {
    [
        "Account ID",
        "Name",
        "Official Name",
        "Type",
        "Subtype",
        "Mask",
        "Current Balance",
        "Available Balance",
        "Currency",
        "Institution",
        "Last Synced",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Locate a column in an existing header row by title.
///
/// Titles are compared trimmed and case-insensitively so a user re-typed
/// header ("date" vs "Date") still resolves. Identifier *values* stay
/// case-sensitive; only header matching is lenient.
pub fn find_column(header_row: &[String], title: &str) -> Option<usize> {
    header_row
        .iter()
        .position(|cell| cell.trim().eq_ignore_ascii_case(title))
}

/// Index of a column within an expected column order.
pub fn column_index(columns: &[TransactionColumn], column: TransactionColumn) -> Option<usize> {
    columns.iter().position(|c| *c == column)
}
