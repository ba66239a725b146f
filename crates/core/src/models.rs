//! Domain models: provider records, tiers, and row projection.
//!
//! Records arrive from the upstream banking-data provider with many optional
//! fields. Fallback rules (display name, description) are resolved here,
//! once, at projection time — never scattered through row-building.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::schema::TransactionColumn;

/// Subscription tier controlling the transaction schema width.
///
/// The retention window requested from the upstream provider also varies by
/// tier, but that is a caller concern; here the tier is purely a
/// schema-selection input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Basic,
    Pro,
}

/// A provider account snapshot. No history is retained; each sync replaces
/// the account tab wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    /// Opaque provider-assigned identifier.
    pub account_id: String,
    pub name: Option<String>,
    pub official_name: Option<String>,
    pub mask: Option<String>,
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub current_balance: Option<Decimal>,
    pub available_balance: Option<Decimal>,
    pub currency: Option<String>,
    pub institution: Option<String>,
}

impl AccountRecord {
    /// Display name fallback: name, then official name, then empty.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.official_name.as_deref())
            .unwrap_or("")
    }
}

/// A provider transaction. Written once, never mutated in place.
///
/// `transaction_id` is case-sensitive: two ids differing only by case are
/// distinct records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Opaque provider-assigned identifier.
    pub transaction_id: String,
    /// Identifier of the owning account, used for enrichment.
    pub account_id: String,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub name: Option<String>,
    pub merchant_name: Option<String>,
    /// Signed amount; provider convention is positive for outflows.
    pub amount: Decimal,
    pub currency: Option<String>,
    pub pending: bool,
    /// Back-reference to a prior pending record this posted record
    /// supersedes.
    pub pending_transaction_id: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub payment_channel: Option<String>,
    pub location_city: Option<String>,
    pub location_region: Option<String>,
    /// Free-text category assigned by the downstream rules pass.
    pub custom_category: Option<String>,
}

impl TransactionRecord {
    /// Description fallback: name, then merchant name, then empty.
    pub fn description(&self) -> &str {
        self.name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.merchant_name.as_deref())
            .unwrap_or("")
    }
}

/// Counts returned by a transaction sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub accounts_written: usize,
    pub transactions_total: usize,
    pub transactions_new: usize,
}

/// Account lookup by identifier for the enrichment step.
pub struct AccountIndex<'a> {
    by_id: HashMap<&'a str, &'a AccountRecord>,
}

impl<'a> AccountIndex<'a> {
    pub fn new(accounts: &'a [AccountRecord]) -> Self {
        Self {
            by_id: accounts
                .iter()
                .map(|a| (a.account_id.as_str(), a))
                .collect(),
        }
    }

    pub fn get(&self, account_id: &str) -> Option<&'a AccountRecord> {
        self.by_id.get(account_id).copied()
    }
}

fn date_cell(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn opt_cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn decimal_cell(value: &Option<Decimal>) -> String {
    value.map(|d| d.to_string()).unwrap_or_default()
}

/// Project an account snapshot into the account tab's column order.
///
/// Must stay aligned with [`crate::schema::account_headers`].
pub fn account_row(record: &AccountRecord, synced_at: DateTime<Utc>) -> Vec<String> {
    vec![
        record.account_id.clone(),
        opt_cell(&record.name),
        opt_cell(&record.official_name),
        opt_cell(&record.account_type),
        opt_cell(&record.subtype),
        opt_cell(&record.mask),
        decimal_cell(&record.current_balance),
        decimal_cell(&record.available_balance),
        opt_cell(&record.currency),
        opt_cell(&record.institution),
        synced_at.to_rfc3339(),
    ]
}

/// Project a transaction into the given column order, enriched with the
/// owning account's display name and mask.
pub fn transaction_row(
    record: &TransactionRecord,
    columns: &[TransactionColumn],
    accounts: &AccountIndex<'_>,
    synced_at: DateTime<Utc>,
) -> Vec<String> {
    let account = accounts.get(&record.account_id);
    columns
        .iter()
        .map(|column| match column {
            TransactionColumn::Date => date_cell(record.date),
            TransactionColumn::Description => record.description().to_string(),
            TransactionColumn::Amount => record.amount.to_string(),
            TransactionColumn::Currency => opt_cell(&record.currency),
            TransactionColumn::Account => account
                .map(|a| a.display_name().to_string())
                .unwrap_or_default(),
            TransactionColumn::AccountMask => account
                .and_then(|a| a.mask.clone())
                .unwrap_or_default(),
            TransactionColumn::Pending => {
                if record.pending { "TRUE" } else { "FALSE" }.to_string()
            }
            TransactionColumn::TransactionId => record.transaction_id.clone(),
            TransactionColumn::AuthorizedDate => record
                .authorized_date
                .map(date_cell)
                .unwrap_or_default(),
            TransactionColumn::Merchant => opt_cell(&record.merchant_name),
            TransactionColumn::PaymentChannel => opt_cell(&record.payment_channel),
            TransactionColumn::Category => opt_cell(&record.category),
            TransactionColumn::Subcategory => opt_cell(&record.subcategory),
            TransactionColumn::LocationCity => opt_cell(&record.location_city),
            TransactionColumn::LocationRegion => opt_cell(&record.location_region),
            TransactionColumn::SyncedAt => synced_at.to_rfc3339(),
            TransactionColumn::CustomCategory => opt_cell(&record.custom_category),
        })
        .collect()
}
