//! Google Sheets backend for the sheet sync engine.
//!
//! Implements the core's `TabularStore` seam over the Sheets v4 REST API,
//! scoped to a single spreadsheet.

mod client;
mod error;
mod types;

pub use client::SheetsClient;
pub use error::{Result, SheetsError};
pub use types::*;
