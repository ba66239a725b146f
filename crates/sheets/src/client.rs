//! Sheets API client implementing the engine's destination store seam.
//!
//! All calls are scoped to a single spreadsheet and authenticated with a
//! caller-supplied bearer token. Token refresh is a caller concern: build a
//! new client after re-authentication. No retry or backoff lives here;
//! failures surface to the engine, which is idempotent to whole-sync
//! retries.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use banksheet_core::errors::Result as CoreResult;
use banksheet_core::store::{TabInfo, TabularStore};
use banksheet_core::SyncError;

use crate::error::{Result, SheetsError};
use crate::types::{
    AddSheetRequest, ApiErrorResponse, BatchRequest, BatchUpdateResponse, DeleteDimensionRequest,
    DimensionRange, SheetPropertiesInput, SpreadsheetMeta, ValueRange,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";
const MAX_LOG_BODY_CHARS: usize = 512;
/// Values are written verbatim; the sheet must not re-interpret ids or
/// masks as numbers or dates.
const VALUE_INPUT_OPTION: &str = "RAW";

/// Flatten a JSON cell scalar to its display string.
fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_json_rows(rows: Vec<Vec<String>>) -> Vec<Vec<serde_json::Value>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(serde_json::Value::String).collect())
        .collect()
}

/// Group descending row indices into half-open `(start, end)` ranges,
/// preserving the descending order so earlier deletions cannot shift the
/// indices of later ones.
fn group_descending(row_indices_desc: &[usize]) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &row in row_indices_desc {
        match ranges.last_mut() {
            Some((start, _)) if row + 1 == *start => *start = row,
            _ => ranges.push((row, row + 1)),
        }
    }
    ranges
}

/// Client for the Sheets v4 REST API, scoped to one spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    token: String,
}

impl SheetsClient {
    /// Create a client for a spreadsheet with a bearer token.
    pub fn new(spreadsheet_id: &str, token: &str) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, spreadsheet_id, token)
    }

    /// Create a client against a non-default API endpoint (tests).
    pub fn with_base_url(base_url: &str, spreadsheet_id: &str, token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
        }
    }

    /// Create headers for an API request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| SheetsError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            // Try to parse error envelope
            if let Ok(envelope) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(SheetsError::api(status.as_u16(), envelope.error.message));
            }
            return Err(SheetsError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            SheetsError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// URL for a tab-qualified A1 range, percent-encoded.
    fn range_url(&self, tab: &str, range: &str) -> String {
        let qualified = format!("'{}'!{}", tab.replace('\'', "''"), range);
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(&qualified)
        )
    }

    /// Fetch spreadsheet tab metadata.
    ///
    /// GET /v4/spreadsheets/{id}?fields=sheets.properties
    pub async fn spreadsheet_meta(&self) -> Result<SpreadsheetMeta> {
        let url = format!(
            "{}/v4/spreadsheets/{}?fields=sheets.properties",
            self.base_url, self.spreadsheet_id
        );

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Read values from a range.
    ///
    /// GET /v4/spreadsheets/{id}/values/{range}
    pub async fn get_values(&self, tab: &str, range: &str) -> Result<ValueRange> {
        let url = self.range_url(tab, range);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Overwrite values starting at the range's top-left corner.
    ///
    /// PUT /v4/spreadsheets/{id}/values/{range}?valueInputOption=RAW
    pub async fn update_values(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let url = format!(
            "{}?valueInputOption={}",
            self.range_url(tab, range),
            VALUE_INPUT_OPTION
        );
        let body = ValueRange {
            range: None,
            major_dimension: Some("ROWS".to_string()),
            values: to_json_rows(rows),
        };

        let response = self
            .client
            .put(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let _: serde_json::Value = Self::parse_response(response).await?;
        Ok(())
    }

    /// Append rows after the last data row of the table in `range`.
    ///
    /// POST /v4/spreadsheets/{id}/values/{range}:append
    pub async fn append_values(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let url = format!(
            "{}:append?valueInputOption={}&insertDataOption=INSERT_ROWS",
            self.range_url(tab, range),
            VALUE_INPUT_OPTION
        );
        let body = ValueRange {
            range: None,
            major_dimension: Some("ROWS".to_string()),
            values: to_json_rows(rows),
        };

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let _: serde_json::Value = Self::parse_response(response).await?;
        Ok(())
    }

    /// Clear a range, preserving formatting.
    ///
    /// POST /v4/spreadsheets/{id}/values/{range}:clear
    pub async fn clear_values(&self, tab: &str, range: &str) -> Result<()> {
        let url = format!("{}:clear", self.range_url(tab, range));

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let _: serde_json::Value = Self::parse_response(response).await?;
        Ok(())
    }

    /// Run a structural batch update (addSheet, deleteDimension).
    ///
    /// POST /v4/spreadsheets/{id}:batchUpdate
    pub async fn batch_update(&self, requests: Vec<BatchRequest>) -> Result<BatchUpdateResponse> {
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.base_url, self.spreadsheet_id
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Resolve a tab title to its numeric sheet id.
    async fn sheet_id_for(&self, tab: &str) -> Result<i64> {
        let meta = self.spreadsheet_meta().await?;
        meta.sheets
            .iter()
            .find(|sheet| sheet.properties.title == tab)
            .map(|sheet| sheet.properties.sheet_id)
            .ok_or_else(|| {
                SheetsError::invalid_request(format!("tab '{}' not found in spreadsheet", tab))
            })
    }
}

#[async_trait]
impl TabularStore for SheetsClient {
    async fn list_tabs(&self) -> CoreResult<Vec<TabInfo>> {
        let meta = self.spreadsheet_meta().await.map_err(SyncError::from)?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| TabInfo {
                sheet_id: sheet.properties.sheet_id,
                title: sheet.properties.title,
                hidden: sheet.properties.hidden,
            })
            .collect())
    }

    async fn create_tab(&self, title: &str, hidden: bool) -> CoreResult<TabInfo> {
        let request = BatchRequest {
            add_sheet: Some(AddSheetRequest {
                properties: SheetPropertiesInput {
                    title: title.to_string(),
                    hidden,
                },
            }),
            ..Default::default()
        };
        let response = self
            .batch_update(vec![request])
            .await
            .map_err(SyncError::from)?;
        let properties = response
            .replies
            .into_iter()
            .find_map(|reply| reply.add_sheet)
            .map(|reply| reply.properties)
            .ok_or_else(|| {
                SyncError::transient("addSheet reply missing from batchUpdate response")
            })?;
        Ok(TabInfo {
            sheet_id: properties.sheet_id,
            title: properties.title,
            hidden: properties.hidden,
        })
    }

    async fn read_range(&self, tab: &str, range: &str) -> CoreResult<Vec<Vec<String>>> {
        let values = self.get_values(tab, range).await.map_err(SyncError::from)?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn write_range(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> CoreResult<()> {
        self.update_values(tab, range, rows)
            .await
            .map_err(SyncError::from)
    }

    async fn append_rows(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) -> CoreResult<()> {
        self.append_values(tab, range, rows)
            .await
            .map_err(SyncError::from)
    }

    async fn clear_range(&self, tab: &str, range: &str) -> CoreResult<()> {
        self.clear_values(tab, range)
            .await
            .map_err(SyncError::from)
    }

    async fn delete_rows(&self, tab: &str, row_indices_desc: &[usize]) -> CoreResult<()> {
        if row_indices_desc.is_empty() {
            return Ok(());
        }
        let sheet_id = self.sheet_id_for(tab).await.map_err(SyncError::from)?;
        let requests = group_descending(row_indices_desc)
            .into_iter()
            .map(|(start, end)| BatchRequest {
                delete_dimension: Some(DeleteDimensionRequest {
                    range: DimensionRange {
                        sheet_id,
                        dimension: "ROWS".to_string(),
                        start_index: start,
                        end_index: end,
                    },
                }),
                ..Default::default()
            })
            .collect();
        self.batch_update(requests).await.map_err(SyncError::from)?;
        Ok(())
    }
}
