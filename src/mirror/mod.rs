use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::storage::Reading;

/// Narrow best-effort sink for mirroring readings to a remote spreadsheet.
/// Implementations are never load-bearing: the primary save path treats any
/// error here as a warning and carries on.
#[async_trait]
pub trait MirrorSink: Send + Sync {
    async fn append(&self, reading: &Reading) -> Result<()>;
}

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const HEADER_ROW: [&str; 2] = ["Date", "Temperature (°C)"];

/// Google Sheets mirror. Appends a two-column row (localized date-time,
/// temperature) to the first worksheet of the configured spreadsheet,
/// writing a header row when the sheet is empty. Ranges carry no sheet
/// prefix, which the Sheets API resolves to the first visible worksheet.
pub struct SheetsMirror {
    http: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
}

impl SheetsMirror {
    pub fn new(spreadsheet_id: &str, access_token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: SHEETS_BASE_URL.to_owned(),
            spreadsheet_id: spreadsheet_id.to_owned(),
            access_token: access_token.to_owned(),
        }
    }

    /// Full connectivity check used by the `test-sheets` diagnostic.
    pub async fn connect(&self) -> Result<()> {
        let title = self.first_sheet_title().await?;
        info!(worksheet = %title, "Connected to spreadsheet");
        self.ensure_header().await
    }

    /// Number of populated rows in the first column, header included.
    pub async fn row_count(&self) -> Result<usize> {
        let url = format!("{}/{}/values/A:A", self.base_url, self.spreadsheet_id);
        let range = self.get_values(&url).await?;
        Ok(range.values.len())
    }

    async fn first_sheet_title(&self) -> Result<String> {
        let url = format!(
            "{}/{}?fields=sheets.properties.title",
            self.base_url, self.spreadsheet_id
        );
        let meta: SpreadsheetMeta = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Sheets metadata request failed")?
            .error_for_status()
            .context("Sheets metadata endpoint returned error status")?
            .json()
            .await
            .context("Failed to deserialize spreadsheet metadata")?;

        meta.sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .context("spreadsheet has no worksheets")
    }

    /// Writes the header row if the first row is empty. Idempotent.
    async fn ensure_header(&self) -> Result<()> {
        let url = format!("{}/{}/values/A1:B1", self.base_url, self.spreadsheet_id);
        let range = self.get_values(&url).await?;
        if !range.values.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/{}/values/A1:B1?valueInputOption=RAW",
            self.base_url, self.spreadsheet_id
        );
        self.http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": [HEADER_ROW] }))
            .send()
            .await
            .context("Sheets header write failed")?
            .error_for_status()
            .context("Sheets header endpoint returned error status")?;
        info!("Header row written to spreadsheet");
        Ok(())
    }

    async fn get_values(&self, url: &str) -> Result<ValueRange> {
        self.http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Sheets values request failed")?
            .error_for_status()
            .context("Sheets values endpoint returned error status")?
            .json()
            .await
            .context("Failed to deserialize Sheets values response")
    }
}

#[async_trait]
impl MirrorSink for SheetsMirror {
    async fn append(&self, reading: &Reading) -> Result<()> {
        self.ensure_header().await?;

        let row = mirror_row(reading, Local::now().naive_local());
        let url = format!(
            "{}/{}/values/A:B:append?valueInputOption=USER_ENTERED",
            self.base_url, self.spreadsheet_id
        );
        self.http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .context("Sheets append request failed")?
            .error_for_status()
            .context("Sheets append endpoint returned error status")?;

        debug!(temperature = ?reading.temperature, "Row appended to spreadsheet");
        Ok(())
    }
}

/// The mirrored row: local wall-clock time at mirror time, plus the
/// temperature (blank when the sensor omitted it).
fn mirror_row(reading: &Reading, at: NaiveDateTime) -> Vec<Value> {
    vec![
        Value::from(at.format("%Y/%m/%d %H:%M").to_string()),
        reading.temperature.map(Value::from).unwrap_or(Value::Null),
    ]
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}
