/// 表格 API 客户端
///
/// 封装 Google Sheets v4 的"读取区域"与"写入区域"两个调用
use crate::error::SinkError;
use crate::services::sheet_writer::RowSink;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// 区域值（values 为空时接口不返回该字段）
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// 表格 API 客户端
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::with_base_url(SHEETS_API_BASE, spreadsheet_id, access_token)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            spreadsheet_id: spreadsheet_id.into(),
            access_token: access_token.into(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.base_url.trim_end_matches('/'),
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }
}

#[async_trait]
impl RowSink for SheetsClient {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let url = self.values_url(range);
        debug!("读取表格区域: {}", range);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SinkError::http(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::BadResponse {
                endpoint: url,
                status: status.as_u16(),
                body,
            });
        }

        let value_range: ValueRange = response
            .json()
            .await
            .map_err(|e| SinkError::http(&url, e))?;

        Ok(value_range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn write_range(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), SinkError> {
        let url = format!("{}?valueInputOption=USER_ENTERED", self.values_url(range));
        debug!("写入表格区域: {} ({} 行)", range, rows.len());

        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::http(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::BadResponse {
                endpoint: url,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
