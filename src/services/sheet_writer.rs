//! 表格写入服务 - 业务能力层
//!
//! 只负责"把行追加到表格"能力，不关心流程。
//! 表格后端通过 `RowSink` 抽象，线上实现见 `clients::sheets_client`。

use crate::error::SinkError;
use crate::models::CatalogRow;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// 表格后端能力
#[async_trait]
pub trait RowSink: Send + Sync {
    /// 读取区域内的所有值（按行）
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SinkError>;

    /// 从区域左上角开始写入若干行
    async fn write_range(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), SinkError>;
}

/// 表格写入服务
pub struct SheetWriter {
    sink: Arc<dyn RowSink>,
    sheet_name: String,
}

impl SheetWriter {
    pub fn new(sink: Arc<dyn RowSink>, sheet_name: impl Into<String>) -> Self {
        Self {
            sink,
            sheet_name: sheet_name.into(),
        }
    }

    /// 追加数据行
    ///
    /// 表格为空或第一行与表头不一致时先写表头
    ///
    /// # 返回
    /// 写入的数据行数量
    pub async fn append(&self, rows: &[CatalogRow]) -> Result<usize, SinkError> {
        if rows.is_empty() {
            debug!("没有需要写入表格的行");
            return Ok(0);
        }

        let header = CatalogRow::header();
        let last_column = column_letter(header.len());
        let existing = self
            .sink
            .read_range(&format!("{}!A1:{}", self.sheet_name, last_column))
            .await?;

        let header_matches = existing
            .first()
            .map(|first| trim_trailing_empty(first) == header.as_slice())
            .unwrap_or(false);
        if !header_matches {
            info!("📋 写入表头到 {}", self.sheet_name);
            self.sink
                .write_range(&format!("{}!A1", self.sheet_name), vec![header])
                .await?;
        }

        let next_row = existing.len().max(1) + 1;
        let cells: Vec<Vec<String>> = rows.iter().map(CatalogRow::to_cells).collect();
        self.sink
            .write_range(&format!("{}!A{}", self.sheet_name, next_row), cells)
            .await?;

        info!(
            "✓ 已写入 {} 行到 {}（从第 {} 行开始）",
            rows.len(),
            self.sheet_name,
            next_row
        );
        Ok(rows.len())
    }
}

/// 1 → A，8 → H（最多 26 列）
fn column_letter(count: usize) -> char {
    let index = count.clamp(1, 26) - 1;
    (b'A' + index as u8) as char
}

fn trim_trailing_empty(row: &[String]) -> &[String] {
    let end = row
        .iter()
        .rposition(|c| !c.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);
    &row[..end]
}
