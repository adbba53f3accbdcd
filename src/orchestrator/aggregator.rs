//! 结果汇总 - 编排层
//!
//! 所有图片处理完成后，按输入顺序汇总结果、累计用量、生成表格行

use crate::models::{CatalogRow, ImageRef, PipelineOutcome, UsageStats};

/// 无数据时的占位说明
pub const EMPTY_NOTE: &str = "NO DATA";

/// 批次汇总
///
/// 在屏障之后构建一次，之后只读
#[derive(Debug)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub usage: UsageStats,
    /// 按原始输入顺序
    pub results: Vec<(ImageRef, PipelineOutcome)>,
}

impl BatchSummary {
    pub fn from_outcomes(results: Vec<(ImageRef, PipelineOutcome)>) -> Self {
        let mut summary = BatchSummary {
            attempted: results.len(),
            succeeded: 0,
            empty: 0,
            failed: 0,
            usage: UsageStats::default(),
            results: Vec::new(),
        };

        for (_, outcome) in &results {
            match outcome {
                PipelineOutcome::Success { .. } => summary.succeeded += 1,
                PipelineOutcome::Empty { .. } => summary.empty += 1,
                PipelineOutcome::Failure { .. } => summary.failed += 1,
            }
            if let Some(usage) = outcome.usage() {
                summary.usage += usage;
            }
        }

        summary.results = results;
        summary
    }

    /// 成功提取的记录总数
    pub fn record_count(&self) -> usize {
        self.results
            .iter()
            .map(|(_, outcome)| match outcome {
                PipelineOutcome::Success { records, .. } => records.len(),
                _ => 0,
            })
            .sum()
    }

    /// 展开为表格行
    ///
    /// 每张图片至少一行：成功时每条记录一行，否则一行占位
    pub fn rows(&self, captured_at: &str) -> Vec<CatalogRow> {
        let mut rows = Vec::new();
        for (image, outcome) in &self.results {
            match outcome {
                PipelineOutcome::Success { records, .. } if !records.is_empty() => {
                    rows.extend(
                        records
                            .iter()
                            .map(|r| CatalogRow::from_record(r, &image.name, captured_at)),
                    );
                }
                PipelineOutcome::Success { .. } | PipelineOutcome::Empty { .. } => {
                    rows.push(CatalogRow::placeholder(EMPTY_NOTE, &image.name, captured_at));
                }
                PipelineOutcome::Failure { reason, .. } => {
                    let note = format!("ERROR: {}", reason.kind());
                    rows.push(CatalogRow::placeholder(&note, &image.name, captured_at));
                }
            }
        }
        rows
    }
}
