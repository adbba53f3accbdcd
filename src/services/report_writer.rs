//! 报告写入服务 - 业务能力层
//!
//! 只负责"写 Markdown 报告"能力，不关心流程

use crate::error::SinkError;
use crate::models::PipelineOutcome;
use crate::orchestrator::aggregator::BatchSummary;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 处理失败时的固定占位文本
pub const FAILURE_PLACEHOLDER: &str = "ไม่สามารถประมวลผลรูปภาพนี้ได้ หรือเกิดข้อผิดพลาด (unable to process this image)";

/// 没有提取到记录时的说明
pub const EMPTY_PLACEHOLDER: &str = "ไม่พบข้อมูลอะไหล่ในรูปภาพนี้ (no catalog entries found)";

/// 报告写入服务
pub struct ReportWriter {
    report_path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.report_path
    }

    /// 写入报告
    ///
    /// # 返回
    /// 没有任何图片时不写文件，返回 `Ok(false)`
    pub async fn write(
        &self,
        summary: &BatchSummary,
        input_source: &str,
        generated_at: &str,
    ) -> Result<bool, SinkError> {
        if summary.attempted == 0 {
            warn!("没有处理任何图片，不生成 Markdown 报告");
            return Ok(false);
        }

        let content = render_markdown(summary, input_source, generated_at)?;
        debug!(
            "写入报告: {} | 长度: {} 字节",
            self.report_path.display(),
            content.len()
        );

        if let Some(parent) = self.report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::io(parent.display().to_string(), e))?;
        }
        tokio::fs::write(&self.report_path, content)
            .await
            .map_err(|e| SinkError::io(self.report_path.display().to_string(), e))?;

        Ok(true)
    }
}

/// 生成 Markdown 文本
pub fn render_markdown(
    summary: &BatchSummary,
    input_source: &str,
    generated_at: &str,
) -> Result<String, SinkError> {
    let mut out = String::new();
    // 写入 String 不会失败
    let _ = writeln!(out, "# ผลลัพธ์ OCR เอกสารอะไหล่รถยนต์\n");
    let _ = writeln!(out, "ประมวลผลเมื่อ: {}\n", generated_at);
    let _ = writeln!(out, "แหล่งที่มา: `{}`\n", input_source);
    out.push_str("---\n\n");

    for (image, outcome) in &summary.results {
        let _ = writeln!(out, "## {}\n", image.name);
        match outcome {
            PipelineOutcome::Success { records, .. } if !records.is_empty() => {
                out.push_str("```json\n");
                out.push_str(&serde_json::to_string_pretty(records)?);
                out.push_str("\n```\n\n");
            }
            PipelineOutcome::Success { .. } | PipelineOutcome::Empty { .. } => {
                let _ = writeln!(out, "{}\n", EMPTY_PLACEHOLDER);
            }
            PipelineOutcome::Failure { .. } => {
                let _ = writeln!(out, "{}\n", FAILURE_PLACEHOLDER);
            }
        }
        out.push_str("---\n\n");
    }

    let _ = writeln!(out, "## สรุป\n");
    let _ = writeln!(out, "- Attempted: {}", summary.attempted);
    let _ = writeln!(out, "- Succeeded: {}", summary.succeeded);
    let _ = writeln!(out, "- Empty: {}", summary.empty);
    let _ = writeln!(out, "- Failed: {}", summary.failed);
    let _ = writeln!(out, "- Input tokens: {}", summary.usage.input_tokens);
    let _ = writeln!(out, "- Output tokens: {}", summary.usage.output_tokens);
    let _ = writeln!(out, "- Total tokens: {}", summary.usage.total_tokens);

    Ok(out)
}
