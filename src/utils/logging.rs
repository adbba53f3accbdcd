/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use crate::config::Config;
use crate::orchestrator::aggregator::BatchSummary;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// `RUST_LOG` 优先；否则默认 info，详细模式下为 debug。重复调用无副作用。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, input_source: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 汽车配件目录 OCR 批处理");
    info!("📂 图片来源: {}", input_source);
    info!("🤖 模型: {}", config.llm_model_name);
    info!("📊 最大并发数: {}", config.max_concurrent_ocr);
    if let Some(id) = config.spreadsheet_id() {
        info!("📋 表格: {} / {}", id, config.sheet_name);
    }
    info!("{}", "=".repeat(60));
}

/// 记录图片加载信息
pub fn log_images_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 张待处理的图片", total);
    info!("📋 同时最多 {} 个 OCR 调用", max_concurrent);
}

/// 打印最终统计信息
pub fn print_final_stats(
    summary: &BatchSummary,
    report_path: Option<&Path>,
    normalized_dir: Option<&str>,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📄 图片总数: {}", summary.attempted);
    info!("✅ 成功: {}/{}", summary.succeeded, summary.attempted);
    info!("⚪ 无数据: {}", summary.empty);
    info!("❌ 失败: {}", summary.failed);
    info!("🧾 提取记录: {}", summary.record_count());
    info!("{}", "-".repeat(30));
    info!("Token 输入: {}", summary.usage.input_tokens);
    info!("Token 输出: {}", summary.usage.output_tokens);
    info!("Token 总计: {}", summary.usage.total_tokens);
    info!("{}", "=".repeat(60));
    info!("\n{}", report_status(report_path));
    if let Some(dir) = normalized_dir {
        info!("预处理图片保存在: ./{}", dir);
    }

    if summary.failed > 0 {
        warn!(
            "⚠️ 有 {} 张图片处理失败，请查看上方日志了解详情",
            summary.failed
        );
    }
}

/// 报告的保存情况（未写入时不显示路径）
fn report_status(report_path: Option<&Path>) -> String {
    match report_path {
        Some(path) => format!("报告已保存至: {}", path.display()),
        None => "报告未写入".to_string(),
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
