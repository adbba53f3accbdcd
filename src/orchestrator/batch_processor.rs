//! 批量图片处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量图片的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：根据配置创建图片来源、模型客户端和输出服务
//! 2. **批量加载**：列出所有待处理的图片（`Vec<ImageRef>`）
//! 3. **并发控制**：所有图片一次性启动，Semaphore 只限制推理调用
//! 4. **屏障**：等待所有任务结束后再汇总，结果按输入顺序排列
//! 5. **输出**：依次写 Markdown 报告和表格，一个失败不影响另一个
//! 6. **全局统计**：汇总所有图片的处理结果和 Token 用量

use crate::clients::{DriveClient, SheetsClient};
use crate::config::{Config, InputSource};
use crate::error::{AppError, AppResult, PipelineError, SinkError};
use crate::models::{ImageRef, PipelineOutcome};
use crate::orchestrator::aggregator::BatchSummary;
use crate::services::image_normalizer::ImageNormalizer;
use crate::services::llm_service::{Infer, LlmService, EXTRACTION_PROMPT};
use crate::services::{FileSource, LocalDirSource, ReportWriter, RowSink, SheetWriter};
use crate::utils::logging::{log_images_loaded, log_startup, print_final_stats};
use crate::workflow::{ImageCtx, ImageFlow};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 一次运行的结果
#[derive(Debug)]
pub struct BatchReport {
    pub summary: BatchSummary,
    /// 写入的 Markdown 报告路径（没有写入时为 `None`）
    pub report_path: Option<PathBuf>,
    /// 写入表格的行数（未配置表格或写入失败时为 `None`）
    pub rows_written: Option<usize>,
    /// 输出阶段的错误（不影响已计算的结果）
    pub sink_errors: Vec<SinkError>,
}

/// 应用主结构
pub struct App {
    config: Config,
    input_source: InputSource,
    source: Arc<dyn FileSource>,
    inference: Arc<dyn Infer>,
    normalizer: Arc<ImageNormalizer>,
    report_writer: ReportWriter,
    sheet_writer: Option<SheetWriter>,
}

impl App {
    /// 初始化应用
    ///
    /// 配置校验失败时直接返回错误，不会处理任何图片
    pub fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;
        let input_source = config.input_source()?;
        log_startup(&config, &input_source.to_string());

        let source: Arc<dyn FileSource> = match &input_source {
            InputSource::LocalDir(dir) => Arc::new(LocalDirSource::new(dir)),
            InputSource::DriveFolder(folder) => {
                let token = config
                    .access_token()
                    .ok_or_else(|| AppError::Other("缺少 GOOGLE_ACCESS_TOKEN".to_string()))?;
                Arc::new(DriveClient::new(
                    folder.clone(),
                    token,
                    config.download_dir.clone(),
                ))
            }
        };

        let row_sink = match (config.spreadsheet_id(), config.access_token()) {
            (Some(id), Some(token)) => {
                Some(Arc::new(SheetsClient::new(id, token)) as Arc<dyn RowSink>)
            }
            _ => None,
        };

        let inference = Arc::new(LlmService::new(&config));

        Ok(Self::with_components(config, input_source, source, inference, row_sink))
    }

    /// 使用指定的组件创建（测试时注入假实现）
    ///
    /// 并发上限至少为 1
    pub fn with_components(
        mut config: Config,
        input_source: InputSource,
        source: Arc<dyn FileSource>,
        inference: Arc<dyn Infer>,
        row_sink: Option<Arc<dyn RowSink>>,
    ) -> Self {
        if config.max_concurrent_ocr == 0 {
            warn!("⚠️ 最大并发数为 0，按 1 处理");
            config.max_concurrent_ocr = 1;
        }
        let normalizer = Arc::new(ImageNormalizer::new(&config));
        let report_writer = ReportWriter::new(&config.output_report_file);
        let sheet_writer = row_sink.map(|sink| SheetWriter::new(sink, config.sheet_name.clone()));

        Self {
            config,
            input_source,
            source,
            inference,
            normalizer,
            report_writer,
            sheet_writer,
        }
    }

    /// 运行应用主逻辑
    ///
    /// # 返回
    /// 没有图片时返回 `Ok(None)`
    pub async fn run(&self) -> AppResult<Option<BatchReport>> {
        // 列出所有待处理的图片
        let images = self.source.list_images().await?;

        if images.is_empty() {
            warn!("⚠️ 没有找到待处理的图片 (.png, .jpg, .jpeg)，程序结束");
            return Ok(None);
        }

        log_images_loaded(images.len(), self.config.max_concurrent_ocr);

        // 处理所有图片（屏障）
        let results = self.process_all(images).await;
        info!("=== 所有图片处理结束，正在汇总结果 ===");

        let summary = BatchSummary::from_outcomes(results);

        // 临时文件在屏障之后清理
        self.source.cleanup().await;

        let report = self.write_outputs(summary).await;

        print_final_stats(
            &report.summary,
            report.report_path.as_deref(),
            self.normalizer
                .save_dir()
                .map(|_| self.config.normalized_output_dir.as_str()),
        );

        Ok(Some(report))
    }

    /// 处理所有图片
    ///
    /// 每张图片一个任务，全部立即启动；结果与输入一一对应、顺序一致
    pub async fn process_all(&self, images: Vec<ImageRef>) -> Vec<(ImageRef, PipelineOutcome)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_ocr));
        let flow = Arc::new(ImageFlow::new(
            self.source.clone(),
            self.normalizer.clone(),
            self.inference.clone(),
            semaphore,
            EXTRACTION_PROMPT,
        ));

        let total = images.len();
        info!(
            "=== 开始处理 {} 张图片（最大并发: {}）===",
            total, self.config.max_concurrent_ocr
        );

        // 为每张图片创建并发任务
        let mut handles = Vec::with_capacity(total);
        for (idx, image) in images.iter().enumerate() {
            let ctx = ImageCtx::new(idx + 1, total, image.name.clone());
            let flow = flow.clone();
            let task_image = image.clone();
            handles.push(tokio::spawn(async move { flow.run(&task_image, &ctx).await }));
        }

        // 等待所有任务完成
        let joined = join_all(handles).await;

        images
            .into_iter()
            .zip(joined)
            .enumerate()
            .map(|(idx, (image, result))| match result {
                Ok(outcome) => (image, outcome),
                Err(e) => {
                    error!("[图片 {}] 任务执行失败: {}", idx + 1, e);
                    let outcome = PipelineOutcome::failure(PipelineError::TaskAborted {
                        message: e.to_string(),
                    });
                    (image, outcome)
                }
            })
            .collect()
    }

    /// 依次写入报告和表格
    async fn write_outputs(&self, summary: BatchSummary) -> BatchReport {
        let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut sink_errors = Vec::new();

        info!(
            "=== 正在保存结果到 '{}' ===",
            self.report_writer.path().display()
        );
        let report_path = match self
            .report_writer
            .write(&summary, &self.input_source.to_string(), &generated_at)
            .await
        {
            Ok(true) => {
                info!(
                    "✨ 结果已保存到 '{}'",
                    self.report_writer.path().display()
                );
                Some(self.report_writer.path().to_path_buf())
            }
            Ok(false) => None,
            Err(e) => {
                error!("❌ 保存 Markdown 报告失败: {}", e);
                sink_errors.push(e);
                None
            }
        };

        let rows_written = match &self.sheet_writer {
            Some(writer) => {
                let rows = summary.rows(&generated_at);
                match writer.append(&rows).await {
                    Ok(count) => Some(count),
                    Err(e) => {
                        error!("❌ 写入表格失败: {}", e);
                        sink_errors.push(e);
                        None
                    }
                }
            }
            None => None,
        };

        BatchReport {
            summary,
            report_path,
            rows_written,
            sink_errors,
        }
    }
}
