//! 图片处理流程 - 流程层
//!
//! 核心职责：定义"一张图片"的完整处理流程
//!
//! 流程顺序：
//! 1. 读取字节 → 预处理并编码（工作线程）
//! 2. 获取并发许可 → 推理调用 → 立即释放许可
//! 3. 解析响应 → 成功 / 无数据 / 失败
//!
//! 流程内的任何错误都在这里转换为 `PipelineOutcome::Failure`，不会向上传播。

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::models::{ImageRef, PipelineOutcome};
use crate::services::image_normalizer::{CanonicalImage, ImageNormalizer};
use crate::services::llm_service::Infer;
use crate::services::response_parser;
use crate::services::FileSource;
use crate::utils::logging::truncate_text;
use crate::workflow::image_ctx::ImageCtx;

/// 单张图片的处理阶段
///
/// 只能向后推进，三个终态互斥
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Pending,
    Normalizing,
    Inferring,
    Parsing,
    Succeeded,
    EmptyResult,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::Succeeded | PipelineStage::EmptyResult | PipelineStage::Failed
        )
    }

    /// 是否允许从当前阶段进入 `next`
    pub fn can_advance_to(&self, next: PipelineStage) -> bool {
        !self.is_terminal() && next > *self
    }
}

/// 阶段跟踪（只用于日志和校验）
struct StageTracker<'a> {
    ctx: &'a ImageCtx,
    current: PipelineStage,
}

impl<'a> StageTracker<'a> {
    fn new(ctx: &'a ImageCtx) -> Self {
        Self {
            ctx,
            current: PipelineStage::Pending,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        debug_assert!(
            self.current.can_advance_to(next),
            "{:?} -> {:?}",
            self.current,
            next
        );
        debug!("{} {:?} → {:?}", self.ctx, self.current, next);
        self.current = next;
    }

    fn finish(mut self, outcome: PipelineOutcome) -> PipelineOutcome {
        let terminal = match &outcome {
            PipelineOutcome::Success { .. } => PipelineStage::Succeeded,
            PipelineOutcome::Empty { .. } => PipelineStage::EmptyResult,
            PipelineOutcome::Failure { .. } => PipelineStage::Failed,
        };
        self.advance(terminal);
        outcome
    }
}

/// 图片处理流程
///
/// - 编排单张图片的完整处理流程
/// - 并发许可只包住推理调用，预处理和解析不占用许可
/// - 只依赖业务能力（services）
pub struct ImageFlow {
    source: Arc<dyn FileSource>,
    normalizer: Arc<ImageNormalizer>,
    inference: Arc<dyn Infer>,
    semaphore: Arc<Semaphore>,
    prompt: String,
}

impl ImageFlow {
    pub fn new(
        source: Arc<dyn FileSource>,
        normalizer: Arc<ImageNormalizer>,
        inference: Arc<dyn Infer>,
        semaphore: Arc<Semaphore>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            source,
            normalizer,
            inference,
            semaphore,
            prompt: prompt.into(),
        }
    }

    /// 处理一张图片，总是返回一个结果
    pub async fn run(&self, image: &ImageRef, ctx: &ImageCtx) -> PipelineOutcome {
        let mut stages = StageTracker::new(ctx);

        // ========== 阶段 1: 预处理 ==========
        stages.advance(PipelineStage::Normalizing);
        let canonical = match self.normalize(image, ctx).await {
            Ok(canonical) => canonical,
            Err(e) => {
                error!("{} ❌ 预处理失败: {}", ctx, e);
                return stages.finish(PipelineOutcome::failure(e));
            }
        };

        // ========== 阶段 2: 推理 ==========
        stages.advance(PipelineStage::Inferring);
        let reply = {
            let _permit = match self.semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("{} ❌ 无法获取并发许可: {}", ctx, e);
                    return stages.finish(PipelineOutcome::failure(PipelineError::TaskAborted {
                        message: e.to_string(),
                    }));
                }
            };
            info!("{} 🤖 正在调用 OCR 模型...", ctx);
            self.inference.infer(&canonical, &self.prompt).await
        };
        drop(canonical);

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                error!("{} ❌ 推理调用失败: {}", ctx, e);
                if let Some(usage) = e.usage {
                    warn!(
                        "{} 失败前已消耗 Token: 输入={}, 输出={}, 总计={}",
                        ctx, usage.input_tokens, usage.output_tokens, usage.total_tokens
                    );
                }
                return stages.finish(PipelineOutcome::failure(e.into()));
            }
        };

        let usage = reply.usage.unwrap_or_default();
        if let Some(u) = reply.usage {
            info!(
                "{} Token: 输入={}, 输出={}, 总计={}",
                ctx, u.input_tokens, u.output_tokens, u.total_tokens
            );
        }

        let Some(text) = reply.text else {
            warn!("{} ⚠️ 模型响应中没有文本", ctx);
            return stages.finish(PipelineOutcome::Empty { usage });
        };
        debug!("{} 响应: {}", ctx, truncate_text(&text, 100));

        // ========== 阶段 3: 解析 ==========
        stages.advance(PipelineStage::Parsing);
        let outcome = match response_parser::parse(&text) {
            Ok(records) if records.is_empty() => {
                info!("{} ⚪ 没有识别到配件记录", ctx);
                PipelineOutcome::Empty { usage }
            }
            Ok(records) => {
                info!("{} ✓ 提取到 {} 条记录", ctx, records.len());
                PipelineOutcome::Success { records, usage }
            }
            Err(e) => {
                error!("{} ❌ 响应解析失败: {}", ctx, e);
                PipelineOutcome::Failure {
                    reason: e.into(),
                    usage: reply.usage,
                }
            }
        };

        stages.finish(outcome)
    }

    /// 读取并预处理
    async fn normalize(
        &self,
        image: &ImageRef,
        ctx: &ImageCtx,
    ) -> Result<CanonicalImage, PipelineError> {
        let bytes =
            self.source
                .fetch(image)
                .await
                .map_err(|source| PipelineError::SourceUnavailable {
                    name: image.name.clone(),
                    source,
                })?;
        debug!("{} 读取 {} 字节", ctx, bytes.len());

        // 解码、增强、编码和保存都在工作线程中完成
        let normalizer = self.normalizer.clone();
        let source = image.clone();
        let (canonical, persisted) = tokio::task::spawn_blocking(move || {
            let canonical = normalizer.normalize(&bytes, &source.name)?;
            let persisted = normalizer.persist(&canonical, &source);
            Ok::<_, PipelineError>((canonical, persisted))
        })
        .await
        .map_err(|e| PipelineError::TaskAborted {
            message: e.to_string(),
        })??;

        match persisted {
            Ok(Some(path)) => info!("{} 💾 预处理图片已保存: {}", ctx, path.display()),
            Ok(None) => {}
            Err(e) => warn!("{} ⚠️ 无法保存预处理图片: {}", ctx, e),
        }

        Ok(canonical)
    }
}
