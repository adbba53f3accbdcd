//! # Parts Catalog OCR
//!
//! 一个用于批量识别汽车配件目录扫描图片的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 远程 REST 接口（云盘文件夹、在线表格）
//! - `DriveClient` - 列出并下载文件夹中的图片
//! - `SheetsClient` - 读取 / 写入表格区域
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单张图片
//! - `ImageNormalizer` - 图片预处理能力
//! - `LlmService` - 看图提取文字能力
//! - `response_parser` - 从模型响应中解析记录
//! - `ReportWriter` / `SheetWriter` - 输出能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一张图片"的完整处理流程
//! - `ImageCtx` - 上下文封装（序号 + 文件名）
//! - `ImageFlow` - 流程编排（读取 → 预处理 → 推理 → 解析）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理资源和并发
//! - `orchestrator/aggregator` - 汇总所有图片的结果
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, InputSource};
pub use error::{AppError, AppResult, PipelineError};
pub use models::{CatalogRow, ExtractedRecord, ImageRef, PipelineOutcome, UsageStats};
pub use orchestrator::{App, BatchReport, BatchSummary};
pub use workflow::{ImageCtx, ImageFlow};
