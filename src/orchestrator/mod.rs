//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量图片处理器
//! - 管理应用生命周期（初始化、运行、清理）
//! - 列出所有图片（Vec<ImageRef>）并为每张图片启动任务
//! - 控制推理并发数量（Semaphore）
//! - 写报告和表格
//!
//! ### `aggregator` - 结果汇总
//! - 统计成功 / 无数据 / 失败数量
//! - 累加 Token 用量
//! - 生成表格行（包括占位行）
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<ImageRef>)
//!     ↓
//! workflow::ImageFlow (处理单张图片)
//!     ↓
//! services (能力层：source / normalizer / llm / parser)
//!     ↓
//! aggregator (汇总) → services (report / sheet)
//! ```

pub mod aggregator;
pub mod batch_processor;

// 重新导出主要类型
pub use aggregator::BatchSummary;
pub use batch_processor::{App, BatchReport};
