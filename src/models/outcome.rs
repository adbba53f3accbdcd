//! 单张图片的处理结果

use crate::error::PipelineError;
use crate::models::record::ExtractedRecord;
use std::ops::{Add, AddAssign};

/// Token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageStats {
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

impl Add for UsageStats {
    type Output = UsageStats;

    fn add(self, rhs: Self) -> Self::Output {
        UsageStats {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for UsageStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for UsageStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(UsageStats::default(), Add::add)
    }
}

/// 单张图片的最终结果，每张图片恰好一个
#[derive(Debug)]
pub enum PipelineOutcome {
    /// 成功提取到记录
    Success {
        records: Vec<ExtractedRecord>,
        usage: UsageStats,
    },
    /// 调用成功但没有数据
    Empty { usage: UsageStats },
    /// 处理失败
    Failure {
        reason: PipelineError,
        usage: Option<UsageStats>,
    },
}

impl PipelineOutcome {
    /// 计入批次总量的用量
    pub fn usage(&self) -> Option<UsageStats> {
        match self {
            PipelineOutcome::Success { usage, .. } | PipelineOutcome::Empty { usage } => {
                Some(*usage)
            }
            PipelineOutcome::Failure { usage, .. } => *usage,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineOutcome::Failure { .. })
    }

    /// 失败结果，用量取自推理错误（如果有）
    pub fn failure(reason: PipelineError) -> Self {
        let usage = match &reason {
            PipelineError::Inference(e) => e.usage,
            _ => None,
        };
        PipelineOutcome::Failure { reason, usage }
    }
}
