//! 图片处理上下文
//!
//! 封装"我正在处理第几张图片"这一信息

use std::fmt::Display;

/// 图片处理上下文
#[derive(Debug, Clone)]
pub struct ImageCtx {
    /// 图片在输入中的序号（从1开始，仅用于日志显示）
    pub index: usize,
    /// 图片总数
    pub total: usize,
    /// 图片名称
    pub name: String,
}

impl ImageCtx {
    pub fn new(index: usize, total: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            total,
            name: name.into(),
        }
    }
}

impl Display for ImageCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[图片 {}/{} {}]", self.index, self.total, self.name)
    }
}
