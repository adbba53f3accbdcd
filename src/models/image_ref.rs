//! 输入图片的引用

use std::fmt::Display;
use std::path::PathBuf;

/// 图片字节的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteSource {
    /// 本地文件
    Local(PathBuf),
    /// 远程文件（按 ID 下载）
    Remote { file_id: String },
}

/// 一张待处理的图片
///
/// 列举后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// 逻辑名称（文件名，不含路径）
    pub name: String,
    pub source: ByteSource,
}

impl ImageRef {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Self {
            name,
            source: ByteSource::Local(path),
        }
    }

    pub fn remote(name: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ByteSource::Remote {
                file_id: file_id.into(),
            },
        }
    }

    /// 远程文件的 ID（远程文件夹中文件名可以重复）
    pub fn file_id(&self) -> Option<&str> {
        match &self.source {
            ByteSource::Remote { file_id } => Some(file_id),
            ByteSource::Local(_) => None,
        }
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
