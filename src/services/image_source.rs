//! 图片来源服务 - 业务能力层
//!
//! 只负责"列出图片 / 读取图片字节"能力

use crate::error::SourceError;
use crate::models::{ByteSource, ImageRef};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// 支持的图片扩展名
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 图片来源能力
#[async_trait]
pub trait FileSource: Send + Sync {
    /// 列出所有待处理的图片（顺序即处理顺序）
    async fn list_images(&self) -> Result<Vec<ImageRef>, SourceError>;

    /// 读取一张图片的字节
    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, SourceError>;

    /// 批次结束后清理临时文件，失败只记录日志
    async fn cleanup(&self) {}
}

/// 判断文件名是否为支持的图片
pub fn is_supported_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 本地目录
pub struct LocalDirSource {
    dir: PathBuf,
}

impl LocalDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FileSource for LocalDirSource {
    async fn list_images(&self) -> Result<Vec<ImageRef>, SourceError> {
        let dir_display = self.dir.display().to_string();
        info!("📁 正在扫描图片目录: {}", dir_display);

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| SourceError::io(&dir_display, e))?;

        let mut images = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::io(&dir_display, e))?
        {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();

            if is_file && is_supported_image(&name) {
                images.push(ImageRef::local(path));
            } else {
                debug!("跳过: {}", name);
            }
        }

        // read_dir 的顺序不固定，按文件名排序
        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, SourceError> {
        match &image.source {
            ByteSource::Local(path) => fs::read(path)
                .await
                .map_err(|e| SourceError::io(path.display().to_string(), e)),
            ByteSource::Remote { .. } => Err(SourceError::UnsupportedRef {
                name: image.name.clone(),
            }),
        }
    }
}
