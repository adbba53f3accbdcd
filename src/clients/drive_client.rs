/// 云盘 API 客户端
///
/// 封装 Google Drive v3 的"按类型列出文件夹中的文件"与"下载文件"两个调用
use crate::error::SourceError;
use crate::models::{ByteSource, ImageRef};
use crate::services::image_source::FileSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/files";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
}

/// 云盘 API 客户端
///
/// 下载的文件放在临时目录中，批次结束后由 `cleanup` 删除
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    folder_id: String,
    access_token: String,
    download_dir: PathBuf,
    downloaded: Mutex<Vec<PathBuf>>,
}

impl DriveClient {
    pub fn new(
        folder_id: impl Into<String>,
        access_token: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_base_url(DRIVE_API_BASE, folder_id, access_token, download_dir)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        folder_id: impl Into<String>,
        access_token: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            folder_id: folder_id.into(),
            access_token: access_token.into(),
            download_dir: download_dir.into(),
            downloaded: Mutex::new(Vec::new()),
        }
    }

    fn list_query(&self) -> String {
        format!(
            "'{}' in parents and mimeType contains 'image/' and trashed = false",
            self.folder_id.replace('\'', "\\'")
        )
    }

    async fn get_checked(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, SourceError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::http(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::BadResponse {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl FileSource for DriveClient {
    async fn list_images(&self) -> Result<Vec<ImageRef>, SourceError> {
        info!("📁 正在列出云盘文件夹中的图片: {}", self.folder_id);

        let query = self.list_query();
        let mut images = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("fields", "nextPageToken, files(id, name)"),
                ("pageSize", "1000"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let response = self.get_checked(&self.base_url, &params).await?;
            let list: FileList = response
                .json()
                .await
                .map_err(|e| SourceError::http(&self.base_url, e))?;

            debug!("本页返回 {} 个文件", list.files.len());
            images.extend(
                list.files
                    .into_iter()
                    .map(|f| ImageRef::remote(f.name, f.id)),
            );

            match list.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, SourceError> {
        let ByteSource::Remote { file_id, .. } = &image.source else {
            return Err(SourceError::UnsupportedRef {
                name: image.name.clone(),
            });
        };

        let url = format!("{}/{}", self.base_url, file_id);
        let response = self.get_checked(&url, &[("alt", "media")]).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::http(&url, e))?;

        let path = self.download_dir.join(download_file_name(file_id, &image.name));
        let dir_display = self.download_dir.display().to_string();
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| SourceError::io(&dir_display, e))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| SourceError::io(path.display().to_string(), e))?;
        debug!("已下载 {} 到 {}", image.name, path.display());

        self.downloaded.lock().await.push(path);
        Ok(bytes.to_vec())
    }

    async fn cleanup(&self) {
        let paths = std::mem::take(&mut *self.downloaded.lock().await);
        if paths.is_empty() {
            return;
        }
        info!("🗑️ 清理 {} 个已下载的临时文件...", paths.len());
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("⚠️ 删除临时文件失败 {}: {}", path.display(), e);
            }
        }
    }
}

/// `<文件 ID>_<文件名>`，文件名中的路径分隔符替换为 `_`
///
/// 同名文件用 ID 区分；云盘文件名可以包含 `/`
fn download_file_name(file_id: &str, name: &str) -> String {
    let safe_name: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("{}_{}", file_id, safe_name)
}
