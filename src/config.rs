//! 程序配置
//!
//! 加载顺序：默认值 → TOML 配置文件（可选）→ 环境变量。
//! 只在启动时构造一次，之后以引用或 `Arc` 的形式传入各层。

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// 默认配置文件名（存在时自动加载）
const DEFAULT_CONFIG_FILE: &str = "ocr_config.toml";

/// 图片来源
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    /// 本地目录
    LocalDir(String),
    /// 远程文件夹（Drive 文件夹 ID）
    DriveFolder(String),
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::LocalDir(path) => write!(f, "{}", path),
            InputSource::DriveFolder(id) => write!(f, "drive://{}", id),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时进行的 OCR 调用数量
    pub max_concurrent_ocr: usize,
    /// 本地图片目录
    pub input_dir: Option<String>,
    /// 远程图片文件夹 ID
    pub drive_folder_id: Option<String>,
    /// 远程图片的临时下载目录
    pub download_dir: String,
    /// Markdown 结果文件
    pub output_report_file: String,
    /// 是否保存预处理后的图片
    pub save_normalized_images: bool,
    /// 预处理图片的保存目录
    pub normalized_output_dir: String,
    /// 缩放的最大宽度
    pub target_width: u32,
    /// 固定画布宽度（与 `canvas_height` 同时设置时启用画布模式）
    pub canvas_width: Option<u32>,
    /// 固定画布高度
    pub canvas_height: Option<u32>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- Google 配置 ---
    pub google_access_token: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_ocr: 5,
            input_dir: None,
            drive_folder_id: None,
            download_dir: "downloaded_images".to_string(),
            output_report_file: "document_ocr_results.md".to_string(),
            save_normalized_images: true,
            normalized_output_dir: "preprocessed_document_output".to_string(),
            target_width: 1600,
            canvas_width: None,
            canvas_height: None,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-1.5-pro-latest".to_string(),
            google_access_token: None,
            spreadsheet_id: None,
            sheet_name: "Sheet1".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：配置文件（可选）+ 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("OCR_CONFIG_FILE").ok();
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let base = if Path::new(&path).exists() {
            info!("📄 读取配置文件: {}", path);
            Self::from_toml_file(&path)?
        } else if explicit.is_some() {
            return Err(ConfigError::FileNotFound { path });
        } else {
            Self::default()
        };

        base.with_env_overrides()
    }

    /// 从 TOML 文件读取配置
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::FileParse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            max_concurrent_ocr: env_parse("MAX_CONCURRENT_OCR", "usize")?
                .unwrap_or(self.max_concurrent_ocr),
            input_dir: env_string("INPUT_IMAGE_DIRECTORY").or(self.input_dir),
            drive_folder_id: env_string("DRIVE_FOLDER_ID").or(self.drive_folder_id),
            download_dir: env_string("DOWNLOAD_DIR").unwrap_or(self.download_dir),
            output_report_file: env_string("OUTPUT_REPORT_FILE")
                .unwrap_or(self.output_report_file),
            save_normalized_images: env_parse("SAVE_NORMALIZED_IMAGES", "bool")?
                .unwrap_or(self.save_normalized_images),
            normalized_output_dir: env_string("NORMALIZED_OUTPUT_DIR")
                .unwrap_or(self.normalized_output_dir),
            target_width: env_parse("TARGET_WIDTH", "u32")?.unwrap_or(self.target_width),
            canvas_width: env_parse("CANVAS_WIDTH", "u32")?.or(self.canvas_width),
            canvas_height: env_parse("CANVAS_HEIGHT", "u32")?.or(self.canvas_height),
            verbose_logging: env_parse("VERBOSE_LOGGING", "bool")?
                .unwrap_or(self.verbose_logging),
            llm_api_key: env_string("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            google_access_token: env_string("GOOGLE_ACCESS_TOKEN")
                .or(self.google_access_token),
            spreadsheet_id: env_string("SPREADSHEET_ID").or(self.spreadsheet_id),
            sheet_name: env_string("SHEET_NAME").unwrap_or(self.sheet_name),
        })
    }

    /// 启动前校验，任何错误都是致命的
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::Missing { key: "LLM_API_KEY" });
        }
        if self.max_concurrent_ocr == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CONCURRENT_OCR",
                value: "0".to_string(),
                expected: "正整数",
            });
        }

        match self.input_source()? {
            InputSource::LocalDir(dir) => {
                if !Path::new(&dir).is_dir() {
                    return Err(ConfigError::InputNotFound { path: dir });
                }
            }
            InputSource::DriveFolder(_) => {
                if self.access_token().is_none() {
                    return Err(ConfigError::Missing { key: "GOOGLE_ACCESS_TOKEN" });
                }
            }
        }

        if self.spreadsheet_id().is_some() && self.access_token().is_none() {
            return Err(ConfigError::Missing { key: "GOOGLE_ACCESS_TOKEN" });
        }

        Ok(())
    }

    /// 解析图片来源（本地目录和远程文件夹只能二选一）
    pub fn input_source(&self) -> Result<InputSource, ConfigError> {
        let dir = non_empty(self.input_dir.as_deref());
        let folder = non_empty(self.drive_folder_id.as_deref());
        match (dir, folder) {
            (Some(dir), None) => Ok(InputSource::LocalDir(dir.to_string())),
            (None, Some(folder)) => Ok(InputSource::DriveFolder(folder.to_string())),
            (Some(_), Some(_)) => Err(ConfigError::Conflict {
                first: "INPUT_IMAGE_DIRECTORY",
                second: "DRIVE_FOLDER_ID",
            }),
            (None, None) => Err(ConfigError::Missing {
                key: "INPUT_IMAGE_DIRECTORY / DRIVE_FOLDER_ID",
            }),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        non_empty(self.google_access_token.as_deref())
    }

    pub fn spreadsheet_id(&self) -> Option<&str> {
        non_empty(self.spreadsheet_id.as_deref())
    }

    /// 画布模式的尺寸（宽、高都设置时才生效）
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        match (self.canvas_width, self.canvas_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(
    key: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value, expected }),
    }
}
