use crate::models::UsageStats;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 图片来源错误
    #[error("图片来源错误: {0}")]
    Source(#[from] SourceError),
    /// 输出错误
    #[error("输出错误: {0}")]
    Sink(#[from] SinkError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 配置错误（启动阶段，致命）
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必需的配置项不存在
    #[error("缺少必需的配置项 {key}")]
    Missing { key: &'static str },
    /// 配置值无法解析
    #[error("配置项 {key} 解析失败: 值 '{value}' 无法转换为 {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    /// 两个互斥的配置项同时存在
    #[error("配置项 {first} 与 {second} 不能同时设置")]
    Conflict {
        first: &'static str,
        second: &'static str,
    },
    /// 输入目录不存在
    #[error("输入目录不存在: {path}")]
    InputNotFound { path: String },
    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    FileParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 图片来源错误（列举或读取图片）
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("读取 {path} 失败: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("请求 {endpoint} 失败: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} 返回错误状态 {status}: {body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("图片 {name} 不属于当前来源")]
    UnsupportedRef { name: String },
}

/// 推理调用错误
///
/// 远程调用失败时尽量保留已消耗的 token 数量
#[derive(Debug, Error)]
#[error("推理调用失败: {message}")]
pub struct InferenceError {
    pub message: String,
    pub usage: Option<UsageStats>,
}

impl InferenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            usage: None,
        }
    }

    pub fn with_usage(message: impl Into<String>, usage: Option<UsageStats>) -> Self {
        Self {
            message: message.into(),
            usage,
        }
    }
}

/// 响应解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 响应中没有找到数组块
    #[error("响应中没有找到 JSON 数组")]
    NoStructureFound,
    /// 找到了数组块，但无法解码
    #[error("JSON 解码失败 (响应: {snippet}): {source}")]
    MalformedStructure {
        snippet: String,
        #[source]
        source: serde_json::Error,
    },
    /// 解码成功，但结构不是对象数组
    #[error("JSON 结构不符合预期: {found}")]
    UnexpectedShape { found: String },
}

/// 单张图片的处理失败原因
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 无法读取源文件
    #[error("无法读取图片 {name}: {source}")]
    SourceUnavailable {
        name: String,
        #[source]
        source: SourceError,
    },
    /// 图片无法解码
    #[error("无效图片 {name}: {reason}")]
    InvalidImage { name: String, reason: String },
    /// 推理调用失败
    #[error(transparent)]
    Inference(#[from] InferenceError),
    /// 响应解析失败
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// 任务异常退出
    #[error("任务异常退出: {message}")]
    TaskAborted { message: String },
}

impl PipelineError {
    /// 简短的失败类别，用于表格占位行
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable { .. } => "SourceUnavailable",
            PipelineError::InvalidImage { .. } => "InvalidImage",
            PipelineError::Inference(_) => "InferenceError",
            PipelineError::Parse(ParseError::NoStructureFound) => "NoStructureFound",
            PipelineError::Parse(ParseError::MalformedStructure { .. }) => "MalformedStructure",
            PipelineError::Parse(ParseError::UnexpectedShape { .. }) => "UnexpectedShape",
            PipelineError::TaskAborted { .. } => "TaskAborted",
        }
    }
}

/// 输出错误（Markdown 文件 / 表格）
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("写入文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("请求 {endpoint} 失败: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} 返回错误状态 {status}: {body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ========== 便捷构造函数 ==========

impl SourceError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn http(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        SourceError::Http {
            endpoint: endpoint.into(),
            source,
        }
    }
}

impl SinkError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn http(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        SinkError::Http {
            endpoint: endpoint.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
