//! LLM 服务 - 业务能力层
//!
//! 只负责"看图提取文字"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini 的 OpenAI 兼容端点）
//!
//! 每次调用只请求一次，不做重试，也不做并发控制（由编排层负责）。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::InferenceError;
use crate::models::UsageStats;
use crate::services::image_normalizer::CanonicalImage;

/// 汽车配件目录的提取指令
pub const EXTRACTION_PROMPT: &str = r#"The image is a scanned auto-parts catalog page. The text may be Thai, English, or both.
Read every catalog entry on the page and return ONLY a JSON array, one object per entry, with exactly these keys:
"part_number", "part_name", "vehicle_model", "vehicle_year", "retail_price", "wholesale_price".
Copy values exactly as printed. Use an empty string for any value that is not printed.
If the page contains no catalog entries, return [].
Wrap the array in a ```json code block and do not add any other explanation."#;

/// 一次推理调用的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReply {
    /// 模型返回的文本，没有文本时为 `None`
    pub text: Option<String>,
    pub usage: Option<UsageStats>,
}

/// 推理能力
///
/// 没有文本不是错误，返回 `text: None`；
/// 调用失败时尽量在错误中带上已消耗的用量。
#[async_trait]
pub trait Infer: Send + Sync {
    async fn infer(
        &self,
        image: &CanonicalImage,
        prompt: &str,
    ) -> Result<InferenceReply, InferenceError>;
}

/// LLM 服务
///
/// 职责：
/// - 把标准图片和提示词发给多模态模型
/// - 提取返回文本和 token 用量
/// - 只处理单张图片
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            max_tokens: 8192,
        }
    }

    /// 构建包含文字和图片的用户消息
    fn build_messages(
        &self,
        image: &CanonicalImage,
        prompt: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>, InferenceError> {
        debug!("图片 PNG 大小: {} 字节", image.encoded_len());

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: image.data_url().to_string(),
                        detail: Some(ImageDetail::High),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()
            .map_err(|e| InferenceError::new(format!("构建消息失败: {}", e)))?;

        Ok(vec![ChatCompletionRequestMessage::User(user_msg)])
    }
}

#[async_trait]
impl Infer for LlmService {
    async fn infer(
        &self,
        image: &CanonicalImage,
        prompt: &str,
    ) -> Result<InferenceReply, InferenceError> {
        debug!(
            "调用 LLM API，模型: {}，图片尺寸: {}x{}",
            self.model_name,
            image.width(),
            image.height()
        );

        let messages = self.build_messages(image, prompt)?;

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| InferenceError::new(format!("构建请求失败: {}", e)))?;

        // 调用 API（OpenAI 兼容接口的错误对象不带用量信息）
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            InferenceError::new(format!("LLM API 调用失败: {}", e))
        })?;

        debug!("LLM API 调用成功");

        let usage = response.usage.as_ref().map(|u| {
            UsageStats::new(
                u.prompt_tokens as u64,
                u.completion_tokens as u64,
                u.total_tokens as u64,
            )
        });
        if usage.is_none() {
            warn!("LLM 响应中没有 usage 信息");
        }

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone());

        Ok(InferenceReply {
            text: normalize_text(text),
            usage,
        })
    }
}

/// 去掉首尾空白，空文本视为没有文本
pub fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
