//! 响应解析服务 - 业务能力层
//!
//! 从模型返回的文本中提取记录列表：
//! 1. 正则扫描，优先匹配 ```json 代码块，其次匹配裸的 `[...]`
//! 2. 对提取出的片段做严格的 JSON 解码
//! 3. 校验结构必须是对象数组

use crate::error::ParseError;
use crate::models::ExtractedRecord;
use crate::utils::logging::truncate_text;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use tracing::debug;

/// 错误信息中保留的原始文本长度
const SNIPPET_LEN: usize = 200;

fn fenced_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*([\[{].*?[\]}])\s*```").expect("静态正则")
    })
}

fn bare_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").expect("静态正则"))
}

/// 找到候选的 JSON 片段
pub fn extract_block(raw_text: &str) -> Option<&str> {
    if let Some(caps) = fenced_pattern().captures(raw_text) {
        return caps.get(1).map(|m| m.as_str());
    }
    bare_pattern().find(raw_text).map(|m| m.as_str())
}

/// 解析模型响应
pub fn parse(raw_text: &str) -> Result<Vec<ExtractedRecord>, ParseError> {
    let block = extract_block(raw_text).ok_or(ParseError::NoStructureFound)?;
    debug!("提取到 JSON 片段，长度: {} 字符", block.len());

    let decoded: JsonValue =
        serde_json::from_str(block).map_err(|source| ParseError::MalformedStructure {
            snippet: truncate_text(raw_text, SNIPPET_LEN),
            source,
        })?;

    let items = match decoded {
        JsonValue::Array(items) => items,
        other => {
            return Err(ParseError::UnexpectedShape {
                found: format!("顶层为 {}", describe(&other)),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            JsonValue::Object(map) => Ok(ExtractedRecord::new(map)),
            other => Err(ParseError::UnexpectedShape {
                found: format!("第 {} 个元素为 {}", index, describe(&other)),
            }),
        })
        .collect()
}

fn describe(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "布尔值",
        JsonValue::Number(_) => "数字",
        JsonValue::String(_) => "字符串",
        JsonValue::Array(_) => "数组",
        JsonValue::Object(_) => "对象",
    }
}
