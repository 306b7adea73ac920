use serde_json::Value;

use crate::translation::error::DecodeWarning;

#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

#[derive(Debug)]
pub enum AdapterError {
    BuildFailed(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::BuildFailed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ContentChunk(String),
    /// 可解析但没有正文增量（role 帧、finish_reason 帧等）
    Empty,
    Malformed(DecodeWarning),
    Done,
}

pub trait ProviderAdapter: Send + Sync {
    fn build_request(
        &self,
        base_url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<ProviderRequest, AdapterError>;

    /// 解析流式响应行，返回事件列表；非 `data: ` 行返回空列表
    fn parse_stream(&self, line: &str) -> Vec<StreamEvent>;

    /// 解析非流式响应体中的译文
    fn parse_completion(&self, body: &Value) -> Option<String>;
}

/// 打码 API key：仅保留前 4 个字符
pub fn mask_api_key(api_key: &str) -> String {
    let trimmed = api_key.trim();
    if trimmed.is_empty() {
        "EMPTY".to_string()
    } else {
        format!(
            "{}**** (len={})",
            trimmed.chars().take(4).collect::<String>(),
            trimmed.len()
        )
    }
}

/// OpenAI 兼容协议（GLM 走同一套 chat/completions 接口）
pub struct OpenAIAdapter;

impl ProviderAdapter for OpenAIAdapter {
    fn build_request(
        &self,
        base_url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<ProviderRequest, AdapterError> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        url::Url::parse(&url)
            .map_err(|e| AdapterError::BuildFailed(format!("无效的接口地址 {}: {}", url, e)))?;

        // 确保 API key 被 trim，移除首尾空白字符
        let trimmed_key = api_key.trim();
        tracing::debug!(
            "[OpenAIAdapter] build_request: url={}, api_key={}",
            url,
            mask_api_key(trimmed_key)
        );

        Ok(ProviderRequest {
            url,
            headers: vec![
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", trimmed_key),
                ),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: body.clone(),
        })
    }

    fn parse_stream(&self, line: &str) -> Vec<StreamEvent> {
        let Some(data) = line.strip_prefix("data: ") else {
            return Vec::new();
        };
        let data = data.trim();
        if data == "[DONE]" {
            return vec![StreamEvent::Done];
        }

        match serde_json::from_str::<Value>(data) {
            Ok(json_data) => {
                // 只取第一个 choice 的 delta.content
                match json_data["choices"][0]["delta"]["content"].as_str() {
                    Some(content) if !content.is_empty() => {
                        vec![StreamEvent::ContentChunk(content.to_string())]
                    }
                    _ => vec![StreamEvent::Empty],
                }
            }
            Err(e) => vec![StreamEvent::Malformed(DecodeWarning {
                line: data.to_string(),
                reason: e.to_string(),
            })],
        }
    }

    fn parse_completion(&self, body: &Value) -> Option<String> {
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
    }
}
