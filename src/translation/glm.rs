//! GLM AI 翻译服务（流式 + 非流式）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::providers::{mask_api_key, OpenAIAdapter, ProviderAdapter, ProviderRequest};

use super::decoder::StreamDecoder;
use super::error::TranslationError;
use super::prompt::build_messages;
use super::types::{Fragment, FragmentSink, TranslationRequest, TranslationResult};
use super::Translator;

pub const DEFAULT_GLM_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const DEFAULT_GLM_MODEL: &str = "glm-4.6";

const TRANSLATION_TEMPERATURE: f64 = 0.6;
const PROBE_TEMPERATURE: f64 = 0.1;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GLM 连接配置
#[derive(Debug, Clone, PartialEq)]
pub struct GlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// 非流式请求的整体超时；流式请求用作读取空闲超时
    pub request_timeout: Duration,
}

impl Default for GlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GLM_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_GLM_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

pub struct GlmTranslationService {
    client: Client,
    config: GlmConfig,
    adapter: Arc<dyn ProviderAdapter>,
}

impl GlmTranslationService {
    pub fn new(client: Client, config: GlmConfig) -> Self {
        Self {
            client,
            config,
            adapter: Arc::new(OpenAIAdapter),
        }
    }

    pub fn update_api_key(&mut self, api_key: impl Into<String>) {
        self.config.api_key = api_key.into();
    }

    pub fn update_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    pub fn config(&self) -> &GlmConfig {
        &self.config
    }

    /// 支持的模型列表（代码，显示名）
    pub fn supported_models() -> &'static [(&'static str, &'static str)] {
        &[
            ("glm-4.6", "GLM-4.6"),
            ("glm-4", "GLM-4"),
            ("glm-4-flash", "GLM-4-Flash"),
        ]
    }

    fn require_api_key(&self) -> Result<&str, TranslationError> {
        let key = self.config.api_key.trim();
        if key.is_empty() {
            error!("[GLMService] API密钥未设置");
            return Err(TranslationError::Configuration("GLM API密钥未设置".to_string()));
        }
        Ok(key)
    }

    fn build_request(&self, api_key: &str, body: &Value) -> Result<ProviderRequest, TranslationError> {
        self.adapter
            .build_request(&self.config.base_url, api_key, body)
            .map_err(|e| TranslationError::Configuration(format!("翻译请求构建失败: {}", e)))
    }

    /// 发送请求；`deadline` 为 None 时不限制整体耗时（流式响应）
    async fn send(
        &self,
        preq: &ProviderRequest,
        deadline: Option<Duration>,
    ) -> Result<reqwest::Response, TranslationError> {
        let mut header_map = HeaderMap::new();
        for (k, v) in preq.headers.iter() {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                header_map.insert(name, val);
            }
        }

        let mut builder = self.client.post(&preq.url).headers(header_map).json(&preq.body);
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }
        let response = builder.send().await?;

        let status = response.status();
        info!("[GLMService] 响应状态: {}", status);
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let upstream = serde_json::from_str::<Value>(&error_text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });
        error!("[GLMService] API错误 {}: {}", status, error_text);
        Err(TranslationError::provider(
            Some(status.as_u16()),
            format!("GLM API错误 {}: {}", status.as_u16(), upstream),
        ))
    }

    /// 流式翻译
    ///
    /// 每解码出一个片段就累加到译文中并投递给 `sink`；
    /// `sink` 的接收端消失不会中断网络读取。
    pub async fn translate_stream(
        &self,
        request: &TranslationRequest,
        sink: Option<&FragmentSink>,
    ) -> Result<TranslationResult, TranslationError> {
        info!(
            "[GLMService] 开始翻译 - 源语言: {}, 目标语言: {}, 文本长度: {}",
            request.source_language(),
            request.target_language(),
            request.text().chars().count()
        );
        let api_key = self.require_api_key()?;
        debug!(
            "[GLMService] 使用模型: {}, API密钥: {}",
            self.config.model,
            mask_api_key(api_key)
        );

        let body = json!({
            "model": self.config.model,
            "messages": build_messages(
                request.text(),
                request.source_language(),
                request.target_language()
            ),
            "temperature": TRANSLATION_TEMPERATURE,
            "stream": true,
        });
        let preq = self.build_request(api_key, &body)?;
        let response = self.send(&preq, None).await?;

        let mut decoder = StreamDecoder::new(Box::pin(response.bytes_stream()), self.adapter.clone())
            .with_idle_timeout(self.config.request_timeout);
        let mut accumulated = String::new();
        let mut display = DisplayTrim::default();
        let mut seq: u64 = 0;
        let mut sink_open = true;

        while let Some(content) = decoder.next_fragment().await? {
            accumulated.push_str(&content);
            let Some(text) = display.admit(&content) else {
                continue;
            };
            if let Some(sink) = sink {
                if sink_open && !sink.deliver(Fragment { seq, text }) {
                    warn!("[GLMService] 片段接收端已关闭，继续读取网络流");
                    sink_open = false;
                }
            }
            seq += 1;
        }
        debug!("[GLMService] 流式响应读取完成，共投递 {} 个片段", seq);

        finish_result(request, accumulated)
    }

    /// 非流式翻译：一次请求/响应，不产生片段
    pub async fn translate_once(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResult, TranslationError> {
        let api_key = self.require_api_key()?;
        let body = json!({
            "model": self.config.model,
            "messages": build_messages(
                request.text(),
                request.source_language(),
                request.target_language()
            ),
            "temperature": TRANSLATION_TEMPERATURE,
            "stream": false,
        });
        let preq = self.build_request(api_key, &body)?;
        let response = self.send(&preq, Some(self.config.request_timeout)).await?;
        let json: Value = response.json().await?;
        let content = self.adapter.parse_completion(&json).unwrap_or_default();

        finish_result(request, content)
    }

    /// 验证 API 密钥：最小请求，仅按 HTTP 状态判断
    pub async fn validate_api_key(&self) -> bool {
        let Ok(api_key) = self.require_api_key() else {
            return false;
        };
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": "Hello" }],
            "temperature": PROBE_TEMPERATURE,
            "stream": false,
        });
        let Ok(preq) = self.build_request(api_key, &body) else {
            return false;
        };
        match self.send(&preq, Some(self.config.request_timeout)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("[GLMService] 验证GLM API密钥失败: {}", e);
                false
            }
        }
    }
}

/// 投递给浮窗的片段与最终译文（首尾去空白）保持前缀关系：
/// 开头的空白直接丢弃，末尾的空白暂存到下一个非空白片段到达时再一起投递。
#[derive(Debug, Default)]
struct DisplayTrim {
    started: bool,
    held: String,
}

impl DisplayTrim {
    fn admit(&mut self, content: &str) -> Option<String> {
        let content = if self.started {
            content
        } else {
            content.trim_start()
        };
        if content.is_empty() {
            return None;
        }
        self.started = true;

        self.held.push_str(content);
        let visible_len = self.held.trim_end().len();
        if visible_len == 0 {
            return None;
        }
        let trailing = self.held.split_off(visible_len);
        Some(std::mem::replace(&mut self.held, trailing))
    }
}

fn finish_result(
    request: &TranslationRequest,
    accumulated: String,
) -> Result<TranslationResult, TranslationError> {
    let translated = accumulated.trim();
    if translated.is_empty() {
        error!("[GLMService] GLM返回空翻译结果");
        return Err(TranslationError::EmptyResult);
    }

    Ok(TranslationResult {
        original_text: request.text().to_string(),
        translated_text: translated.to_string(),
        source_language: Some(request.source_language().to_string()),
        target_language: Some(request.target_language().to_string()),
        pronunciation: None,
    })
}

#[async_trait]
impl Translator for GlmTranslationService {
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResult, TranslationError> {
        self.translate_once(request).await
    }
}
