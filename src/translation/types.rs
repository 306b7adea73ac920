/// 翻译模块类型定义
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::error::TranslationError;

/// 单次翻译允许的最大字符数
pub const MAX_SOURCE_CHARS: usize = 500;

/// 翻译服务提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// 普通 HTTP 翻译（非流式）
    #[default]
    #[serde(alias = "primary")]
    Google,
    /// AI 流式翻译
    #[serde(alias = "ai-streaming")]
    Glm,
    /// 本地启发式备用翻译
    #[serde(alias = "fallback")]
    Backup,
}

impl Provider {
    pub fn code(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Glm => "glm",
            Provider::Backup => "backup",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Google => "Google翻译",
            Provider::Glm => "GLM AI翻译",
            Provider::Backup => "备用翻译",
        }
    }

    /// 只有 AI 服务走流式管线
    pub fn supports_streaming(self) -> bool {
        matches!(self, Provider::Glm)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 翻译请求（创建后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    source_text: String,
    source_language: String,
    target_language: String,
    provider: Provider,
}

impl TranslationRequest {
    pub fn new(
        source_text: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        provider: Provider,
    ) -> Result<Self, TranslationError> {
        let source_text = source_text.into();
        if source_text.trim().is_empty() {
            return Err(TranslationError::InvalidRequest("翻译文本不能为空".to_string()));
        }

        let char_count = source_text.chars().count();
        if char_count > MAX_SOURCE_CHARS {
            return Err(TranslationError::InvalidRequest(format!(
                "翻译文本过长（当前 {} 字符，最大 {} 字符）",
                char_count, MAX_SOURCE_CHARS
            )));
        }

        let target_language = target_language.into();
        if target_language.trim().is_empty() || target_language == "auto" {
            return Err(TranslationError::InvalidRequest(
                "目标语言无效".to_string(),
            ));
        }

        Ok(Self {
            source_text,
            source_language: source_language.into(),
            target_language,
            provider,
        })
    }

    pub fn text(&self) -> &str {
        &self.source_text
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// 以相同文本与语言对，派生出一个指向其它服务的新请求
    pub fn with_provider(&self, provider: Provider) -> Self {
        Self {
            provider,
            ..self.clone()
        }
    }
}

/// 翻译结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<String>,
}

/// 流式译文片段，`seq` 为同一请求内的到达序号（从 0 开始）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub seq: u64,
    pub text: String,
}

/// 片段投递通道的发送端
///
/// 网络读取循环只负责往通道里推片段，永远不会因为消费方出错或消失而中断。
#[derive(Debug, Clone)]
pub struct FragmentSink {
    tx: mpsc::UnboundedSender<Fragment>,
}

impl FragmentSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Fragment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 投递一个片段；接收端已关闭时返回 false
    pub fn deliver(&self, fragment: Fragment) -> bool {
        self.tx.send(fragment).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_provider_aliases() {
        let p: Provider = serde_json::from_str("\"ai-streaming\"").unwrap();
        assert_eq!(p, Provider::Glm);
        let p: Provider = serde_json::from_str("\"fallback\"").unwrap();
        assert_eq!(p, Provider::Backup);
        let p: Provider = serde_json::from_str("\"google\"").unwrap();
        assert_eq!(p, Provider::Google);
        assert_eq!(serde_json::to_string(&Provider::Glm).unwrap(), "\"glm\"");
    }

    #[test]
    fn test_request_validation() {
        assert_matches!(
            TranslationRequest::new("   ", "auto", "en", Provider::Glm),
            Err(TranslationError::InvalidRequest(_))
        );

        let long = "字".repeat(MAX_SOURCE_CHARS + 1);
        assert_matches!(
            TranslationRequest::new(long, "auto", "en", Provider::Glm),
            Err(TranslationError::InvalidRequest(_))
        );

        // 按字符而不是字节计数
        let exact = "字".repeat(MAX_SOURCE_CHARS);
        assert!(TranslationRequest::new(exact, "auto", "en", Provider::Glm).is_ok());

        assert_matches!(
            TranslationRequest::new("hello", "auto", "auto", Provider::Glm),
            Err(TranslationError::InvalidRequest(_))
        );
    }

    #[test]
    fn test_with_provider_keeps_payload() {
        let req = TranslationRequest::new("今天天气真好。", "auto", "en", Provider::Glm).unwrap();
        let backup = req.with_provider(Provider::Backup);
        assert_eq!(backup.provider(), Provider::Backup);
        assert_eq!(backup.text(), req.text());
        assert_eq!(req.provider(), Provider::Glm);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = TranslationResult {
            original_text: "hi".into(),
            translated_text: "你好".into(),
            source_language: Some("en".into()),
            target_language: None,
            pronunciation: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["originalText"], "hi");
        assert_eq!(value["translatedText"], "你好");
        assert!(value.get("targetLanguage").is_none());
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (sink, rx) = FragmentSink::channel();
        assert!(sink.deliver(Fragment { seq: 0, text: "a".into() }));
        drop(rx);
        assert!(!sink.deliver(Fragment { seq: 1, text: "b".into() }));
        assert!(sink.is_closed());
    }
}
