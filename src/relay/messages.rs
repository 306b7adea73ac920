//! 跨上下文消息定义
//!
//! 所有消息都是带 `type` 标签的 JSON 对象。接收方先识别标签，
//! 未知标签直接拒绝，不会去猜测字段。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::panel::geometry::Point;
use crate::settings::ExtensionSettings;
use crate::translation::types::{Provider, TranslationResult};

use super::RelayError;

/// 标签页 ID
pub type TabId = u32;

// ============================================================
// 消息类型常量
// ============================================================

pub mod message_types {
    pub const TRANSLATE_TEXT: &str = "TRANSLATE_TEXT";
    pub const TRANSLATION_STREAM_CHUNK: &str = "TRANSLATION_STREAM_CHUNK";
    pub const TRANSLATION_STREAM_COMPLETE: &str = "TRANSLATION_STREAM_COMPLETE";
    pub const VALIDATE_GLM_API_KEY: &str = "VALIDATE_GLM_API_KEY";
    pub const GET_SETTINGS: &str = "GET_SETTINGS";
    pub const UPDATE_SETTINGS: &str = "UPDATE_SETTINGS";
    pub const RESET_SETTINGS: &str = "RESET_SETTINGS";
    pub const TOGGLE_EXTENSION: &str = "TOGGLE_EXTENSION";
    pub const TRANSLATE_SELECTION: &str = "TRANSLATE_SELECTION";
    pub const SETTINGS_UPDATED: &str = "SETTINGS_UPDATED";
    pub const GET_SUPPORTED_OPTIONS: &str = "GET_SUPPORTED_OPTIONS";
    pub const DETECT_LANGUAGE: &str = "DETECT_LANGUAGE";

    pub const ALL: &[&str] = &[
        TRANSLATE_TEXT,
        TRANSLATION_STREAM_CHUNK,
        TRANSLATION_STREAM_COMPLETE,
        VALIDATE_GLM_API_KEY,
        GET_SETTINGS,
        UPDATE_SETTINGS,
        RESET_SETTINGS,
        TOGGLE_EXTENSION,
        TRANSLATE_SELECTION,
        SETTINGS_UPDATED,
        GET_SUPPORTED_OPTIONS,
        DETECT_LANGUAGE,
    ];
}

/// 扩展内部消息（封闭集合）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ExtensionMessage {
    /// 内容脚本 → 后台：请求翻译
    TranslateText {
        text: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        service: Option<Provider>,
        #[serde(default)]
        stream: bool,
        /// 流式片段回传时携带，用于识别过期请求
        #[serde(default)]
        request_id: u64,
    },
    /// 后台 → 内容脚本：单个流式片段
    TranslationStreamChunk {
        request_id: u64,
        seq: u64,
        chunk: String,
    },
    /// 后台 → 内容脚本：流式翻译完成（在所有片段之后发送）
    TranslationStreamComplete {
        request_id: u64,
        translation: TranslationResult,
    },
    ValidateGlmApiKey {
        api_key: String,
    },
    GetSettings,
    UpdateSettings {
        settings: Value,
    },
    ResetSettings,
    ToggleExtension {
        enabled: bool,
    },
    /// 后台 → 内容脚本：右键菜单/快捷键触发的划词翻译
    TranslateSelection {
        text: String,
        #[serde(default)]
        anchor: Option<Point>,
    },
    SettingsUpdated {
        settings: ExtensionSettings,
    },
    /// 弹窗 → 后台：读取语言、服务、模型选项
    GetSupportedOptions,
    DetectLanguage {
        text: String,
    },
}

impl ExtensionMessage {
    /// 从原始 JSON 解析消息；先校验标签，再解析字段
    pub fn from_value(value: Value) -> Result<Self, RelayError> {
        let tag = match value.get("type").and_then(Value::as_str) {
            Some(tag) => tag.to_string(),
            None => return Err(RelayError::Malformed("missing message type".to_string())),
        };
        if !message_types::ALL.contains(&tag.as_str()) {
            return Err(RelayError::UnknownMessage(tag));
        }
        serde_json::from_value(value).map_err(|e| RelayError::Malformed(format!("{}: {}", tag, e)))
    }

    pub fn to_value(&self) -> Result<Value, RelayError> {
        serde_json::to_value(self).map_err(|e| RelayError::Malformed(e.to_string()))
    }

    pub fn message_type(&self) -> &'static str {
        use message_types::*;
        match self {
            Self::TranslateText { .. } => TRANSLATE_TEXT,
            Self::TranslationStreamChunk { .. } => TRANSLATION_STREAM_CHUNK,
            Self::TranslationStreamComplete { .. } => TRANSLATION_STREAM_COMPLETE,
            Self::ValidateGlmApiKey { .. } => VALIDATE_GLM_API_KEY,
            Self::GetSettings => GET_SETTINGS,
            Self::UpdateSettings { .. } => UPDATE_SETTINGS,
            Self::ResetSettings => RESET_SETTINGS,
            Self::ToggleExtension { .. } => TOGGLE_EXTENSION,
            Self::TranslateSelection { .. } => TRANSLATE_SELECTION,
            Self::SettingsUpdated { .. } => SETTINGS_UPDATED,
            Self::GetSupportedOptions => GET_SUPPORTED_OPTIONS,
            Self::DetectLanguage { .. } => DETECT_LANGUAGE,
        }
    }
}

/// 消息发送方信息（来自标签页时携带 tab_id）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageSender {
    pub tab_id: Option<TabId>,
}

impl MessageSender {
    pub fn tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id),
        }
    }
}

/// 下拉选项（代码，显示名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub code: String,
    pub name: String,
}

impl OptionEntry {
    fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<Self> {
        pairs
            .into_iter()
            .map(|(code, name)| Self {
                code: code.to_string(),
                name: name.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedOptions {
    pub languages: Vec<OptionEntry>,
    pub services: Vec<OptionEntry>,
    pub glm_models: Vec<OptionEntry>,
}

impl SupportedOptions {
    pub fn new<'a>(
        languages: impl IntoIterator<Item = (&'a str, &'a str)>,
        services: impl IntoIterator<Item = (&'a str, &'a str)>,
        glm_models: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            languages: OptionEntry::from_pairs(languages),
            services: OptionEntry::from_pairs(services),
            glm_models: OptionEntry::from_pairs(glm_models),
        }
    }
}

/// 请求/响应消息的统一回复
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ExtensionSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SupportedOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl MessageResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn translated(translation: TranslationResult, is_stream: bool) -> Self {
        Self {
            success: true,
            translation: Some(translation),
            is_stream: Some(is_stream),
            ..Self::default()
        }
    }

    pub fn validity(valid: bool) -> Self {
        Self {
            success: true,
            valid: Some(valid),
            ..Self::default()
        }
    }

    pub fn with_settings(settings: ExtensionSettings) -> Self {
        Self {
            success: true,
            settings: Some(settings),
            ..Self::default()
        }
    }

    pub fn with_options(options: SupportedOptions) -> Self {
        Self {
            success: true,
            options: Some(options),
            ..Self::default()
        }
    }

    pub fn detected(language: impl Into<String>) -> Self {
        Self {
            success: true,
            language: Some(language.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let msg = ExtensionMessage::TranslationStreamChunk {
            request_id: 3,
            seq: 0,
            chunk: "The".into(),
        };
        assert_eq!(
            msg.to_value().unwrap(),
            json!({"type": "TRANSLATION_STREAM_CHUNK", "requestId": 3, "seq": 0, "chunk": "The"})
        );
        assert_eq!(
            ExtensionMessage::GetSettings.to_value().unwrap(),
            json!({"type": "GET_SETTINGS"})
        );
    }

    #[test]
    fn test_parse_translate_text_with_defaults() {
        let msg = ExtensionMessage::from_value(json!({
            "type": "TRANSLATE_TEXT",
            "text": "hello",
            "service": "ai-streaming",
            "stream": true
        }))
        .unwrap();
        assert_matches!(
            msg,
            ExtensionMessage::TranslateText { service: Some(Provider::Glm), stream: true, request_id: 0, .. }
        );
    }

    #[test]
    fn test_unknown_and_malformed_messages() {
        assert_matches!(
            ExtensionMessage::from_value(json!({"type": "OPEN_POPUP"})),
            Err(RelayError::UnknownMessage(tag)) if tag == "OPEN_POPUP"
        );
        assert_matches!(
            ExtensionMessage::from_value(json!({"text": "hello"})),
            Err(RelayError::Malformed(_))
        );
        assert_matches!(
            ExtensionMessage::from_value(json!({"type": "TOGGLE_EXTENSION", "enabled": "yes"})),
            Err(RelayError::Malformed(_))
        );
    }

    #[test]
    fn test_message_type_matches_tag() {
        let msg = ExtensionMessage::ValidateGlmApiKey { api_key: "k".into() };
        assert_eq!(msg.to_value().unwrap()["type"], msg.message_type());
        assert_eq!(msg.to_value().unwrap()["apiKey"], "k");
    }

    #[test]
    fn test_options_wire_shape() {
        let options = SupportedOptions::new([("en", "English")], [("glm", "GLM AI翻译")], [("glm-4", "GLM-4")]);
        let value = serde_json::to_value(MessageResponse::with_options(options)).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "options": {
                    "languages": [{"code": "en", "name": "English"}],
                    "services": [{"code": "glm", "name": "GLM AI翻译"}],
                    "glmModels": [{"code": "glm-4", "name": "GLM-4"}]
                }
            })
        );
        assert_matches!(
            ExtensionMessage::from_value(json!({"type": "DETECT_LANGUAGE", "text": "привет"})),
            Ok(ExtensionMessage::DetectLanguage { ref text }) if text == "привет"
        );
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let value = serde_json::to_value(MessageResponse::failure("Unknown message type")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "Unknown message type"}));
    }
}
