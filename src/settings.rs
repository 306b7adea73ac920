//! 扩展设置：默认值、配置加载与运行时更新

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::translation::glm::{DEFAULT_GLM_BASE_URL, DEFAULT_GLM_MODEL};
use crate::translation::google::DEFAULT_GOOGLE_ENDPOINT;
use crate::translation::types::{Provider, MAX_SOURCE_CHARS};

/// 环境变量前缀，例如 `WORD_TRANSLATOR__TARGET_LANGUAGE=zh-CN`
pub const ENV_PREFIX: &str = "WORD_TRANSLATOR";

/// 扩展设置
///
/// 对外（消息、存储）使用 camelCase，配置文件和环境变量使用 snake_case，两种写法都能解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionSettings {
    pub enabled: bool,
    #[serde(alias = "source_language")]
    pub source_language: String,
    #[serde(alias = "target_language")]
    pub target_language: String,
    #[serde(alias = "show_pronunciation")]
    pub show_pronunciation: bool,
    /// 毫秒
    #[serde(alias = "auto_hide_delay")]
    pub auto_hide_delay: u64,
    #[serde(alias = "enable_keyboard_shortcut")]
    pub enable_keyboard_shortcut: bool,
    #[serde(alias = "enable_context_menu")]
    pub enable_context_menu: bool,
    #[serde(alias = "min_selection_length")]
    pub min_selection_length: usize,
    #[serde(alias = "max_selection_length")]
    pub max_selection_length: usize,
    #[serde(alias = "translation_service")]
    pub translation_service: Provider,
    #[serde(alias = "glm_api_key")]
    pub glm_api_key: String,
    #[serde(alias = "glm_model")]
    pub glm_model: String,

    #[serde(alias = "glm_base_url")]
    pub glm_base_url: String,
    #[serde(alias = "google_endpoint")]
    pub google_endpoint: String,
    #[serde(alias = "request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 打字机节拍（毫秒/字符）
    #[serde(alias = "typewriter_interval_ms")]
    pub typewriter_interval_ms: u64,
    /// 完成时等待队列清空的轮询间隔
    #[serde(alias = "finish_poll_ms")]
    pub finish_poll_ms: u64,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            source_language: "auto".to_string(),
            target_language: "en".to_string(),
            show_pronunciation: true,
            auto_hide_delay: 5000,
            enable_keyboard_shortcut: true,
            enable_context_menu: true,
            min_selection_length: 1,
            max_selection_length: MAX_SOURCE_CHARS,
            translation_service: Provider::Google,
            glm_api_key: String::new(),
            glm_model: DEFAULT_GLM_MODEL.to_string(),
            glm_base_url: DEFAULT_GLM_BASE_URL.to_string(),
            google_endpoint: DEFAULT_GOOGLE_ENDPOINT.to_string(),
            request_timeout_secs: 30,
            typewriter_interval_ms: 50,
            finish_poll_ms: 100,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings update must be a JSON object")]
    NotAnObject,
    #[error("invalid settings: {0}")]
    Invalid(String),
    #[error("failed to load settings: {0}")]
    Config(String),
}

impl ExtensionSettings {
    /// 从可选的 TOML 文件与环境变量加载设置，缺失的来源使用默认值
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let loaded = builder
            .build()
            .map_err(|e| SettingsError::Config(format!("读取设置失败: {}", e)))?;
        let mut settings: ExtensionSettings = loaded
            .try_deserialize()
            .map_err(|e| SettingsError::Config(format!("解析设置失败: {}", e)))?;

        // 未配置密钥时读取 GLM_API_KEY
        if settings.glm_api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("GLM_API_KEY") {
                settings.glm_api_key = key;
            }
        }

        settings.validate()?;
        debug!(
            "[Settings] 设置已加载 - 服务: {}, 目标语言: {}",
            settings.translation_service, settings.target_language
        );
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.min_selection_length == 0 {
            return Err(SettingsError::Invalid(
                "minSelectionLength must be at least 1".to_string(),
            ));
        }
        if self.min_selection_length > self.max_selection_length {
            return Err(SettingsError::Invalid(format!(
                "minSelectionLength ({}) exceeds maxSelectionLength ({})",
                self.min_selection_length, self.max_selection_length
            )));
        }
        if self.max_selection_length > MAX_SOURCE_CHARS {
            return Err(SettingsError::Invalid(format!(
                "maxSelectionLength cannot exceed {}",
                MAX_SOURCE_CHARS
            )));
        }
        if self.target_language.trim().is_empty() || self.target_language == "auto" {
            return Err(SettingsError::Invalid(
                "targetLanguage must be a concrete language".to_string(),
            ));
        }
        if self.typewriter_interval_ms == 0 || self.finish_poll_ms == 0 {
            return Err(SettingsError::Invalid(
                "timer intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// snake_case 键转换为 camelCase，避免与已有字段重复
fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// 运行时设置存储（后台上下文独占）
#[derive(Debug, Default)]
pub struct SettingsManager {
    settings: RwLock<ExtensionSettings>,
}

impl SettingsManager {
    pub fn new(settings: ExtensionSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub async fn get_settings(&self) -> ExtensionSettings {
        self.settings.read().await.clone()
    }

    /// 浅合并部分设置；合并结果非法时保持原设置不变
    pub async fn update_settings(&self, partial: &Value) -> Result<ExtensionSettings, SettingsError> {
        let Some(updates) = partial.as_object() else {
            return Err(SettingsError::NotAnObject);
        };

        let mut guard = self.settings.write().await;
        let mut merged = serde_json::to_value(&*guard)
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        if let Some(target) = merged.as_object_mut() {
            for (key, value) in updates {
                target.insert(to_camel_case(key), value.clone());
            }
        }

        let next: ExtensionSettings =
            serde_json::from_value(merged).map_err(|e| SettingsError::Invalid(e.to_string()))?;
        next.validate()?;

        info!(
            "[Settings] 设置已更新: {}",
            updates.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        );
        *guard = next.clone();
        Ok(next)
    }

    pub async fn reset_settings(&self) -> ExtensionSettings {
        let defaults = ExtensionSettings::default();
        *self.settings.write().await = defaults.clone();
        info!("[Settings] 设置已重置为默认值");
        defaults
    }

    pub async fn set_enabled(&self, enabled: bool) -> ExtensionSettings {
        let mut guard = self.settings.write().await;
        guard.enabled = enabled;
        guard.clone()
    }
}
