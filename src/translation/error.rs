//! 翻译管线统一错误类型

use std::fmt;

use thiserror::Error;

/// 翻译管线错误
///
/// 只有 `Provider` 和 `EmptyResult` 会触发备用翻译；
/// 配置错误与非法请求直接呈现给用户。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// 缺少或无效的凭据
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 上游返回非 2xx，或传输层失败
    #[error("Provider error: {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// 流正常结束但没有任何译文
    #[error("Empty translation result")]
    EmptyResult,

    /// 请求本身不合法（空文本、超长等）
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TranslationError {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::EmptyResult)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            _ => None,
        }
    }

    /// 面向用户的错误消息，不暴露上游原始响应
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) | Self::InvalidRequest(msg) => msg.clone(),
            Self::EmptyResult => "翻译结果为空".to_string(),
            Self::Provider { status, message } => match status {
                Some(401) => "API 密钥无效或已过期，请检查设置".to_string(),
                Some(403) => "API 访问被拒绝，请检查账户权限".to_string(),
                Some(429) => "请求过于频繁，请稍后重试".to_string(),
                Some(500..=599) => "翻译服务暂时不可用，请稍后重试".to_string(),
                Some(_) => "翻译请求失败，请重试".to_string(),
                None => message.clone(),
            },
        }
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(e: reqwest::Error) -> Self {
        TranslationError::Provider {
            status: e.status().map(|s| s.as_u16()),
            message: format!("翻译请求失败: {}", e),
        }
    }
}

/// 单行流数据无法解析。只记录日志，不中断解码。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub line: String,
    pub reason: String,
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed stream line ({}): {}", self.reason, self.line)
    }
}
