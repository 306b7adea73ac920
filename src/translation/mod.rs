/// 翻译模块 - 流式翻译管线
///
/// 职责：
/// - 把流式 HTTP 响应解码成有序的译文片段（`decoder`）
/// - 驱动各翻译服务并累加完整译文（`glm` / `google` / `backup`）
/// - 失败时回退到备用翻译，最多一次（`service`）
pub mod backup;
pub mod decoder;
pub mod error;
pub mod glm;
pub mod google;
pub mod language;
pub mod prompt;
pub mod service;
pub mod types;

use async_trait::async_trait;

pub use error::{DecodeWarning, TranslationError};
pub use service::TranslationService;
pub use types::{Fragment, FragmentSink, Provider, TranslationRequest, TranslationResult};

/// 非流式翻译接口：一次请求，一个结果
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResult, TranslationError>;
}
