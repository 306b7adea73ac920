//! 翻译服务编排：按服务分发，失败时回退到备用翻译（仅一次）

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::settings::ExtensionSettings;
use crate::utils::http::create_http_client_with_fallback;

use super::backup::BackupTranslator;
use super::error::TranslationError;
use super::glm::{GlmConfig, GlmTranslationService};
use super::google::GoogleTranslator;
use super::types::{FragmentSink, Provider, TranslationRequest, TranslationResult};
use super::Translator;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TranslationService {
    client: Client,
    glm_config: RwLock<GlmConfig>,
    google: Arc<dyn Translator>,
    backup: Arc<dyn Translator>,
}

impl TranslationService {
    pub fn from_settings(settings: &ExtensionSettings) -> Self {
        let request_timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = create_http_client_with_fallback(request_timeout.min(CONNECT_TIMEOUT));
        let google = Arc::new(
            GoogleTranslator::new(client.clone(), settings.google_endpoint.clone())
                .with_timeout(request_timeout),
        );
        let glm_config = GlmConfig {
            base_url: settings.glm_base_url.clone(),
            api_key: settings.glm_api_key.clone(),
            model: settings.glm_model.clone(),
            request_timeout,
        };
        Self::with_translators(client, glm_config, google, Arc::new(BackupTranslator))
    }

    pub fn with_translators(
        client: Client,
        glm_config: GlmConfig,
        google: Arc<dyn Translator>,
        backup: Arc<dyn Translator>,
    ) -> Self {
        Self {
            client,
            glm_config: RwLock::new(glm_config),
            google,
            backup,
        }
    }

    /// 更新GLM配置
    pub async fn update_glm_config(&self, api_key: &str, model: &str) {
        info!(
            "[TranslationService] 更新GLM配置 - 模型: {}, API密钥: {}",
            model,
            if api_key.trim().is_empty() { "未设置" } else { "已设置" }
        );
        let mut config = self.glm_config.write().await;
        config.api_key = api_key.to_string();
        config.model = model.to_string();
    }

    async fn glm_service(&self) -> GlmTranslationService {
        let config = self.glm_config.read().await.clone();
        GlmTranslationService::new(self.client.clone(), config)
    }

    /// 流式翻译：GLM 服务会把片段推给 `sink`，其它服务忽略 `sink`
    pub async fn translate_stream(
        &self,
        request: TranslationRequest,
        sink: Option<FragmentSink>,
    ) -> Result<TranslationResult, TranslationError> {
        let provider = request.provider();
        info!(
            "[TranslationService] 开始翻译 - 服务: {}, 文本长度: {}",
            provider,
            request.text().chars().count()
        );

        let attempt = match provider {
            Provider::Glm => {
                self.glm_service()
                    .await
                    .translate_stream(&request, sink.as_ref())
                    .await
            }
            Provider::Google => self.google.translate(&request).await,
            Provider::Backup => self.backup.translate(&request).await,
        };
        // 片段通道在这里关闭，接收方据此得知流已结束
        drop(sink);

        self.with_fallback(&request, attempt).await
    }

    /// 非流式翻译：一次请求/响应
    pub async fn translate(
        &self,
        request: TranslationRequest,
    ) -> Result<TranslationResult, TranslationError> {
        let attempt = match request.provider() {
            Provider::Glm => self.glm_service().await.translate(&request).await,
            Provider::Google => self.google.translate(&request).await,
            Provider::Backup => self.backup.translate(&request).await,
        };
        self.with_fallback(&request, attempt).await
    }

    async fn with_fallback(
        &self,
        request: &TranslationRequest,
        attempt: Result<TranslationResult, TranslationError>,
    ) -> Result<TranslationResult, TranslationError> {
        let provider = request.provider();
        match attempt {
            Ok(result) => Ok(result),
            Err(e) if provider != Provider::Backup && e.is_fallback_eligible() => {
                warn!(
                    "[TranslationService] {}翻译失败，尝试备用方案: {}",
                    provider, e
                );
                // 备用翻译本身失败时直接返回，不再继续回退
                self.backup
                    .translate(&request.with_provider(Provider::Backup))
                    .await
            }
            Err(e) => {
                error!("[TranslationService] {}翻译失败: {}", provider, e);
                Err(e)
            }
        }
    }

    /// 验证GLM API密钥（使用临时配置，不影响当前配置）
    pub async fn validate_glm_api_key(&self, api_key: &str) -> bool {
        let mut service = self.glm_service().await;
        service.update_api_key(api_key);
        service.validate_api_key().await
    }

    pub fn supported_services() -> [(Provider, &'static str); 3] {
        [Provider::Google, Provider::Glm, Provider::Backup].map(|p| (p, p.display_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::backup::BACKUP_PREFIX;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mockito::Server;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录调用次数并返回固定错误的翻译器
    struct FailingTranslator {
        calls: AtomicUsize,
        error: TranslationError,
    }

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(
            &self,
            _request: &TranslationRequest,
        ) -> Result<TranslationResult, TranslationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    fn glm_config(base_url: String, api_key: &str) -> GlmConfig {
        GlmConfig {
            base_url,
            api_key: api_key.to_string(),
            ..GlmConfig::default()
        }
    }

    fn glm_request() -> TranslationRequest {
        TranslationRequest::new("今天天气真好。", "auto", "en", Provider::Glm).unwrap()
    }

    #[tokio::test]
    async fn test_http_401_falls_back_to_backup() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .create_async()
            .await;

        let service = TranslationService::with_translators(
            Client::new(),
            glm_config(server.url(), "expired"),
            Arc::new(BackupTranslator),
            Arc::new(BackupTranslator),
        );
        let result = service.translate_stream(glm_request(), None).await.unwrap();
        assert_eq!(
            result.translated_text,
            format!("{}今天天气真好。", BACKUP_PREFIX)
        );
    }

    #[tokio::test]
    async fn test_whitespace_stream_falls_back() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"  \"}}]}\n\ndata: [DONE]\n\n")
            .create_async()
            .await;

        let service = TranslationService::with_translators(
            Client::new(),
            glm_config(server.url(), "k"),
            Arc::new(BackupTranslator),
            Arc::new(BackupTranslator),
        );
        let result = service.translate_stream(glm_request(), None).await.unwrap();
        assert!(result.translated_text.starts_with(BACKUP_PREFIX));
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_retried() {
        let backup = Arc::new(FailingTranslator {
            calls: AtomicUsize::new(0),
            error: TranslationError::provider(None, "unused"),
        });
        let service = TranslationService::with_translators(
            Client::new(),
            glm_config("http://127.0.0.1:9".to_string(), ""),
            Arc::new(BackupTranslator),
            backup.clone(),
        );
        assert_matches!(
            service.translate_stream(glm_request(), None).await,
            Err(TranslationError::Configuration(_))
        );
        assert_eq!(backup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_happens_exactly_once() {
        let google = Arc::new(FailingTranslator {
            calls: AtomicUsize::new(0),
            error: TranslationError::provider(Some(500), "boom"),
        });
        let backup = Arc::new(FailingTranslator {
            calls: AtomicUsize::new(0),
            error: TranslationError::EmptyResult,
        });
        let service = TranslationService::with_translators(
            Client::new(),
            GlmConfig::default(),
            google.clone(),
            backup.clone(),
        );
        let request = TranslationRequest::new("hello", "auto", "zh-CN", Provider::Google).unwrap();
        assert_matches!(
            service.translate(request).await,
            Err(TranslationError::EmptyResult)
        );
        assert_eq!(google.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backup_failure_is_not_retried() {
        let backup = Arc::new(FailingTranslator {
            calls: AtomicUsize::new(0),
            error: TranslationError::provider(None, "offline"),
        });
        let service = TranslationService::with_translators(
            Client::new(),
            GlmConfig::default(),
            Arc::new(BackupTranslator),
            backup.clone(),
        );
        let request = TranslationRequest::new("hello", "auto", "zh-CN", Provider::Backup).unwrap();
        assert!(service.translate(request).await.is_err());
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_glm_config_is_used() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n")
            .create_async()
            .await;

        let service = TranslationService::with_translators(
            Client::new(),
            glm_config(server.url(), ""),
            Arc::new(BackupTranslator),
            Arc::new(BackupTranslator),
        );
        service.update_glm_config("fresh", "glm-4-flash").await;
        let result = service.translate_stream(glm_request(), None).await.unwrap();
        assert_eq!(result.translated_text, "ok");
        mock.assert_async().await;
    }

    #[test]
    fn test_supported_services_lists_every_provider() {
        let names: Vec<&str> = TranslationService::supported_services()
            .iter()
            .map(|(_, name)| *name)
            .collect();
        assert_eq!(names.len(), 3);
        assert_eq!(TranslationService::supported_services()[1].0, Provider::Glm);
    }
}
