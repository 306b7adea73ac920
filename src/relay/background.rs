//! 后台上下文（service worker）：处理所有请求消息，驱动翻译并中继流式片段

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::panel::geometry::Point;
use crate::settings::{ExtensionSettings, SettingsManager};
use crate::translation::glm::GlmTranslationService;
use crate::translation::language::{detect_language, SUPPORTED_LANGUAGES};
use crate::translation::types::{FragmentSink, Provider, TranslationRequest};
use crate::translation::TranslationService;

use super::messages::{
    ExtensionMessage, MessageResponse, MessageSender, SupportedOptions, TabId,
};
use super::router::RuntimeRequest;
use super::{CrossContextRelay, RelayError};

pub struct BackgroundService {
    translator: Arc<TranslationService>,
    settings: Arc<SettingsManager>,
    relay: Arc<CrossContextRelay>,
}

impl BackgroundService {
    pub fn new(
        translator: Arc<TranslationService>,
        settings: Arc<SettingsManager>,
        relay: Arc<CrossContextRelay>,
    ) -> Self {
        Self {
            translator,
            settings,
            relay,
        }
    }

    /// 启动请求处理循环；每个请求在独立任务中处理，互不阻塞
    pub fn serve(
        self: Arc<Self>,
        mut requests: mpsc::UnboundedReceiver<RuntimeRequest>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("[ServiceWorker] 后台服务已启动");
            while let Some(request) = requests.recv().await {
                let this = self.clone();
                tokio::spawn(async move {
                    let response = this
                        .handle_raw(request.sender, request.message.clone())
                        .await;
                    request.respond(response);
                });
            }
            info!("[ServiceWorker] 请求通道已关闭，后台服务退出");
        })
    }

    /// 处理原始 JSON 消息
    pub async fn handle_raw(&self, sender: MessageSender, message: Value) -> MessageResponse {
        match ExtensionMessage::from_value(message) {
            Ok(message) => self.handle_message(sender, message).await,
            Err(RelayError::UnknownMessage(tag)) => {
                warn!("[ServiceWorker] 未知消息类型: {}", tag);
                MessageResponse::failure("Unknown message type")
            }
            Err(e) => {
                warn!("[ServiceWorker] 消息格式错误: {}", e);
                MessageResponse::failure(e.to_string())
            }
        }
    }

    pub async fn handle_message(
        &self,
        sender: MessageSender,
        message: ExtensionMessage,
    ) -> MessageResponse {
        debug!("[ServiceWorker] 收到消息: {}", message.message_type());
        match message {
            ExtensionMessage::TranslateText {
                text,
                source,
                target,
                service,
                stream,
                request_id,
            } => {
                self.translate_text(sender, text, source, target, service, stream, request_id)
                    .await
            }
            ExtensionMessage::ValidateGlmApiKey { api_key } => {
                let valid = self.translator.validate_glm_api_key(&api_key).await;
                info!("[ServiceWorker] GLM API密钥验证结果: {}", valid);
                MessageResponse::validity(valid)
            }
            ExtensionMessage::GetSettings => {
                MessageResponse::with_settings(self.settings.get_settings().await)
            }
            ExtensionMessage::UpdateSettings { settings } => {
                match self.settings.update_settings(&settings).await {
                    Ok(updated) => {
                        self.apply_settings_change(&updated).await;
                        MessageResponse::with_settings(updated)
                    }
                    Err(e) => {
                        warn!("[ServiceWorker] 设置更新失败: {}", e);
                        MessageResponse::failure(e.to_string())
                    }
                }
            }
            ExtensionMessage::ResetSettings => {
                let defaults = self.settings.reset_settings().await;
                self.apply_settings_change(&defaults).await;
                MessageResponse::with_settings(defaults)
            }
            ExtensionMessage::ToggleExtension { enabled } => {
                let updated = self.settings.set_enabled(enabled).await;
                info!("[ServiceWorker] 扩展已{}", if enabled { "启用" } else { "禁用" });
                self.relay
                    .broadcast(&ExtensionMessage::ToggleExtension { enabled });
                MessageResponse::with_settings(updated)
            }
            ExtensionMessage::GetSupportedOptions => {
                MessageResponse::with_options(supported_options())
            }
            ExtensionMessage::DetectLanguage { text } => {
                MessageResponse::detected(detect_language(&text))
            }
            other => {
                // 仅由后台发往标签页的消息，不应出现在后台
                warn!(
                    "[ServiceWorker] 后台不处理此消息: {}",
                    other.message_type()
                );
                MessageResponse::failure("Unknown message type")
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn translate_text(
        &self,
        sender: MessageSender,
        text: String,
        source: Option<String>,
        target: Option<String>,
        service: Option<Provider>,
        stream: bool,
        request_id: u64,
    ) -> MessageResponse {
        let settings = self.settings.get_settings().await;
        let provider = service.unwrap_or(settings.translation_service);
        let request = match TranslationRequest::new(
            text,
            source.unwrap_or(settings.source_language),
            target.unwrap_or(settings.target_language),
            provider,
        ) {
            Ok(request) => request,
            Err(e) => return MessageResponse::failure(e.user_message()),
        };

        // 只有来自标签页的 AI 翻译请求才走流式中继
        let stream_tab = match sender.tab_id {
            Some(tab_id) if stream && provider.supports_streaming() => Some(tab_id),
            _ => None,
        };

        let Some(tab_id) = stream_tab else {
            return match self.translator.translate(request).await {
                Ok(result) => MessageResponse::translated(result, false),
                Err(e) => {
                    error!("[ServiceWorker] 翻译失败: {}", e);
                    MessageResponse::failure(e.user_message())
                }
            };
        };

        let (sink, mut fragments) = FragmentSink::channel();
        let relay = self.relay.clone();
        let pump = tokio::spawn(async move {
            while let Some(fragment) = fragments.recv().await {
                relay.forward(tab_id, request_id, &fragment);
            }
        });

        let outcome = self.translator.translate_stream(request, Some(sink)).await;
        // sink 已在 translate_stream 结束时释放，等待剩余片段发完
        if let Err(e) = pump.await {
            error!("[ServiceWorker] 片段转发任务异常: {}", e);
        }

        match outcome {
            Ok(result) => {
                self.relay.forward_final(tab_id, request_id, &result);
                MessageResponse::translated(result, true)
            }
            Err(e) => {
                error!("[ServiceWorker] 流式翻译失败: {}", e);
                MessageResponse::failure(e.user_message())
            }
        }
    }

    async fn apply_settings_change(&self, settings: &ExtensionSettings) {
        self.translator
            .update_glm_config(&settings.glm_api_key, &settings.glm_model)
            .await;
        self.relay.broadcast(&ExtensionMessage::SettingsUpdated {
            settings: settings.clone(),
        });
    }

    /// 右键菜单/快捷键：让指定标签页翻译选中文本
    pub fn request_tab_translation(&self, tab_id: TabId, text: &str, anchor: Option<Point>) {
        self.relay.send_to(
            tab_id,
            ExtensionMessage::TranslateSelection {
                text: text.to_string(),
                anchor,
            },
        );
    }
}

/// 弹窗下拉框使用的选项
fn supported_options() -> SupportedOptions {
    SupportedOptions::new(
        SUPPORTED_LANGUAGES.iter().copied(),
        TranslationService::supported_services()
            .iter()
            .map(|(provider, name)| (provider.code(), *name)),
        GlmTranslationService::supported_models().iter().copied(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::router::TabRouter;
    use crate::translation::backup::BackupTranslator;
    use crate::translation::glm::GlmConfig;
    use mockito::Server;
    use serde_json::json;

    fn service_with(glm_base: String, router: Arc<TabRouter>) -> BackgroundService {
        let translator = TranslationService::with_translators(
            reqwest::Client::new(),
            GlmConfig {
                base_url: glm_base,
                api_key: "test-key".into(),
                ..GlmConfig::default()
            },
            Arc::new(BackupTranslator),
            Arc::new(BackupTranslator),
        );
        BackgroundService::new(
            Arc::new(translator),
            Arc::new(SettingsManager::default()),
            Arc::new(CrossContextRelay::new(router)),
        )
    }

    #[tokio::test]
    async fn test_unknown_message_type() {
        let router = TabRouter::new();
        let bg = service_with("http://127.0.0.1:9".into(), router);
        let response = bg
            .handle_raw(MessageSender::default(), json!({"type": "OPEN_POPUP"}))
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Unknown message type"));
    }

    #[tokio::test]
    async fn test_stream_chunks_precede_completion() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n\
                 data: [DONE]\n\n",
            )
            .create_async()
            .await;

        let router = TabRouter::new();
        let mut port = router.connect(3);
        let bg = service_with(server.url(), router.clone());

        let response = bg
            .handle_message(
                MessageSender::tab(3),
                ExtensionMessage::TranslateText {
                    text: "你好世界".into(),
                    source: None,
                    target: Some("en".into()),
                    service: Some(Provider::Glm),
                    stream: true,
                    request_id: 11,
                },
            )
            .await;
        assert!(response.success);
        assert_eq!(response.is_stream, Some(true));
        assert_eq!(response.translation.unwrap().translated_text, "Hello world");

        let mut types = Vec::new();
        while let Ok(value) = port.receiver.try_recv() {
            assert_eq!(value["requestId"], 11);
            types.push(value["type"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(
            types,
            vec![
                "TRANSLATION_STREAM_CHUNK",
                "TRANSLATION_STREAM_CHUNK",
                "TRANSLATION_STREAM_COMPLETE"
            ]
        );
    }

    #[tokio::test]
    async fn test_closed_tab_does_not_fail_translation() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n")
            .create_async()
            .await;

        let router = TabRouter::new();
        drop(router.connect(5));
        let bg = service_with(server.url(), router);
        let response = bg
            .handle_raw(
                MessageSender::tab(5),
                json!({"type": "TRANSLATE_TEXT", "text": "你好", "target": "en", "service": "glm", "stream": true}),
            )
            .await;
        assert!(response.success);
        assert_eq!(response.translation.unwrap().translated_text, "ok");
    }

    #[tokio::test]
    async fn test_update_settings_broadcasts() {
        let router = TabRouter::new();
        let mut port = router.connect(1);
        let bg = service_with("http://127.0.0.1:9".into(), router);

        let response = bg
            .handle_raw(
                MessageSender::default(),
                json!({"type": "UPDATE_SETTINGS", "settings": {"targetLanguage": "ja"}}),
            )
            .await;
        assert!(response.success);
        assert_eq!(response.settings.unwrap().target_language, "ja");

        let pushed = ExtensionMessage::from_value(port.receiver.recv().await.unwrap()).unwrap();
        assert!(matches!(
            pushed,
            ExtensionMessage::SettingsUpdated { ref settings } if settings.target_language == "ja"
        ));
    }

    #[tokio::test]
    async fn test_popup_queries_options_and_language() {
        let router = TabRouter::new();
        let bg = service_with("http://127.0.0.1:9".into(), router);

        let response = bg
            .handle_raw(MessageSender::default(), json!({"type": "GET_SUPPORTED_OPTIONS"}))
            .await;
        let options = response.options.unwrap();
        assert_eq!(options.languages.len(), 15);
        assert_eq!(options.languages[0].code, "auto");
        let services: Vec<&str> = options.services.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(services, vec!["google", "glm", "backup"]);
        assert_eq!(options.glm_models[0].code, "glm-4.6");

        for (text, expected) in [("今天天气", "zh-CN"), ("привет", "ru"), ("こんにちは", "ja"), ("hello", "en")] {
            let response = bg
                .handle_raw(
                    MessageSender::default(),
                    json!({"type": "DETECT_LANGUAGE", "text": text}),
                )
                .await;
            assert_eq!(response.language.as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_invalid_request_is_reported() {
        let router = TabRouter::new();
        let bg = service_with("http://127.0.0.1:9".into(), router);
        let response = bg
            .handle_raw(
                MessageSender::default(),
                json!({"type": "TRANSLATE_TEXT", "text": "   ", "service": "backup"}),
            )
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("翻译文本不能为空"));
    }

    #[tokio::test]
    async fn test_serve_loop_replies() {
        let router = TabRouter::new();
        let bg = Arc::new(service_with("http://127.0.0.1:9".into(), router));
        let (connector, requests) = crate::relay::runtime_channel();
        let handle = bg.serve(requests);

        let client = connector.client(None);
        let response = client
            .send_message(&ExtensionMessage::TranslateText {
                text: "good morning".into(),
                source: None,
                target: Some("zh-CN".into()),
                service: Some(Provider::Backup),
                stream: false,
                request_id: 0,
            })
            .await
            .unwrap();
        assert_eq!(
            response.translation.unwrap().translated_text,
            "[备用翻译] good morning"
        );

        drop(client);
        drop(connector);
        handle.await.unwrap();
    }
}
