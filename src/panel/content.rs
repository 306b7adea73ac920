//! 内容脚本（标签页上下文）：接收后台消息，管理请求代际，驱动打字机渲染

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::relay::messages::{ExtensionMessage, MessageResponse, TabId};
use crate::relay::reorder::ChunkReorderBuffer;
use crate::relay::router::{RuntimeClient, TabPort};
use crate::relay::RelayError;
use crate::settings::ExtensionSettings;
use crate::translation::language::has_letter;
use crate::translation::types::TranslationResult;

use super::geometry::Point;
use super::typewriter::TypewriterHandle;

/// 默认失败提示
pub const DEFAULT_ERROR_MESSAGE: &str = "翻译失败";
/// 无法联系后台时的提示
pub const NETWORK_ERROR_MESSAGE: &str = "网络错误，请重试";

const MAX_SELECTION_LINES: usize = 3;

/// 一次划词翻译的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Disabled,
    InvalidSelection,
    /// 非流式结果，已直接渲染
    Translated(TranslationResult),
    /// 流式结果，浮窗在收到完成消息并播放完队列后显示最终文本
    Streaming(TranslationResult),
    Failed(String),
    /// 等待期间被新请求或隐藏操作取代，结果已丢弃
    Superseded,
}

/// 选中文本是否值得翻译
pub fn is_valid_selection(text: &str, settings: &ExtensionSettings) -> bool {
    let length = text.chars().count();
    if length < settings.min_selection_length || length > settings.max_selection_length {
        return false;
    }
    // 过滤纯数字、纯符号
    if !has_letter(text) {
        return false;
    }
    text.split('\n').count() <= MAX_SELECTION_LINES
}

pub struct ContentScript {
    tab_id: TabId,
    runtime: RuntimeClient,
    renderer: TypewriterHandle,
    /// 请求代际：每次新请求或隐藏时递增，旧代际的回调全部作废
    generation: AtomicU64,
    enabled: AtomicBool,
    settings: RwLock<ExtensionSettings>,
    reorder: Mutex<ChunkReorderBuffer>,
}

impl ContentScript {
    pub fn new(
        tab_id: TabId,
        runtime: RuntimeClient,
        renderer: TypewriterHandle,
        settings: ExtensionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            tab_id,
            runtime,
            renderer,
            generation: AtomicU64::new(0),
            enabled: AtomicBool::new(settings.enabled),
            settings: RwLock::new(settings),
            reorder: Mutex::new(ChunkReorderBuffer::new()),
        })
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// 启动时从后台读取设置
    pub async fn load_settings(&self) {
        match self.runtime.send_message(&ExtensionMessage::GetSettings).await {
            Ok(MessageResponse {
                settings: Some(settings),
                ..
            }) => self.apply_settings(settings).await,
            Ok(_) => warn!("[Content] 后台未返回设置"),
            Err(e) => error!("[Content] 加载设置失败: {}", e),
        }
    }

    async fn apply_settings(&self, settings: ExtensionSettings) {
        self.enabled.store(settings.enabled, Ordering::SeqCst);
        let disabled = !settings.enabled;
        *self.settings.write().await = settings;
        if disabled {
            self.hide();
        }
    }

    /// 关闭浮窗（ESC/关闭按钮）；同时作废进行中的请求
    pub fn hide(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.renderer.hide(generation);
    }

    /// 监听后台发来的消息
    pub fn spawn_listener(self: &Arc<Self>, mut port: TabPort) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(raw) = port.receiver.recv().await {
                match ExtensionMessage::from_value(raw) {
                    Ok(message) => this.handle_message(message).await,
                    Err(RelayError::UnknownMessage(tag)) => {
                        warn!("[Content] 未知消息类型: {}", tag)
                    }
                    Err(e) => warn!("[Content] 无法解析消息: {}", e),
                }
            }
            debug!("[Content] 标签页 {} 的消息端口已关闭", port.tab_id);
        })
    }

    pub async fn handle_message(self: &Arc<Self>, message: ExtensionMessage) {
        match message {
            ExtensionMessage::TranslationStreamChunk {
                request_id,
                seq,
                chunk,
            } => {
                if !self.is_current(request_id) || !self.is_enabled() {
                    debug!("[Content] 丢弃过期片段 request={}", request_id);
                    return;
                }
                let ready = self.reorder.lock().await.accept(request_id, seq, chunk);
                for text in ready {
                    self.renderer.enqueue(request_id, text);
                }
            }
            ExtensionMessage::TranslationStreamComplete {
                request_id,
                translation,
            } => {
                if !self.is_current(request_id) {
                    debug!("[Content] 丢弃过期完成消息 request={}", request_id);
                    return;
                }
                let rest = self.reorder.lock().await.drain();
                for text in rest {
                    self.renderer.enqueue(request_id, text);
                }
                let show_pronunciation = self.settings.read().await.show_pronunciation;
                info!("[Content] 流式翻译完成");
                self.renderer.finish(request_id, translation, show_pronunciation);
            }
            ExtensionMessage::ToggleExtension { enabled } => {
                self.enabled.store(enabled, Ordering::SeqCst);
                self.settings.write().await.enabled = enabled;
                if !enabled {
                    self.hide();
                }
            }
            ExtensionMessage::TranslateSelection { text, anchor } => {
                if !self.is_enabled() {
                    return;
                }
                let this = self.clone();
                tokio::spawn(async move {
                    this.translate_selection(&text, anchor.unwrap_or_default())
                        .await;
                });
            }
            ExtensionMessage::SettingsUpdated { settings } => self.apply_settings(settings).await,
            other => debug!("[Content] 忽略消息: {}", other.message_type()),
        }
    }

    /// 翻译选中文本并显示在浮窗中
    pub async fn translate_selection(&self, text: &str, anchor: Point) -> SelectionOutcome {
        if !self.is_enabled() {
            return SelectionOutcome::Disabled;
        }
        let text = text.trim();
        let cached = self.settings.read().await.clone();
        if !is_valid_selection(text, &cached) {
            debug!("[Content] 选中文本无效: {}", text);
            return SelectionOutcome::InvalidSelection;
        }

        // 新请求：作废旧请求，重置浮窗
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.reorder.lock().await.reset(generation);
        self.renderer.show(generation, anchor);

        let settings = match self.runtime.send_message(&ExtensionMessage::GetSettings).await {
            Ok(MessageResponse {
                settings: Some(settings),
                ..
            }) => {
                *self.settings.write().await = settings.clone();
                settings
            }
            Ok(_) | Err(_) => {
                warn!("[Content] 获取设置失败，使用缓存设置");
                cached
            }
        };
        if !self.is_current(generation) {
            return SelectionOutcome::Superseded;
        }

        let streaming = settings.translation_service.supports_streaming();
        self.renderer.set_loading(generation, streaming);

        let request = ExtensionMessage::TranslateText {
            text: text.to_string(),
            source: Some(settings.source_language.clone()),
            target: Some(settings.target_language.clone()),
            service: Some(settings.translation_service),
            stream: streaming,
            request_id: generation,
        };
        debug!(
            "[Content] 发送翻译请求 - 服务: {}, 流式: {}",
            settings.translation_service, streaming
        );
        let response = self.runtime.send_message(&request).await;

        if !self.is_current(generation) {
            debug!("[Content] 请求 {} 已被取代，丢弃结果", generation);
            return SelectionOutcome::Superseded;
        }

        match response {
            Ok(MessageResponse {
                success: true,
                translation: Some(translation),
                is_stream,
                ..
            }) => {
                if is_stream == Some(true) {
                    SelectionOutcome::Streaming(translation)
                } else {
                    self.renderer.set_immediate_result(
                        generation,
                        translation.clone(),
                        settings.show_pronunciation,
                    );
                    SelectionOutcome::Translated(translation)
                }
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
                error!("[Content] 翻译失败: {}", message);
                self.renderer.set_error(generation, message.clone());
                SelectionOutcome::Failed(message)
            }
            Err(e) => {
                error!("[Content] 翻译请求异常: {}", e);
                self.renderer.set_error(generation, NETWORK_ERROR_MESSAGE);
                SelectionOutcome::Failed(NETWORK_ERROR_MESSAGE.to_string())
            }
        }
    }
}
