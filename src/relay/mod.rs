/// 跨上下文消息中继
///
/// 后台（发起网络请求的一方）与标签页（持有浮窗的一方）只通过消息通信。
/// 中继只负责投递，不等待回执；目标标签页不可达时记录日志后继续。
pub mod background;
pub mod messages;
pub mod reorder;
pub mod router;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::translation::types::{Fragment, TranslationResult};

pub use background::BackgroundService;
pub use messages::{ExtensionMessage, MessageResponse, MessageSender, TabId};
pub use reorder::ChunkReorderBuffer;
pub use router::{runtime_channel, RuntimeClient, RuntimeConnector, TabPort, TabRouter, TabTransport};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("tab {0} is not reachable")]
    TabUnavailable(TabId),
    #[error("Unknown message type: {0}")]
    UnknownMessage(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("background context is gone")]
    BackgroundGone,
}

pub struct CrossContextRelay {
    transport: Arc<dyn TabTransport>,
}

impl CrossContextRelay {
    pub fn new(transport: Arc<dyn TabTransport>) -> Self {
        Self { transport }
    }

    /// 转发单个片段（每个片段一条消息，不合并）
    pub fn forward(&self, tab_id: TabId, request_id: u64, fragment: &Fragment) {
        self.send_to(
            tab_id,
            ExtensionMessage::TranslationStreamChunk {
                request_id,
                seq: fragment.seq,
                chunk: fragment.text.clone(),
            },
        );
    }

    /// 转发最终结果；调用方保证在最后一个片段之后调用
    pub fn forward_final(&self, tab_id: TabId, request_id: u64, result: &TranslationResult) {
        self.send_to(
            tab_id,
            ExtensionMessage::TranslationStreamComplete {
                request_id,
                translation: result.clone(),
            },
        );
    }

    /// 向所有已连接的标签页广播
    pub fn broadcast(&self, message: &ExtensionMessage) {
        for tab_id in self.transport.tab_ids() {
            self.send_to(tab_id, message.clone());
        }
    }

    /// 投递任意消息；失败只记录日志
    pub fn send_to(&self, tab_id: TabId, message: ExtensionMessage) {
        let message_type = message.message_type();
        let result = message
            .to_value()
            .and_then(|value| self.transport.post(tab_id, value));
        match result {
            Ok(()) => debug!("[Relay] 已发送 {} -> 标签页 {}", message_type, tab_id),
            Err(e) => warn!("[Relay] 发送 {} 失败: {}", message_type, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_each_fragment_separately() {
        let router = TabRouter::new();
        let mut port = router.connect(1);
        let relay = CrossContextRelay::new(router.clone());

        for (seq, text) in ["The", " weather"].iter().enumerate() {
            relay.forward(
                1,
                9,
                &Fragment {
                    seq: seq as u64,
                    text: text.to_string(),
                },
            );
        }

        let first = ExtensionMessage::from_value(port.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(
            first,
            ExtensionMessage::TranslationStreamChunk {
                request_id: 9,
                seq: 0,
                chunk: "The".into()
            }
        );
        let second = port.receiver.recv().await.unwrap();
        assert_eq!(second["seq"], 1);
        assert_eq!(second["chunk"], " weather");
    }

    #[test]
    fn test_unreachable_tab_is_silent() {
        let router = TabRouter::new();
        let relay = CrossContextRelay::new(router.clone());
        // 不 panic，也不返回错误
        relay.forward(42, 1, &Fragment { seq: 0, text: "x".into() });
        relay.broadcast(&ExtensionMessage::GetSettings);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_live_tabs() {
        let router = TabRouter::new();
        let mut a = router.connect(1);
        let b = router.connect(2);
        drop(b);
        let relay = CrossContextRelay::new(router.clone());
        relay.broadcast(&ExtensionMessage::ToggleExtension { enabled: false });

        assert_eq!(a.receiver.recv().await.unwrap()["type"], "TOGGLE_EXTENSION");
        assert_eq!(router.tab_ids(), vec![1]);
    }
}
