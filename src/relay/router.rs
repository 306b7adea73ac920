//! 上下文之间的传输通道
//!
//! - 后台 → 标签页：`TabRouter`，按 tab_id 投递，无回执
//! - 标签页 → 后台：`RuntimeClient`，每个请求恰好一个回复

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::{ExtensionMessage, MessageResponse, MessageSender, TabId};
use super::RelayError;

/// 后台向标签页投递消息的传输层
pub trait TabTransport: Send + Sync {
    /// 投递一条消息；目标不存在时返回 `TabUnavailable`
    fn post(&self, tab_id: TabId, message: Value) -> Result<(), RelayError>;

    /// 当前可达的标签页
    fn tab_ids(&self) -> Vec<TabId>;
}

/// 标签页一侧的接收端口
pub struct TabPort {
    pub tab_id: TabId,
    pub receiver: mpsc::UnboundedReceiver<Value>,
}

/// 标签页注册表
#[derive(Default)]
pub struct TabRouter {
    tabs: DashMap<TabId, mpsc::UnboundedSender<Value>>,
}

impl TabRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 注册标签页（同一 tab_id 重新连接会替换旧端口，对应页面刷新）
    pub fn connect(&self, tab_id: TabId) -> TabPort {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.tabs.insert(tab_id, tx).is_some() {
            info!("[TabRouter] 标签页 {} 重新连接", tab_id);
        } else {
            debug!("[TabRouter] 标签页 {} 已连接", tab_id);
        }
        TabPort {
            tab_id,
            receiver: rx,
        }
    }

    pub fn disconnect(&self, tab_id: TabId) {
        if self.tabs.remove(&tab_id).is_some() {
            debug!("[TabRouter] 标签页 {} 已断开", tab_id);
        }
    }
}

impl TabTransport for TabRouter {
    fn post(&self, tab_id: TabId, message: Value) -> Result<(), RelayError> {
        let closed = match self.tabs.get(&tab_id) {
            Some(tx) => tx.send(message).is_err(),
            None => return Err(RelayError::TabUnavailable(tab_id)),
        };
        if closed {
            // 接收端已被丢弃（页面关闭/跳转），清理注册项
            self.tabs.remove(&tab_id);
            return Err(RelayError::TabUnavailable(tab_id));
        }
        Ok(())
    }

    fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}

// ============================================================
// 标签页 → 后台
// ============================================================

/// 发往后台的一次请求
pub struct RuntimeRequest {
    pub sender: MessageSender,
    pub message: Value,
    reply: oneshot::Sender<MessageResponse>,
}

impl RuntimeRequest {
    /// 回复请求方；请求方已不在时忽略
    pub fn respond(self, response: MessageResponse) {
        if self.reply.send(response).is_err() {
            debug!("[Runtime] 请求方已关闭，丢弃回复");
        }
    }
}

/// 后台请求通道的发送端工厂
#[derive(Clone)]
pub struct RuntimeConnector {
    tx: mpsc::UnboundedSender<RuntimeRequest>,
}

impl RuntimeConnector {
    /// 为指定上下文创建客户端；`tab_id` 为 None 表示弹窗等非标签页上下文
    pub fn client(&self, tab_id: Option<TabId>) -> RuntimeClient {
        RuntimeClient {
            tx: self.tx.clone(),
            sender: MessageSender { tab_id },
        }
    }
}

/// 创建后台请求通道
pub fn runtime_channel() -> (RuntimeConnector, mpsc::UnboundedReceiver<RuntimeRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RuntimeConnector { tx }, rx)
}

#[derive(Clone)]
pub struct RuntimeClient {
    tx: mpsc::UnboundedSender<RuntimeRequest>,
    sender: MessageSender,
}

impl RuntimeClient {
    pub fn sender(&self) -> MessageSender {
        self.sender
    }

    /// 发送消息并等待唯一的回复
    pub async fn send_message(
        &self,
        message: &ExtensionMessage,
    ) -> Result<MessageResponse, RelayError> {
        self.send_raw(message.to_value()?).await
    }

    pub async fn send_raw(&self, message: Value) -> Result<MessageResponse, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RuntimeRequest {
                sender: self.sender,
                message,
                reply,
            })
            .map_err(|_| RelayError::BackgroundGone)?;
        rx.await.map_err(|_| RelayError::BackgroundGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn test_post_preserves_order() {
        let router = TabRouter::new();
        let mut port = router.connect(7);
        for i in 0..5 {
            router.post(7, json!({ "n": i })).unwrap();
        }
        for i in 0..5 {
            assert_eq!(port.receiver.recv().await.unwrap()["n"], i);
        }
    }

    #[test]
    fn test_missing_and_closed_tabs() {
        let router = TabRouter::new();
        assert_matches!(router.post(1, json!({})), Err(RelayError::TabUnavailable(1)));

        let port = router.connect(2);
        drop(port);
        assert_matches!(router.post(2, json!({})), Err(RelayError::TabUnavailable(2)));
        assert!(router.tab_ids().is_empty());
    }

    #[test]
    fn test_tab_ids_sorted() {
        let router = TabRouter::new();
        let _a = router.connect(9);
        let _b = router.connect(3);
        assert_eq!(router.tab_ids(), vec![3, 9]);
        router.disconnect(9);
        assert_eq!(router.tab_ids(), vec![3]);
    }

    #[tokio::test]
    async fn test_runtime_round_trip() {
        let (connector, mut requests) = runtime_channel();
        let client = connector.client(Some(4));

        let server = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            assert_eq!(request.sender.tab_id, Some(4));
            assert_eq!(request.message["type"], "GET_SETTINGS");
            request.respond(MessageResponse::ok());
        });

        let response = client.send_message(&ExtensionMessage::GetSettings).await.unwrap();
        assert!(response.success);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_background_gone() {
        let (connector, requests) = runtime_channel();
        drop(requests);
        assert_matches!(
            connector.client(None).send_message(&ExtensionMessage::GetSettings).await,
            Err(RelayError::BackgroundGone)
        );
    }
}
