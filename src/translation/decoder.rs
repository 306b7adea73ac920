//! 流式响应解码器
//!
//! 把分块到达的 HTTP 响应体还原成有序的译文片段序列。

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::providers::{ProviderAdapter, StreamEvent};
use crate::utils::sse_buffer::SseLineBuffer;

use super::error::TranslationError;

/// 字节流 → 片段序列（有限、不可重启）
///
/// 底层 reader 在哨兵、出错、流结束三种情况下都会被立即释放。
pub struct StreamDecoder<S> {
    source: Option<S>,
    adapter: Arc<dyn ProviderAdapter>,
    lines: SseLineBuffer,
    ready: VecDeque<String>,
    finished: bool,
    /// 两次读到数据之间允许的最长间隔
    idle_timeout: Option<Duration>,
}

impl<S, B, E> StreamDecoder<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    pub fn new(source: S, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            source: Some(source),
            adapter,
            lines: SseLineBuffer::new(),
            ready: VecDeque::new(),
            finished: false,
            idle_timeout: None,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    /// 读取下一个片段；`Ok(None)` 表示解码结束
    pub async fn next_fragment(&mut self) -> Result<Option<String>, TranslationError> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Ok(Some(fragment));
            }
            if self.finished {
                return Ok(None);
            }

            let idle_timeout = self.idle_timeout;
            let polled = match self.source.as_mut() {
                Some(source) => match idle_timeout {
                    Some(limit) => tokio::time::timeout(limit, source.next())
                        .await
                        .map_err(|_| limit),
                    None => Ok(source.next().await),
                },
                None => Ok(None),
            };
            let item = match polled {
                Ok(item) => item,
                Err(limit) => {
                    self.release();
                    return Err(TranslationError::provider(
                        None,
                        format!("流式响应超过 {}ms 未收到数据", limit.as_millis()),
                    ));
                }
            };

            match item {
                Some(Ok(bytes)) => {
                    let lines = self.lines.process_bytes(bytes.as_ref());
                    self.consume_lines(lines);
                }
                Some(Err(e)) => {
                    self.release();
                    return Err(TranslationError::provider(
                        None,
                        format!("读取流失败: {}", e),
                    ));
                }
                None => {
                    // 没有收到 [DONE] 就断开也算正常结束
                    debug!("[StreamDecoder] 响应流读取完成");
                    if let Some(rest) = self.lines.flush() {
                        self.consume_lines(vec![rest]);
                    }
                    self.release();
                }
            }
        }
    }

    fn consume_lines(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.finished {
                break;
            }
            for event in self.adapter.parse_stream(&line) {
                match event {
                    StreamEvent::ContentChunk(content) => self.ready.push_back(content),
                    StreamEvent::Empty => {}
                    StreamEvent::Malformed(warning) => {
                        warn!("[StreamDecoder] 跳过无法解析的数据行: {}", warning);
                    }
                    StreamEvent::Done => {
                        debug!("[StreamDecoder] 收到结束标记");
                        self.release();
                        break;
                    }
                }
            }
        }
    }

    fn release(&mut self) {
        self.source = None;
        self.lines.clear();
        self.finished = true;
    }

    /// 底层 reader 是否已释放
    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<String, TranslationError>> {
        futures_util::stream::unfold(self, |mut decoder| async move {
            match decoder.next_fragment().await {
                Ok(Some(fragment)) => Some((Ok(fragment), decoder)),
                Ok(None) => None,
                Err(e) => Some((Err(e), decoder)),
            }
        })
    }
}

/// 便捷入口：直接把字节流变成片段流
pub fn decode<S, B, E>(
    source: S,
    adapter: Arc<dyn ProviderAdapter>,
) -> impl Stream<Item = Result<String, TranslationError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    StreamDecoder::new(source, adapter).into_stream()
}
