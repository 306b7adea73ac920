use std::collections::BTreeMap;

use tracing::debug;

/// 接收端片段重排缓冲
///
/// 按 `seq` 连续放行片段；乱序到达的片段先暂存，重复或过期请求的片段直接丢弃。
#[derive(Debug, Default)]
pub struct ChunkReorderBuffer {
    request_id: Option<u64>,
    next_seq: u64,
    pending: BTreeMap<u64, String>,
}

impl ChunkReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始跟踪新请求，旧请求的暂存片段全部丢弃
    pub fn reset(&mut self, request_id: u64) {
        self.request_id = Some(request_id);
        self.next_seq = 0;
        self.pending.clear();
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    /// 接收一个片段，返回现在可以按序应用的片段
    pub fn accept(&mut self, request_id: u64, seq: u64, chunk: String) -> Vec<String> {
        if self.request_id != Some(request_id) {
            debug!(
                "[ChunkReorder] 丢弃过期片段 request={} seq={}",
                request_id, seq
            );
            return Vec::new();
        }
        if seq < self.next_seq || self.pending.contains_key(&seq) {
            debug!("[ChunkReorder] 丢弃重复片段 seq={}", seq);
            return Vec::new();
        }

        self.pending.insert(seq, chunk);
        let mut ready = Vec::new();
        while let Some(chunk) = self.pending.remove(&self.next_seq) {
            ready.push(chunk);
            self.next_seq += 1;
        }
        ready
    }

    /// 流结束时取出剩余暂存片段（跳过缺失的序号，按序返回）
    pub fn drain(&mut self) -> Vec<String> {
        if let Some((&last, _)) = self.pending.iter().next_back() {
            self.next_seq = last + 1;
        }
        std::mem::take(&mut self.pending).into_values().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_passes_through() {
        let mut buf = ChunkReorderBuffer::new();
        buf.reset(1);
        assert_eq!(buf.accept(1, 0, "The".into()), vec!["The"]);
        assert_eq!(buf.accept(1, 1, " weather".into()), vec![" weather"]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_out_of_order_is_held_back() {
        let mut buf = ChunkReorderBuffer::new();
        buf.reset(1);
        assert!(buf.accept(1, 2, "c".into()).is_empty());
        assert!(buf.accept(1, 1, "b".into()).is_empty());
        assert_eq!(buf.accept(1, 0, "a".into()), vec!["a", "b", "c"]);
        // 重复
        assert!(buf.accept(1, 1, "b".into()).is_empty());
    }

    #[test]
    fn test_stale_request_is_dropped() {
        let mut buf = ChunkReorderBuffer::new();
        buf.reset(1);
        buf.accept(1, 1, "late".into());
        buf.reset(2);
        assert!(buf.accept(1, 0, "old".into()).is_empty());
        assert_eq!(buf.pending_len(), 0);
        assert_eq!(buf.accept(2, 0, "new".into()), vec!["new"]);
    }

    #[test]
    fn test_drain_skips_gaps() {
        let mut buf = ChunkReorderBuffer::new();
        buf.reset(5);
        buf.accept(5, 0, "a".into());
        buf.accept(5, 3, "d".into());
        buf.accept(5, 2, "c".into());
        assert_eq!(buf.drain(), vec!["c", "d"]);
        assert!(buf.accept(5, 1, "b".into()).is_empty());
    }
}
