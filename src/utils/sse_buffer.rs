use encoding_rs::{CoderResult, Decoder, UTF_8};

/// SSE行缓冲工具
/// 用于处理跨chunk的不完整SSE行，确保数据完整性
///
/// 字节先经过流式 UTF-8 解码（被 chunk 边界切断的多字节字符会保留到下一次），
/// 再按换行符切分出完整的行。
pub struct SseLineBuffer {
    decoder: Decoder,
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder_without_bom_handling(),
            buffer: String::new(),
        }
    }

    /// 处理新到达的原始字节，返回完整的行
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.decode(bytes, false);
        self.drain_complete_lines()
    }

    fn decode(&mut self, bytes: &[u8], last: bool) {
        let mut input = bytes;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len() * 3 + 4);
            self.buffer.reserve(needed);

            let (result, read, _had_errors) =
                self.decoder.decode_to_string(input, &mut self.buffer, last);
            input = &input[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<String> {
        // 最后一个换行之后的内容可能不完整，保留在缓冲区中
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete.lines().map(str::to_string).collect()
    }

    /// 获取剩余的不完整行（用于流结束时的最终处理）
    pub fn flush(&mut self) -> Option<String> {
        self.decode(&[], true);
        self.decoder = UTF_8.new_decoder_without_bom_handling();

        if self.buffer.is_empty() {
            None
        } else {
            let remaining = std::mem::take(&mut self.buffer);
            Some(remaining.trim_end_matches(['\r', '\n']).to_string())
        }
    }

    /// 清空缓冲区
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.decoder = UTF_8.new_decoder_without_bom_handling();
    }
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
