//! Server-Sent Events decoding for streamed completions

use serde::de::DeserializeOwned;

/// Incremental SSE decoder
///
/// Bytes arrive in arbitrary slices; only complete `data:` lines become
/// frames, the rest waits in the buffer.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Upper bound on buffered text from a stream that never sends a newline
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect the frames completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        self.drain_utf8();

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            tracing::warn!(
                "SSE buffer exceeded {}KB limit, truncating",
                Self::MAX_BUFFER_SIZE / 1024
            );
            let mut keep_from = self.buffer.len() - Self::MAX_BUFFER_SIZE / 2;
            while !self.buffer.is_char_boundary(keep_from) {
                keep_from += 1;
            }
            self.buffer.drain(..keep_from);
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(frame) = SseFrame::from_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    pub fn push_str(&mut self, s: &str) -> Vec<SseFrame> {
        self.push(s.as_bytes())
    }

    /// Frame left in the buffer when the stream closed without a final newline
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        self.pending.clear();
        SseFrame::from_line(&rest)
    }

    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty() || !self.pending.is_empty()
    }

    // Multi-byte characters may be split across network chunks; hold back an
    // incomplete tail until the rest arrives.
    fn drain_utf8(&mut self) {
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.pending.clear();
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.buffer.push_str(&text);
                self.pending.drain(..valid);
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.buffer.push_str(&text);
                self.pending.clear();
            }
        }
    }
}

/// One `data:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub data: String,
}

impl SseFrame {
    fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let data = line.strip_prefix("data:")?;
        Some(Self {
            data: data.strip_prefix(' ').unwrap_or(data).to_string(),
        })
    }

    /// `[DONE]` sentinel closing an OpenAI-compatible stream
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    pub fn try_parse<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.data).ok()
    }

    pub fn preview(&self) -> String {
        if self.data.chars().count() > 200 {
            let head: String = self.data.chars().take(200).collect();
            format!("{}...", head)
        } else {
            self.data.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_line_is_buffered() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_str("data: {\"part\":").is_empty());
        assert!(decoder.has_remaining());

        let frames = decoder.push_str(" 1}\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"part\": 1}");
    }

    #[test]
    fn test_done_sentinel() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push_str("data: [DONE]\n\n");
        assert!(frames[0].is_done());
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push_str(": keep-alive\n\nevent: message\ndata:x\n");
        assert_eq!(frames, vec![SseFrame { data: "x".into() }]);
    }

    #[test]
    fn test_split_multibyte_character() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: 财报\n".as_bytes();
        let (head, tail) = bytes.split_at(8);

        assert!(decoder.push(head).is_empty());
        let frames = decoder.push(tail);
        assert_eq!(frames[0].data, "财报");
    }

    #[test]
    fn test_finish_returns_unterminated_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_str("data: last").is_empty());
        assert_eq!(decoder.finish().map(|f| f.data), Some("last".to_string()));
        assert!(!decoder.has_remaining());
    }

    #[test]
    fn test_malformed_json_is_skippable() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push_str("data: not-json\n");
        let parsed: Option<serde_json::Value> = frames[0].try_parse();
        assert!(parsed.is_none());
    }
}
