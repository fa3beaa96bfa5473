//! Incremental decoder for OpenAI-style server-sent events.
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty content delta.
    Delta(String),
    Done,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Buffers raw bytes across network chunks; a line (or a UTF-8 sequence)
/// split between two reads is decoded once it is complete.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes whatever is left once the body ends without a trailing newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(payload) => payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(SseEvent::Delta),
        Err(e) => {
            tracing::debug!("Skipping undecodable event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_deltas_and_done() {
        let mut d = SseDecoder::new();
        let body = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n";
        assert_eq!(
            d.push(body),
            vec![SseEvent::Delta("Hel".into()), SseEvent::Delta("lo".into()), SseEvent::Done]
        );
    }

    #[test]
    fn line_split_across_reads() {
        let mut d = SseDecoder::new();
        assert!(d.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        assert_eq!(d.push(b"tent\":\"x\"}}]}\n"), vec![SseEvent::Delta("x".into())]);
    }

    #[test]
    fn role_only_and_comment_lines_are_ignored() {
        let mut d = SseDecoder::new();
        let body = b": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\ndata: {\"choices\":[]}\n";
        assert!(d.push(body).is_empty());
    }

    #[test]
    fn multibyte_char_split_across_reads() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).expect("é lead byte") + 1;
        let mut d = SseDecoder::new();
        assert!(d.push(&line[..split]).is_empty());
        assert_eq!(d.push(&line[split..]), vec![SseEvent::Delta("café".into())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut d = SseDecoder::new();
        assert!(d.push(b"data: [DONE]").is_empty());
        assert_eq!(d.finish(), Some(SseEvent::Done));
        assert_eq!(d.finish(), None);
    }
}
