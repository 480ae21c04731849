//! Incremental `text/event-stream` decoding.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Line-oriented decoder fed with raw body chunks. Chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                events.extend(self.dispatch());
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"event: put\nda").is_empty());
        let events = decoder.feed(b"ta: {\"path\":\"/\",\"data\":null}\n\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent {
                    event: "put".to_string(),
                    data: "{\"path\":\"/\",\"data\":null}".to_string()
                },
                SseEvent {
                    event: "keep-alive".to_string(),
                    data: "null".to_string()
                },
            ]
        );
    }

    #[test]
    fn handles_crlf_comments_and_multiline_data() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b": hello\r\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn multibyte_character_split_between_chunks() {
        let mut decoder = SseDecoder::default();
        let text = "data: ₦\n\n".as_bytes();
        let (head, tail) = text.split_at(7);
        assert!(decoder.feed(head).is_empty());
        let events = decoder.feed(tail);
        assert_eq!(events[0].data, "₦");
    }

    #[test]
    fn event_without_data_is_dropped() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"event: put\n\n").is_empty());
    }
}
