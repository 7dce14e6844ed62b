//! Incremental server-sent-events parsing for provider streams.

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser fed from an HTTP byte stream.
///
/// Frames are separated by a blank line; `data:` lines within one frame are
/// joined with newlines per the SSE spec.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        // Normalize CRLF once so the frame splitter below stays simple.
        while let Some(idx) = self.buffer.find("\r\n") {
            self.buffer.replace_range(idx..idx + 2, "\n");
        }

        while let Some(idx) = self.buffer.find("\n\n") {
            let raw: String = self.buffer.drain(..idx + 2).collect();
            if let Some(frame) = parse_frame(raw.trim_end()) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // Comments (":keepalive") and ids are ignored.
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut parser = SseParser::new();
        let frames = parser.push("data: {\"x\":1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: None,
                data: "{\"x\":1}".to_string()
            }]
        );
    }

    #[test]
    fn test_named_event() {
        let mut parser = SseParser::new();
        let frames = parser.push("event: message_stop\ndata: {}\n\n");
        assert_eq!(frames[0].event.as_deref(), Some("message_stop"));
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push("data: hel").is_empty());
        assert!(parser.push("lo\n").is_empty());
        let frames = parser.push("\ndata: world\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "hello");
        assert_eq!(frames[1].data, "world");
    }

    #[test]
    fn test_crlf_frames() {
        let mut parser = SseParser::new();
        let frames = parser.push("data: a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "a");
        assert_eq!(frames[1].data, "b");
    }

    #[test]
    fn test_comment_only_frame_skipped() {
        let mut parser = SseParser::new();
        assert!(parser.push(": keepalive\n\n").is_empty());
    }

    #[test]
    fn test_multi_line_data_joined() {
        let mut parser = SseParser::new();
        let frames = parser.push("data: line1\ndata: line2\n\n");
        assert_eq!(frames[0].data, "line1\nline2");
    }
}
