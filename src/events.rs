use axum::response::sse;

/// A state change pushed to every live subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The visit counter now holds this value.
    CountChanged(u64),
    /// The guestbook message changed; carries the rendered `<timestamp>: <text>`.
    MessageChanged(String),
}

impl Event {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::CountChanged(_) => "count",
            Event::MessageChanged(_) => "message",
        }
    }

    /// SSE data payload, with every line break as a bare `\n`.
    ///
    /// SSE fields may not contain `\r`; form textareas submit `\r\n`.
    pub fn payload(&self) -> String {
        match self {
            Event::CountChanged(value) => value.to_string(),
            Event::MessageChanged(rendered) => rendered.replace("\r\n", "\n").replace('\r', "\n"),
        }
    }

    /// Wire form: `event: <name>` followed by one `data:` line per payload
    /// line, terminated by a blank line.
    pub fn to_sse(&self) -> sse::Event {
        sse::Event::default().event(self.name()).data(self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_payload() {
        let event = Event::CountChanged(42);
        assert_eq!(event.name(), "count");
        assert_eq!(event.payload(), "42");
    }

    #[test]
    fn message_payload_is_unchanged_without_line_breaks() {
        let event = Event::MessageChanged("2024-01-01T00:00:00Z: hi".into());
        assert_eq!(event.name(), "message");
        assert_eq!(event.payload(), "2024-01-01T00:00:00Z: hi");
    }

    #[test]
    fn carriage_returns_become_newlines() {
        let event = Event::MessageChanged("a\r\nb\rc\nd".into());
        assert_eq!(event.payload(), "a\nb\nc\nd");
    }

    #[test]
    fn to_sse_accepts_crlf_messages() {
        // axum asserts on '\r' inside a field
        let _ = Event::MessageChanged("line1\r\nline2\r".into()).to_sse();
    }
}
