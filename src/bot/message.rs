//! Inbound chat messages as the bot sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::preview;

/// Max chars of message text written to the log.
const LOG_PREVIEW_CHARS: usize = 80;

/// A text message received from a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Transport message id (`wamid...` on WhatsApp).
    pub id: String,
    /// Sender's phone number, digits only. Also the conversation key.
    pub from: String,
    /// Profile name, when the transport shares one.
    pub name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or(&self.from)
    }

    /// One-line summary for logs: `[from name]: "text"`, newlines escaped.
    pub fn log_line(&self) -> String {
        let text = preview(&self.text, LOG_PREVIEW_CHARS).replace('\n', "\\n");
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => format!("[{} {}]: \"{}\"", self.from, name, text),
            _ => format!("[{}]: \"{}\"", self.from, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(name: Option<&str>, text: &str) -> IncomingMessage {
        IncomingMessage {
            id: "wamid.1".to_string(),
            from: "5511999998888".to_string(),
            name: name.map(str::to_string),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_falls_back_to_phone() {
        assert_eq!(msg(Some("Júlia"), "oi").display_name(), "Júlia");
        assert_eq!(msg(Some("  "), "oi").display_name(), "5511999998888");
        assert_eq!(msg(None, "oi").display_name(), "5511999998888");
    }

    #[test]
    fn test_log_line_escapes_newlines() {
        let line = msg(Some("Júlia"), "linha 1\nlinha 2").log_line();
        assert_eq!(line, r#"[5511999998888 Júlia]: "linha 1\nlinha 2""#);
    }

    #[test]
    fn test_log_line_truncates() {
        let long = "a".repeat(200);
        let line = msg(None, &long).log_line();
        assert!(line.ends_with("...\""));
        assert!(line.len() < 120);
    }
}
