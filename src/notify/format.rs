//! Notification payload formatting.
//!
//! Pure functions from domain events to the wire payload the service worker
//! displays. No I/O; fully deterministic.

use serde::{Deserialize, Serialize};

use crate::store::{MessageKind, StoredMessage};

/// Maximum preview length in characters before truncation.
pub const PREVIEW_MAX_CHARS: usize = 80;

/// Title used when a room has no name.
pub const DEFAULT_ROOM_NAME: &str = "Untitled Room";

/// Sender label used when a user has no display name.
pub const FALLBACK_SENDER: &str = "Someone";

/// Wire-level notification content, JSON-encoded before encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub room_id: String,
    pub url: String,
    /// OS-level coalescing tag; a new notification replaces an older one
    /// with the same tag.
    pub tag: String,
}

/// Formats the preview body for a posted message.
///
/// Image messages, and turn responses tagged as photo turns, render a fixed
/// photo phrase. Everything else is the literal content, truncated to
/// [`PREVIEW_MAX_CHARS`] characters with an ellipsis.
pub fn message_preview(sender_name: &str, message: &StoredMessage) -> String {
    match message.kind {
        MessageKind::Image => format!("{sender_name}: Sent a photo"),
        MessageKind::TurnResponse if is_photo_turn(&message.content) => {
            format!("{sender_name}: Sent a photo")
        }
        _ => format!("{sender_name}: {}", truncate_preview(&message.content)),
    }
}

/// Builds the payload for a posted message. Tagged `message-{roomId}` so
/// consecutive message notifications for one room replace each other.
pub fn message_payload(room_name: &str, room_id: &str, body: String) -> NotificationPayload {
    NotificationPayload {
        title: room_name.to_string(),
        body,
        room_id: room_id.to_string(),
        url: room_url(room_id),
        tag: format!("message-{room_id}"),
    }
}

/// Builds the payload for a turn change. Tagged `turn-{roomId}`, a separate
/// namespace from message notifications.
pub fn turn_payload(room_name: &str, room_id: &str) -> NotificationPayload {
    NotificationPayload {
        title: room_name.to_string(),
        body: "It's your turn!".to_string(),
        room_id: room_id.to_string(),
        url: room_url(room_id),
        tag: format!("turn-{room_id}"),
    }
}

/// Appends the coalesced-notification suffix when any were suppressed.
pub fn with_pending(body: &str, pending: u32) -> String {
    if pending > 0 {
        format!("{body} (+{pending} more)")
    } else {
        body.to_string()
    }
}

fn room_url(room_id: &str) -> String {
    format!("/rooms/{room_id}")
}

/// A turn response whose JSON content carries `kind: "photo_turn"`.
/// Anything unparseable is treated as plain text.
fn is_photo_turn(content: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(|k| k == "photo_turn"))
        .unwrap_or(false)
}

fn truncate_preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_MAX_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageKind, content: &str) -> StoredMessage {
        StoredMessage {
            id: "m1".to_string(),
            room_id: "r1".to_string(),
            sender_id: "alice".to_string(),
            kind,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_short_text_verbatim() {
        let msg = message(MessageKind::Text, "Hello everyone this is a short message");
        assert_eq!(
            message_preview("Alice", &msg),
            "Alice: Hello everyone this is a short message"
        );
    }

    #[test]
    fn test_exactly_80_chars_verbatim() {
        let content = "a".repeat(80);
        let msg = message(MessageKind::Text, &content);
        assert_eq!(message_preview("Alice", &msg), format!("Alice: {content}"));
    }

    #[test]
    fn test_long_text_truncated() {
        let content = "a".repeat(81);
        let msg = message(MessageKind::Text, &content);
        let expected = format!("Alice: {}…", "a".repeat(80));
        assert_eq!(message_preview("Alice", &msg), expected);
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        // 81 multi-byte characters must truncate at a character boundary.
        let content = "é".repeat(81);
        let msg = message(MessageKind::Text, &content);
        assert_eq!(
            message_preview("Alice", &msg),
            format!("Alice: {}…", "é".repeat(80))
        );
    }

    #[test]
    fn test_image_message_is_photo() {
        let msg = message(MessageKind::Image, "https://cdn.example.com/xyz.jpg");
        assert_eq!(message_preview("Alice", &msg), "Alice: Sent a photo");
    }

    #[test]
    fn test_photo_turn_response_is_photo() {
        let msg = message(
            MessageKind::TurnResponse,
            r#"{"kind":"photo_turn","image":"xyz.jpg"}"#,
        );
        assert_eq!(message_preview("Alice", &msg), "Alice: Sent a photo");
    }

    #[test]
    fn test_non_photo_turn_response_is_literal() {
        let content = r#"{"kind":"text_turn","text":"hi"}"#;
        let msg = message(MessageKind::TurnResponse, content);
        assert_eq!(message_preview("Alice", &msg), format!("Alice: {content}"));
    }

    #[test]
    fn test_malformed_turn_response_is_literal() {
        let msg = message(MessageKind::TurnResponse, "not json {");
        assert_eq!(message_preview("Alice", &msg), "Alice: not json {");
    }

    #[test]
    fn test_with_pending_zero_unchanged() {
        assert_eq!(with_pending("Alice: hi", 0), "Alice: hi");
    }

    #[test]
    fn test_with_pending_appends_suffix() {
        assert_eq!(with_pending("Alice: hi", 3), "Alice: hi (+3 more)");
        assert!(with_pending("Alice: hi", 3).ends_with(" (+3 more)"));
    }

    #[test]
    fn test_message_payload_tag_and_url() {
        let payload = message_payload("Book Club", "r1", "Alice: hi".to_string());
        assert_eq!(payload.title, "Book Club");
        assert_eq!(payload.tag, "message-r1");
        assert_eq!(payload.url, "/rooms/r1");
        assert_eq!(payload.room_id, "r1");
    }

    #[test]
    fn test_turn_payload() {
        let payload = turn_payload("Book Club", "r1");
        assert_eq!(payload.title, "Book Club");
        assert_eq!(payload.body, "It's your turn!");
        assert_eq!(payload.tag, "turn-r1");
        assert_eq!(payload.url, "/rooms/r1");
    }

    #[test]
    fn test_tag_namespaces_are_distinct() {
        let message_tag = message_payload("X", "r1", String::new()).tag;
        let turn_tag = turn_payload("X", "r1").tag;
        assert_ne!(message_tag, turn_tag);
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = message_payload("Book Club", "r1", "Alice: hi".to_string());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["title"], "Book Club");
        assert_eq!(json["body"], "Alice: hi");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["url"], "/rooms/r1");
        assert_eq!(json["tag"], "message-r1");
    }
}
