//! Receiver-side notification state machine.
//!
//! Models the browser service worker that consumes delivered payloads, so
//! the wire contract and click routing stay testable next to the sender.
//! The machine has exactly two states (idle, and displaying a notification)
//! and emits effects (the imperative calls the worker would make) instead
//! of performing I/O. OS-level tag coalescing is the only dedup mechanism;
//! the machine itself never filters repeated payloads.

use serde_json::from_slice;

use crate::notify::format::NotificationPayload;

/// Vibration pattern for displayed notifications (ms on/off/on).
pub const VIBRATION_PATTERN: [u32; 3] = [100, 50, 100];

/// Icon shown in the notification body.
pub const NOTIFICATION_ICON: &str = "/icons/icon-192.png";

/// Badge shown in the status bar on mobile.
pub const NOTIFICATION_BADGE: &str = "/icons/badge-72.png";

/// Receiver state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    /// A notification is on screen; its click URL is stashed.
    Displaying { url: String },
}

/// A system notification to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowNotification {
    pub title: String,
    pub body: String,
    /// Same-tag notifications replace each other at the OS level.
    pub tag: String,
    pub room_id: String,
    /// Stashed for click routing.
    pub url: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Auto-dismissable presentation.
    pub require_interaction: bool,
}

/// An open application window, as enumerated by the worker's client list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppWindow {
    pub origin: String,
}

/// Imperative action the worker performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Show(ShowNotification),
    CloseNotification,
    /// Navigate the window at `window` (index into the client list) to
    /// `url` and bring it to focus.
    FocusWindow { window: usize, url: String },
    /// Open a fresh window at `url`.
    OpenWindow { url: String },
}

/// The two-state display/click machine.
pub struct Receiver {
    origin: String,
    state: ReceiverState,
}

impl Receiver {
    /// Create an idle receiver for the app at `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            state: ReceiverState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ReceiverState {
        &self.state
    }

    /// Handle a delivered push payload.
    ///
    /// A payload that does not parse is dropped without effects; a bad
    /// push must never crash the worker.
    pub fn on_push(&mut self, raw: &[u8]) -> Vec<Effect> {
        let Ok(payload) = from_slice::<NotificationPayload>(raw) else {
            return Vec::new();
        };

        self.state = ReceiverState::Displaying {
            url: payload.url.clone(),
        };
        vec![Effect::Show(ShowNotification {
            title: payload.title,
            body: payload.body,
            tag: payload.tag,
            room_id: payload.room_id,
            url: payload.url,
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_BADGE.to_string(),
            vibrate: VIBRATION_PATTERN.to_vec(),
            require_interaction: false,
        })]
    }

    /// Handle a click on the displayed notification.
    ///
    /// Closes the notification, then routes to the stashed URL: an existing
    /// window at the app's origin is navigated and focused, otherwise a new
    /// window opens.
    pub fn on_click(&mut self, open_windows: &[AppWindow]) -> Vec<Effect> {
        let previous = std::mem::replace(&mut self.state, ReceiverState::Idle);
        let ReceiverState::Displaying { url } = previous else {
            return Vec::new();
        };

        let mut effects = vec![Effect::CloseNotification];
        match open_windows.iter().position(|w| w.origin == self.origin) {
            Some(window) => effects.push(Effect::FocusWindow { window, url }),
            None => effects.push(Effect::OpenWindow { url }),
        }
        effects
    }

    /// Handle a failed navigation of an existing window (it may have been
    /// mid-navigation or closing when the click landed). Falls back to
    /// opening a fresh window at the same URL.
    pub fn on_navigation_failure(&mut self, url: &str) -> Vec<Effect> {
        vec![Effect::OpenWindow {
            url: url.to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://chat.example.com";

    fn payload_bytes() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "title": "Book Club",
            "body": "Alice: hi",
            "roomId": "room-1",
            "url": "/rooms/room-1",
            "tag": "message-room-1",
        }))
        .unwrap()
    }

    #[test]
    fn test_push_displays_notification() {
        let mut receiver = Receiver::new(ORIGIN);
        let effects = receiver.on_push(&payload_bytes());

        assert_eq!(effects.len(), 1);
        let Effect::Show(show) = &effects[0] else {
            panic!("expected Show effect");
        };
        assert_eq!(show.title, "Book Club");
        assert_eq!(show.body, "Alice: hi");
        assert_eq!(show.tag, "message-room-1");
        assert_eq!(show.url, "/rooms/room-1");
        assert_eq!(show.icon, NOTIFICATION_ICON);
        assert_eq!(show.badge, NOTIFICATION_BADGE);
        assert_eq!(show.vibrate, VIBRATION_PATTERN.to_vec());
        assert!(!show.require_interaction);

        assert_eq!(
            receiver.state(),
            &ReceiverState::Displaying {
                url: "/rooms/room-1".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_payload_ignored() {
        let mut receiver = Receiver::new(ORIGIN);

        assert!(receiver.on_push(b"not json {").is_empty());
        assert!(receiver.on_push(br#"{"title":"x"}"#).is_empty());
        assert_eq!(receiver.state(), &ReceiverState::Idle);
    }

    #[test]
    fn test_click_focuses_existing_window() {
        let mut receiver = Receiver::new(ORIGIN);
        receiver.on_push(&payload_bytes());

        let windows = vec![
            AppWindow {
                origin: "https://other.example.com".to_string(),
            },
            AppWindow {
                origin: ORIGIN.to_string(),
            },
        ];
        let effects = receiver.on_click(&windows);

        assert_eq!(
            effects,
            vec![
                Effect::CloseNotification,
                Effect::FocusWindow {
                    window: 1,
                    url: "/rooms/room-1".to_string()
                },
            ]
        );
        assert_eq!(receiver.state(), &ReceiverState::Idle);
    }

    #[test]
    fn test_click_opens_new_window_when_none_open() {
        let mut receiver = Receiver::new(ORIGIN);
        receiver.on_push(&payload_bytes());

        let effects = receiver.on_click(&[]);
        assert_eq!(
            effects,
            vec![
                Effect::CloseNotification,
                Effect::OpenWindow {
                    url: "/rooms/room-1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_click_ignores_foreign_origin_windows() {
        let mut receiver = Receiver::new(ORIGIN);
        receiver.on_push(&payload_bytes());

        let windows = vec![AppWindow {
            origin: "https://attacker.example.com".to_string(),
        }];
        let effects = receiver.on_click(&windows);
        assert!(matches!(effects[1], Effect::OpenWindow { .. }));
    }

    #[test]
    fn test_click_while_idle_is_noop() {
        let mut receiver = Receiver::new(ORIGIN);
        assert!(receiver.on_click(&[]).is_empty());
    }

    #[test]
    fn test_navigation_failure_falls_back_to_open() {
        let mut receiver = Receiver::new(ORIGIN);
        receiver.on_push(&payload_bytes());
        receiver.on_click(&[AppWindow {
            origin: ORIGIN.to_string(),
        }]);

        let effects = receiver.on_navigation_failure("/rooms/room-1");
        assert_eq!(
            effects,
            vec![Effect::OpenWindow {
                url: "/rooms/room-1".to_string()
            }]
        );
    }

    #[test]
    fn test_repeated_pushes_both_display() {
        // Dedup is the OS's job via tags; the machine shows every payload.
        let mut receiver = Receiver::new(ORIGIN);
        assert_eq!(receiver.on_push(&payload_bytes()).len(), 1);
        assert_eq!(receiver.on_push(&payload_bytes()).len(), 1);
    }

    #[test]
    fn test_full_cycle_returns_to_idle() {
        let mut receiver = Receiver::new(ORIGIN);
        assert_eq!(receiver.state(), &ReceiverState::Idle);

        receiver.on_push(&payload_bytes());
        assert!(matches!(
            receiver.state(),
            ReceiverState::Displaying { .. }
        ));

        receiver.on_click(&[]);
        assert_eq!(receiver.state(), &ReceiverState::Idle);
    }
}
