//! Notification formatting, delivery, and dispatching.

pub mod dispatcher;
pub mod format;
pub mod webpush;

pub use dispatcher::{DispatchOutcome, Dispatcher, NotificationEvent};
pub use webpush::{PushTransport, WebPushTransport};
