//! Chat and push-subscription storage.
//!
//! The relational store behind the chat application is an external
//! collaborator; this module defines the trait seams the dispatcher talks
//! through plus the domain types crossing them. Any persistence binding can
//! sit behind the traits; [`memory::MemoryStore`] is the bundled one.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

/// A registered Web Push endpoint for one user's browser/device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEndpoint {
    /// Store-assigned endpoint record id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Push-service URL the transport delivers to.
    pub endpoint: String,
    /// Client encryption keys.
    pub keys: EndpointKeys,
}

/// Per-endpoint encryption keys, as registered by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointKeys {
    /// Client public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

/// Kind of a stored chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// An uploaded image.
    Image,
    /// A structured turn response; content is JSON.
    TurnResponse,
}

/// A chat message as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: String,
}

/// A room member with their notification preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPreference {
    pub user_id: String,
    /// Whether the member wants message notifications.
    pub message_notifs_enabled: bool,
}

/// The active turn session for a room, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSession {
    pub room_id: String,
    /// The user whose turn it currently is.
    pub current_user_id: Option<String>,
}

/// Read access to chat state.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Looks up a message by room and id.
    async fn message(&self, room_id: &str, message_id: &str) -> Result<Option<StoredMessage>>;

    /// Returns the room's display name, if it has one.
    async fn room_name(&self, room_id: &str) -> Result<Option<String>>;

    /// Returns a user's display name, if known.
    async fn display_name(&self, user_id: &str) -> Result<Option<String>>;

    /// Returns the room's members with their notification preferences,
    /// excluding `exclude_user_id` (the actor who caused the event).
    async fn room_members(
        &self,
        room_id: &str,
        exclude_user_id: &str,
    ) -> Result<Vec<MemberPreference>>;

    /// Returns the room's active turn session, if one exists.
    async fn active_turn(&self, room_id: &str) -> Result<Option<TurnSession>>;
}

/// Push endpoint persistence.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Registers an endpoint. Duplicate registrations are harmless;
    /// fan-out is idempotent per endpoint record.
    async fn add_endpoint(&self, endpoint: PushEndpoint) -> Result<()>;

    /// Lists all live endpoints for a user.
    async fn endpoints_for_user(&self, user_id: &str) -> Result<Vec<PushEndpoint>>;

    /// Deletes an endpoint record. Deleting an unknown id is a no-op.
    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<()>;
}

/// Combined store handle the dispatcher holds.
pub trait Store: ChatStore + SubscriptionStore {}

impl<T: ChatStore + SubscriptionStore> Store for T {}
