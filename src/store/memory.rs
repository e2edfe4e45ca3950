//! In-memory store binding.
//!
//! Backs the trait seams with `RwLock`-guarded maps. Used by the bundled
//! server wiring and by tests; a deployment with a relational store
//! implements the same traits instead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::store::{
    ChatStore, MemberPreference, PushEndpoint, StoredMessage, SubscriptionStore, TurnSession,
};

#[derive(Default)]
pub struct MemoryStore {
    room_names: RwLock<HashMap<String, String>>,
    display_names: RwLock<HashMap<String, String>>,
    members: RwLock<HashMap<String, Vec<MemberPreference>>>,
    messages: RwLock<HashMap<(String, String), StoredMessage>>,
    turns: RwLock<HashMap<String, TurnSession>>,
    endpoints: RwLock<HashMap<String, PushEndpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names a room.
    pub fn put_room(&self, room_id: &str, name: Option<&str>) {
        if let Some(name) = name {
            self.room_names
                .write()
                .unwrap()
                .insert(room_id.to_string(), name.to_string());
        }
    }

    /// Registers a user's display name.
    pub fn put_user(&self, user_id: &str, display_name: &str) {
        self.display_names
            .write()
            .unwrap()
            .insert(user_id.to_string(), display_name.to_string());
    }

    /// Adds a member to a room.
    pub fn put_member(&self, room_id: &str, user_id: &str, message_notifs_enabled: bool) {
        self.members
            .write()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .push(MemberPreference {
                user_id: user_id.to_string(),
                message_notifs_enabled,
            });
    }

    /// Stores a message.
    pub fn put_message(&self, message: StoredMessage) {
        self.messages
            .write()
            .unwrap()
            .insert((message.room_id.clone(), message.id.clone()), message);
    }

    /// Sets the active turn session for a room.
    pub fn put_turn(&self, session: TurnSession) {
        self.turns
            .write()
            .unwrap()
            .insert(session.room_id.clone(), session);
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn message(&self, room_id: &str, message_id: &str) -> Result<Option<StoredMessage>> {
        let messages = self.messages.read().unwrap();
        Ok(messages
            .get(&(room_id.to_string(), message_id.to_string()))
            .cloned())
    }

    async fn room_name(&self, room_id: &str) -> Result<Option<String>> {
        Ok(self.room_names.read().unwrap().get(room_id).cloned())
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.display_names.read().unwrap().get(user_id).cloned())
    }

    async fn room_members(
        &self,
        room_id: &str,
        exclude_user_id: &str,
    ) -> Result<Vec<MemberPreference>> {
        let members = self.members.read().unwrap();
        Ok(members
            .get(room_id)
            .map(|room| {
                room.iter()
                    .filter(|m| m.user_id != exclude_user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn active_turn(&self, room_id: &str) -> Result<Option<TurnSession>> {
        Ok(self.turns.read().unwrap().get(room_id).cloned())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn add_endpoint(&self, endpoint: PushEndpoint) -> Result<()> {
        self.endpoints
            .write()
            .unwrap()
            .insert(endpoint.id.clone(), endpoint);
        Ok(())
    }

    async fn endpoints_for_user(&self, user_id: &str) -> Result<Vec<PushEndpoint>> {
        let endpoints = self.endpoints.read().unwrap();
        let mut result: Vec<PushEndpoint> = endpoints
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        // Stable order for callers and tests.
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<()> {
        self.endpoints.write().unwrap().remove(endpoint_id);
        Ok(())
    }
}
