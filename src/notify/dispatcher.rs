//! Notification dispatch orchestration.
//!
//! One trigger in, one aggregate outcome out: resolve who should hear about
//! the event, consult the rate limiter, fetch each recipient's endpoints,
//! fan deliveries out concurrently, and reconcile failures against the
//! subscription store. The dispatcher never raises to its caller:
//! notification delivery is a best-effort side channel of a write that has
//! already committed, so every internal failure degrades to a soft
//! `{sent: 0}` outcome.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::metrics::Metrics;
use crate::notify::format::{
    self, DEFAULT_ROOM_NAME, FALLBACK_SENDER, NotificationPayload,
};
use crate::notify::webpush::{DeliveryError, PushTransport};
use crate::rate_limiter::NotifyRateLimiter;
use crate::store::{PushEndpoint, Store};

/// A chat event that may produce notifications. Constructed by the trigger
/// route, consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A message was posted to a room.
    MessagePosted {
        room_id: String,
        message_id: String,
        sender_id: String,
    },
    /// The room's turn advanced to a new player.
    TurnAdvanced { room_id: String },
}

impl NotificationEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::MessagePosted { .. } => "message",
            Self::TurnAdvanced { .. } => "turn",
        }
    }
}

/// Aggregate result of one dispatch invocation.
///
/// For message events `sent`/`total` count recipients; for turn events they
/// count the single recipient's endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub total: usize,
    /// Informational reason for a soft no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Internal failure converted to a soft outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchOutcome {
    fn skipped(reason: &str) -> Self {
        Self {
            message: Some(reason.to_string()),
            ..Self::default()
        }
    }

    fn failed(err: impl std::fmt::Display) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Push notification dispatcher.
///
/// Store and transport are optional: a deployment without push credentials
/// or store credentials still serves triggers, answering every one with a
/// soft no-op.
pub struct Dispatcher {
    store: Option<Arc<dyn Store>>,
    transport: Option<Arc<dyn PushTransport>>,
    rate_limiter: NotifyRateLimiter<(String, String)>,
    metrics: Option<Metrics>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(
        store: Option<Arc<dyn Store>>,
        transport: Option<Arc<dyn PushTransport>>,
        rate_limiter: NotifyRateLimiter<(String, String)>,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            store,
            transport,
            rate_limiter,
            metrics,
        }
    }

    /// Check if both the store and the push transport are configured.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.store.is_some() && self.transport.is_some()
    }

    /// Evict stale rate-limiter entries. Called from the periodic
    /// maintenance task.
    pub async fn cleanup(&self) {
        let stats = self.rate_limiter.cleanup().await;
        if stats.evicted > 0 {
            debug!(
                evicted = stats.evicted,
                remaining = stats.remaining,
                "Rate limiter cleanup"
            );
        }
    }

    /// Dispatch notifications for a chat event.
    ///
    /// Never returns an error: configuration gaps and nothing-to-do cases
    /// come back as `{sent: 0}` with an informational message, and
    /// unexpected failures are logged and folded into `{sent: 0, error}`.
    pub async fn dispatch(&self, event: NotificationEvent) -> DispatchOutcome {
        if let Some(ref m) = self.metrics {
            m.record_trigger(event.kind());
        }

        let (Some(store), Some(transport)) = (&self.store, &self.transport) else {
            debug!(kind = event.kind(), "Push delivery not configured, skipping");
            return DispatchOutcome::skipped("Push delivery is not configured");
        };

        let result = match &event {
            NotificationEvent::MessagePosted {
                room_id,
                message_id,
                sender_id,
            } => {
                self.dispatch_message(store.as_ref(), transport.as_ref(), room_id, message_id, sender_id)
                    .await
            }
            NotificationEvent::TurnAdvanced { room_id } => {
                self.dispatch_turn(store.as_ref(), transport.as_ref(), room_id).await
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(kind = event.kind(), error = %e, "Dispatch failed");
                DispatchOutcome::failed(e)
            }
        }
    }

    async fn dispatch_message(
        &self,
        store: &dyn Store,
        transport: &dyn PushTransport,
        room_id: &str,
        message_id: &str,
        sender_id: &str,
    ) -> Result<DispatchOutcome> {
        // The message may have been deleted between trigger and dispatch;
        // nothing to notify about then.
        let Some(message) = store.message(room_id, message_id).await? else {
            debug!(room_id, message_id, "Message not found, skipping");
            return Ok(DispatchOutcome::skipped("Message not found"));
        };

        let room_name = store
            .room_name(room_id)
            .await?
            .unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string());
        let sender_name = store
            .display_name(sender_id)
            .await?
            .unwrap_or_else(|| FALLBACK_SENDER.to_string());
        let preview = format::message_preview(&sender_name, &message);

        let members = store.room_members(room_id, sender_id).await?;
        if members.is_empty() {
            debug!(room_id, "No other members in room");
            return Ok(DispatchOutcome::skipped("No members to notify"));
        }

        let recipients: Vec<_> = members
            .into_iter()
            .filter(|m| m.message_notifs_enabled)
            .collect();
        if recipients.is_empty() {
            debug!(room_id, "All members have message notifications disabled");
            return Ok(DispatchOutcome::skipped("No eligible members"));
        }

        let total = recipients.len();
        let mut sent = 0;

        for recipient in recipients {
            let key = (recipient.user_id.clone(), room_id.to_string());
            let decision = self.rate_limiter.check_and_update(&key).await;
            if !decision.should_send {
                trace!(
                    user_id = %recipient.user_id,
                    room_id,
                    pending = decision.pending,
                    "Notification coalesced"
                );
                if let Some(ref m) = self.metrics {
                    m.record_coalesced();
                }
                continue;
            }

            let endpoints = store.endpoints_for_user(&recipient.user_id).await?;
            if endpoints.is_empty() {
                trace!(user_id = %recipient.user_id, "No registered endpoints");
                continue;
            }

            let body = format::with_pending(&preview, decision.pending);
            let payload = format::message_payload(&room_name, room_id, body);

            let delivered = self
                .fan_out(store, transport, &endpoints, &payload)
                .await;
            if delivered > 0 {
                sent += 1;
                if let Some(ref m) = self.metrics {
                    m.record_recipient_notified();
                }
            }
        }

        debug!(room_id, sent, total, "Message notifications dispatched");
        Ok(DispatchOutcome {
            sent,
            total,
            ..DispatchOutcome::default()
        })
    }

    /// Turn notifications are not rate limited: turn changes are paced by
    /// gameplay, not by wall clock.
    async fn dispatch_turn(
        &self,
        store: &dyn Store,
        transport: &dyn PushTransport,
        room_id: &str,
    ) -> Result<DispatchOutcome> {
        let Some(session) = store.active_turn(room_id).await? else {
            debug!(room_id, "No active turn session");
            return Ok(DispatchOutcome::skipped("No active turn session"));
        };
        let Some(user_id) = session.current_user_id else {
            debug!(room_id, "Turn session has no current user");
            return Ok(DispatchOutcome::skipped("No active turn session"));
        };

        let endpoints = store.endpoints_for_user(&user_id).await?;
        if endpoints.is_empty() {
            trace!(user_id = %user_id, "No registered endpoints");
            return Ok(DispatchOutcome::skipped("No registered endpoints"));
        }

        let room_name = store
            .room_name(room_id)
            .await?
            .unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string());
        let payload = format::turn_payload(&room_name, room_id);

        let total = endpoints.len();
        let sent = self
            .fan_out(store, transport, &endpoints, &payload)
            .await;
        if sent > 0
            && let Some(ref m) = self.metrics
        {
            m.record_recipient_notified();
        }

        debug!(room_id, sent, total, "Turn notification dispatched");
        Ok(DispatchOutcome {
            sent,
            total,
            ..DispatchOutcome::default()
        })
    }

    /// Concurrent all-settled fan-out to one recipient's endpoints.
    ///
    /// Each attempt is independent: a Gone endpoint is deleted from the
    /// store, any other failure is logged and counted, and no outcome
    /// aborts the rest. Returns the number of successful deliveries.
    async fn fan_out(
        &self,
        store: &dyn Store,
        transport: &dyn PushTransport,
        endpoints: &[PushEndpoint],
        payload: &NotificationPayload,
    ) -> usize {
        let attempts = endpoints.iter().map(|endpoint| async move {
            (endpoint, transport.deliver(endpoint, payload).await)
        });

        let mut delivered = 0;
        for (endpoint, result) in join_all(attempts).await {
            match result {
                Ok(()) => {
                    delivered += 1;
                    if let Some(ref m) = self.metrics {
                        m.record_delivery("success");
                    }
                }
                Err(DeliveryError::Gone) => {
                    debug!(endpoint_id = %endpoint.id, "Endpoint gone, removing");
                    if let Err(e) = store.delete_endpoint(&endpoint.id).await {
                        warn!(
                            endpoint_id = %endpoint.id,
                            error = %e,
                            "Failed to remove dead endpoint"
                        );
                    }
                    if let Some(ref m) = self.metrics {
                        m.record_delivery("gone");
                        m.record_endpoint_removed();
                    }
                }
                Err(DeliveryError::Transient(reason)) => {
                    debug!(
                        endpoint_id = %endpoint.id,
                        reason = %reason,
                        "Delivery failed"
                    );
                    if let Some(ref m) = self.metrics {
                        m.record_delivery("transient");
                    }
                }
            }
        }
        delivered
    }
}
