//! Event bus adapter: publishes entity-change events on a topic
//!
//! Events travel as a JSON envelope `{"version": 1, "entity": {...}}`. Publishing is
//! best effort: failures are logged and never reach the mutation that triggered them.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bus::Transport;
use crate::error::EventError;

/// Topic carrying newly created players
pub const CREATE_TOPIC: &str = "create";

/// Current envelope version
pub const EVENT_VERSION: u32 = 1;

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T> {
    version: u32,
    entity: &'a T,
}

#[derive(Deserialize)]
struct IncomingEnvelope<T> {
    version: u32,
    entity: T,
}

pub fn encode_event<T: Serialize>(entity: &T) -> Result<Vec<u8>, EventError> {
    let envelope = OutgoingEnvelope {
        version: EVENT_VERSION,
        entity,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

pub fn decode_event<T: DeserializeOwned>(payload: &[u8]) -> Result<T, EventError> {
    let envelope: IncomingEnvelope<T> = serde_json::from_slice(payload)?;
    if envelope.version != EVENT_VERSION {
        return Err(EventError::UnsupportedVersion(envelope.version));
    }
    Ok(envelope.entity)
}

/// Publishes serialized entities through the shared transport
#[derive(Clone)]
pub struct EventPublisher {
    transport: Arc<dyn Transport>,
}

impl EventPublisher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Fire-and-forget publish. Returns whether the transport accepted the event.
    pub async fn publish<T: Serialize>(&self, topic: &str, entity: &T) -> bool {
        let payload = match encode_event(entity) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(topic, error = %e, "Failed to serialize event");
                return false;
            }
        };

        match self.transport.publish(topic, payload).await {
            Ok(()) => {
                tracing::debug!(topic, "Event published");
                true
            }
            Err(e) => {
                tracing::warn!(topic, error = %e, "Failed to publish event");
                false
            }
        }
    }
}
