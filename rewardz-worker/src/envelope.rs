//! Inbound action envelope.
//!
//! ```json
//! {"player_id": "user_1", "action": "read_book", "event_id": "9b1d..."}
//! ```
//!
//! `event_id` is optional; without it the event is never deduplicated.

use serde::{Deserialize, Serialize};

use rewardz_core::{ActionEvent, PlayerId};

use crate::error::WorkerError;

/// One decoded delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Acting player.
    pub player_id: PlayerId,
    /// Action name.
    pub action: String,
    /// Idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl Envelope {
    /// Decode a JSON payload.
    ///
    /// # Errors
    /// Returns [`WorkerError::Decode`] if the payload is not valid JSON, is
    /// missing a field, or has an empty `player_id` or `action`.
    pub fn decode(body: &[u8]) -> Result<Self, WorkerError> {
        let envelope: Self =
            serde_json::from_slice(body).map_err(|e| WorkerError::Decode(e.to_string()))?;
        if envelope.player_id.as_str().trim().is_empty() {
            return Err(WorkerError::Decode("empty player_id".into()));
        }
        if envelope.action.trim().is_empty() {
            return Err(WorkerError::Decode("empty action".into()));
        }
        if envelope.event_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(WorkerError::Decode("empty event_id".into()));
        }
        Ok(envelope)
    }

    /// Encode as JSON (for producers and tests).
    ///
    /// # Errors
    /// Returns [`WorkerError::Encode`] if serialisation fails.
    pub fn encode(&self) -> Result<Vec<u8>, WorkerError> {
        serde_json::to_vec(self).map_err(|e| WorkerError::Encode(e.to_string()))
    }

    /// The engine event for this envelope.
    #[must_use]
    pub fn to_event(&self) -> ActionEvent {
        ActionEvent {
            player_id: self.player_id.clone(),
            action: self.action.clone(),
            event_id: self.event_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_minimal_payload() {
        let env = Envelope::decode(br#"{"player_id": "u1", "action": "read"}"#).expect("decode");
        assert_eq!(env.player_id, PlayerId::from("u1"));
        assert_eq!(env.action, "read");
        assert_eq!(env.event_id, None);
        assert_eq!(env.to_event(), ActionEvent::new("u1", "read"));
    }

    #[test]
    fn keeps_event_id() {
        let env = Envelope::decode(br#"{"player_id": "u1", "action": "read", "event_id": "e-1"}"#)
            .expect("decode");
        assert_eq!(env.to_event().event_id.as_deref(), Some("e-1"));
        assert_eq!(Envelope::decode(&env.encode().expect("encode")).expect("decode"), env);
    }

    #[test]
    fn encoding_is_not_a_decode_failure() {
        let env = Envelope {
            player_id: PlayerId::from("u1"),
            action: "read".into(),
            event_id: None,
        };
        let body = env.encode().expect("encode");
        assert_eq!(body, br#"{"player_id":"u1","action":"read"}"#);

        let err = WorkerError::Encode("key must be a string".into());
        assert!(!matches!(err, WorkerError::Decode(_)));
        assert_eq!(err.to_string(), "Encoding failed: key must be a string");
    }

    #[test]
    fn rejects_malformed_payloads() {
        for body in [
            &b"not json"[..],
            br#"{"player_id": "u1"}"#,
            br#"{"action": "read"}"#,
            br#"{"player_id": "", "action": "read"}"#,
            br#"{"player_id": "u1", "action": "  "}"#,
            br#"{"player_id": "u1", "action": "read", "event_id": ""}"#,
            br#"{"player_id": 7, "action": "read"}"#,
        ] {
            assert!(
                matches!(Envelope::decode(body), Err(WorkerError::Decode(_))),
                "accepted {}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
