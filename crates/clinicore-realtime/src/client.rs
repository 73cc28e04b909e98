//! Connected client state and the client-facing message vocabulary.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque identifier for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Allocates a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a client authenticates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Doctor,
    Patient,
    Nurse,
    Admin,
}

impl ClientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientRole::Doctor => "doctor",
            ClientRole::Patient => "patient",
            ClientRole::Nurse => "nurse",
            ClientRole::Admin => "admin",
        }
    }
}

/// In-memory record of one live connection.
///
/// Owned exclusively by the registry; created on connect, mutated by
/// join/leave and authenticate, destroyed on disconnect. The local room set
/// mirrors the room map so "who is in room X" never needs a transport query.
#[derive(Debug, Clone)]
pub struct ConnectedClient {
    pub id: ClientId,
    pub user_id: Option<String>,
    pub role: Option<ClientRole>,
    pub rooms: HashSet<String>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectedClient {
    /// Creates the record for a freshly accepted connection.
    #[must_use]
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            user_id: None,
            role: None,
            rooms: HashSet::new(),
            connected_at: Utc::now(),
        }
    }

    /// Whether this connection has bound an identity.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Messages a client sends over the transport.
///
/// `authenticate` binds identity only; credential verification happened
/// upstream when the surrounding service issued the token. The
/// `subscribe_*` shorthands are sugar over `join_room` for the
/// conventional room keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Authenticate {
        user_id: String,
        role: ClientRole,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        doctor_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        patient_id: Option<String>,
    },
    JoinRoom {
        room: String,
    },
    LeaveRoom {
        room: String,
    },
    SubscribeDoctor {
        doctor_id: String,
    },
    SubscribePatient {
        patient_id: String,
    },
    SubscribeDate {
        date: NaiveDate,
    },
    SubscribeRecord {
        record_id: String,
    },
}

/// One outbound push frame: a named event plus its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub event: String,
    pub data: Value,
}

impl OutboundFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "action": "authenticate",
            "user_id": "u1",
            "role": "doctor",
            "doctor_id": "d1"
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Authenticate { ref user_id, role: ClientRole::Doctor, .. }
            if user_id == "u1"
        ));

        let msg: ClientMessage =
            serde_json::from_value(json!({"action": "join_room", "room": "date_2025-03-07"}))
                .unwrap();
        assert!(matches!(msg, ClientMessage::JoinRoom { ref room } if room == "date_2025-03-07"));

        let msg: ClientMessage =
            serde_json::from_value(json!({"action": "subscribe_date", "date": "2025-03-07"}))
                .unwrap();
        assert!(matches!(msg, ClientMessage::SubscribeDate { .. }));
    }

    #[test]
    fn test_new_client_is_unauthenticated() {
        let client = ConnectedClient::new(ClientId::new());
        assert!(!client.is_authenticated());
        assert!(client.rooms.is_empty());
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }
}
