//! Connection registry: client tracking, rooms and broadcast.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{ClientId, ClientMessage, ClientRole, ConnectedClient, OutboundFrame};
use crate::rooms::{date_room, doctor_room, patient_room, record_room};

struct ClientEntry {
    client: ConnectedClient,
    outbound: mpsc::Sender<OutboundFrame>,
}

/// Tracks live connections and routes push frames to them.
///
/// All mutation goes through the registry's own methods; nothing else holds
/// references into client state. Every broadcast variant is best-effort: a
/// closed registry or a gone client logs and returns, it never errors, so a
/// degraded realtime layer can never reject the data write that triggered
/// the update.
pub struct ConnectionRegistry {
    clients: DashMap<ClientId, ClientEntry>,
    rooms: DashMap<String, HashSet<ClientId>>,
    closed: AtomicBool,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers a new connection and returns its id.
    ///
    /// `outbound` is the transport's per-connection send channel; frames
    /// that do not fit its buffer are dropped for that client.
    pub fn register(&self, outbound: mpsc::Sender<OutboundFrame>) -> ClientId {
        let id = ClientId::new();
        self.clients.insert(
            id,
            ClientEntry {
                client: ConnectedClient::new(id),
                outbound,
            },
        );
        info!(client_id = %id, total = self.clients.len(), "Client connected");
        id
    }

    /// Removes a connection and all its room memberships.
    pub fn unregister(&self, id: ClientId) {
        let Some((_, entry)) = self.clients.remove(&id) else {
            return;
        };
        for room in &entry.client.rooms {
            self.remove_from_room(room, id);
        }
        info!(client_id = %id, total = self.clients.len(), "Client disconnected");
    }

    /// Applies one inbound client message.
    pub fn handle_message(&self, id: ClientId, message: ClientMessage) {
        match message {
            ClientMessage::Authenticate {
                user_id,
                role,
                doctor_id,
                patient_id,
            } => self.authenticate(id, user_id, role, doctor_id, patient_id),
            ClientMessage::JoinRoom { room } => self.join_room(id, &room),
            ClientMessage::LeaveRoom { room } => self.leave_room(id, &room),
            ClientMessage::SubscribeDoctor { doctor_id } => {
                self.join_room(id, &doctor_room(&doctor_id));
            }
            ClientMessage::SubscribePatient { patient_id } => {
                self.join_room(id, &patient_room(&patient_id));
            }
            ClientMessage::SubscribeDate { date } => self.join_room(id, &date_room(date)),
            ClientMessage::SubscribeRecord { record_id } => {
                self.join_room(id, &record_room(&record_id));
            }
        }
    }

    /// Binds an already-verified identity onto a connection and auto-joins
    /// its role-appropriate rooms.
    ///
    /// No credential check happens here; the surrounding service validated
    /// the token before handing the identity over.
    pub fn authenticate(
        &self,
        id: ClientId,
        user_id: String,
        role: ClientRole,
        doctor_id: Option<String>,
        patient_id: Option<String>,
    ) {
        {
            let Some(mut entry) = self.clients.get_mut(&id) else {
                warn!(client_id = %id, "Authenticate for unknown client");
                return;
            };
            entry.client.user_id = Some(user_id.clone());
            entry.client.role = Some(role);
        }

        debug!(client_id = %id, user_id = %user_id, role = %role.as_str(), "Client authenticated");

        match role {
            ClientRole::Doctor => {
                let doctor = doctor_id.unwrap_or(user_id);
                self.join_room(id, &doctor_room(&doctor));
            }
            ClientRole::Patient => {
                let patient = patient_id.unwrap_or(user_id);
                self.join_room(id, &patient_room(&patient));
            }
            // Staff roles scope themselves via explicit subscriptions.
            ClientRole::Nurse | ClientRole::Admin => {}
        }
    }

    /// Adds a connection to a room. Idempotent.
    pub fn join_room(&self, id: ClientId, room: &str) {
        let Some(mut entry) = self.clients.get_mut(&id) else {
            warn!(client_id = %id, room = %room, "Join for unknown client");
            return;
        };
        if entry.client.rooms.insert(room.to_string()) {
            drop(entry);
            self.rooms.entry(room.to_string()).or_default().insert(id);
            debug!(client_id = %id, room = %room, "Joined room");
        }
    }

    /// Removes a connection from a room. Idempotent.
    pub fn leave_room(&self, id: ClientId, room: &str) {
        let Some(mut entry) = self.clients.get_mut(&id) else {
            return;
        };
        if entry.client.rooms.remove(room) {
            drop(entry);
            self.remove_from_room(room, id);
            debug!(client_id = %id, room = %room, "Left room");
        }
    }

    fn remove_from_room(&self, room: &str, id: ClientId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&id);
            let empty = members.is_empty();
            drop(members);
            // Empty rooms have no lifecycle of their own; drop the key.
            if empty {
                self.rooms.remove_if(room, |_, members| members.is_empty());
            }
        }
    }

    /// Sends an event to every connected client.
    pub fn broadcast_to_all(&self, event: &str, data: Value) {
        if self.is_closed("broadcast_to_all") {
            return;
        }
        let frame = OutboundFrame::new(event, annotate(data, "broadcast", Value::Bool(true)));
        let targets: Vec<(ClientId, mpsc::Sender<OutboundFrame>)> = self
            .clients
            .iter()
            .map(|entry| (*entry.key(), entry.outbound.clone()))
            .collect();
        self.deliver(targets, frame);
    }

    /// Sends an event to every client joined to `room`.
    ///
    /// A room with no members is a no-op.
    pub fn broadcast_to_room(&self, room: &str, event: &str, data: Value) {
        if self.is_closed("broadcast_to_room") {
            return;
        }
        let members: Vec<ClientId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };
        let frame = OutboundFrame::new(
            event,
            annotate(data, "room", Value::String(room.to_string())),
        );
        let targets: Vec<(ClientId, mpsc::Sender<OutboundFrame>)> = members
            .into_iter()
            .filter_map(|id| {
                self.clients
                    .get(&id)
                    .map(|entry| (id, entry.outbound.clone()))
            })
            .collect();
        self.deliver(targets, frame);
    }

    /// Sends an event to one connection.
    pub fn send_to_client(&self, id: ClientId, event: &str, data: Value) {
        if self.is_closed("send_to_client") {
            return;
        }
        let Some(entry) = self.clients.get(&id) else {
            debug!(client_id = %id, "Send to unknown client dropped");
            return;
        };
        let outbound = entry.outbound.clone();
        drop(entry);
        let frame = OutboundFrame::new(event, annotate(data, "direct", Value::Bool(true)));
        self.deliver(vec![(id, outbound)], frame);
    }

    fn deliver(&self, targets: Vec<(ClientId, mpsc::Sender<OutboundFrame>)>, frame: OutboundFrame) {
        let mut gone = Vec::new();
        for (id, outbound) in targets {
            match outbound.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client_id = %id, event = %frame.event, "Client buffer full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(id),
            }
        }
        for id in gone {
            self.unregister(id);
        }
    }

    /// Connections currently joined to a room.
    #[must_use]
    pub fn clients_in_room(&self, room: &str) -> Vec<ClientId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of one client's state.
    #[must_use]
    pub fn client(&self, id: ClientId) -> Option<ConnectedClient> {
        self.clients.get(&id).map(|entry| entry.client.clone())
    }

    /// Number of live connections.
    #[must_use]
    pub fn connected_clients_count(&self) -> usize {
        self.clients.len()
    }

    /// Tears down all in-memory client state. Idempotent; subsequent
    /// broadcasts log a warning and return.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.clients.len();
        self.clients.clear();
        self.rooms.clear();
        info!(dropped, "Connection registry shut down");
    }

    fn is_closed(&self, operation: &str) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            warn!(operation, "Registry not available, realtime delivery skipped");
            return true;
        }
        false
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("clients", &self.clients.len())
            .field("rooms", &self.rooms.len())
            .finish()
    }
}

/// Stamps delivery metadata onto an outgoing payload.
///
/// Object payloads are annotated in place; anything else is wrapped so the
/// metadata has somewhere to live.
fn annotate(data: Value, key: &str, value: Value) -> Value {
    let mut object = match data {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    object.insert(key.to_string(), value);
    object.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    Value::Object(object)
}
