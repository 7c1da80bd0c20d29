//! Protocol state machine driving users, rooms and distance updates
//!
//! The coordinator consumes one inbound event at a time and returns the
//! outbound messages it produced. Delivery is a separate step (`dispatch`)
//! so the transport stays a thin adapter with no protocol logic.

use crate::room_directory::RoomDirectory;
use crate::user_registry::{ConnectionHandle, RoomId, UserId, UserRegistry};
use log::{debug, warn};
use shared::{
    combined_accuracy, decode_client_message, haversine_distance, now_millis, ClientMessage,
    PositionSample, ServerMessage, WirePosition,
};
use std::net::SocketAddr;

/// A message addressed to one connected user
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: UserId,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn new(to: impl Into<UserId>, message: ServerMessage) -> Self {
        Self {
            to: to.into(),
            message,
        }
    }
}

/// Where a connection sits in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Identity assigned, not in any room
    Connected,
    InRoom(RoomId),
    /// Disconnected, or never known
    Closed,
}

/// Sole owner of the user registry and room directory
#[derive(Debug)]
pub struct SessionCoordinator {
    users: UserRegistry,
    rooms: RoomDirectory,
}

impl SessionCoordinator {
    pub fn new(max_history: usize) -> Self {
        Self::with_registry(UserRegistry::new(max_history))
    }

    pub fn with_registry(users: UserRegistry) -> Self {
        Self {
            users,
            rooms: RoomDirectory::new(),
        }
    }

    /// Assigns an identity to a new connection and greets it with its id.
    ///
    /// Returns None if no identity could be allocated.
    pub fn on_connect(
        &mut self,
        addr: SocketAddr,
        connection: ConnectionHandle,
    ) -> Option<(UserId, Vec<Outbound>)> {
        let user_id = self.users.register(addr, connection)?;
        let greeting = Outbound::new(
            user_id.clone(),
            ServerMessage::UserId {
                user_id: user_id.clone(),
            },
        );
        Some((user_id, vec![greeting]))
    }

    /// Decodes a raw text frame and applies it. Malformed frames are dropped.
    pub fn on_text(&mut self, user_id: &str, text: &str) -> Vec<Outbound> {
        match decode_client_message(text) {
            Ok(message) => self.on_message(user_id, message),
            Err(e) => {
                warn!("Dropping frame from {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    pub fn on_message(&mut self, user_id: &str, message: ClientMessage) -> Vec<Outbound> {
        match message {
            ClientMessage::JoinRoom { room_id, position } => {
                self.on_join_room(user_id, &room_id, position)
            }
            ClientMessage::LeaveRoom => self.on_leave_room(user_id),
            ClientMessage::RefreshDistances { position } => {
                self.on_refresh_distances(user_id, position)
            }
            ClientMessage::Unknown => {
                debug!("Ignoring unknown message type from {}", user_id);
                Vec::new()
            }
        }
    }

    pub fn on_join_room(&mut self, user_id: &str, room_id: &str, position: WirePosition) -> Vec<Outbound> {
        match self.users.get_mut(user_id) {
            Some(user) => user.track.record(position.into_sample(now_millis())),
            None => return Vec::new(),
        }
        self.rooms.join(&mut self.users, user_id, room_id)
    }

    pub fn on_leave_room(&mut self, user_id: &str) -> Vec<Outbound> {
        self.rooms.leave(&mut self.users, user_id)
    }

    /// Records the new position and pairs the user with every room peer.
    ///
    /// Both sides of each pair receive the same distance, accuracy and
    /// reconciled timestamp, computed from each side's latest sample.
    pub fn on_refresh_distances(&mut self, user_id: &str, position: WirePosition) -> Vec<Outbound> {
        let room_id = match self.users.get(user_id).and_then(|u| u.current_room()) {
            Some(room_id) if self.rooms.contains_room(room_id) => room_id.to_string(),
            _ => return Vec::new(),
        };

        let own = match self.users.get_mut(user_id) {
            Some(user) => {
                user.track.record(position.into_sample(now_millis()));
                user.track.latest()
            }
            None => None,
        };
        let own = match own {
            Some(sample) => sample,
            None => return Vec::new(),
        };

        let mut peers: Vec<UserId> = self
            .rooms
            .members_of(&room_id)
            .into_iter()
            .filter(|id| id != user_id)
            .collect();
        peers.sort();

        let mut outbound = Vec::with_capacity(peers.len() * 2);
        for peer_id in peers {
            let peer = match self.users.get(&peer_id).and_then(|p| p.track.latest()) {
                Some(sample) => sample,
                None => continue,
            };

            let (distance, accuracy, timestamp) = pair_estimate(&own, &peer);
            if !distance.is_finite() || !accuracy.is_finite() {
                warn!("Skipping non-finite distance between {} and {}", user_id, peer_id);
                continue;
            }

            outbound.push(Outbound::new(
                user_id,
                ServerMessage::Distance {
                    distance,
                    user_id: peer_id.clone(),
                    accuracy,
                    timestamp,
                },
            ));
            outbound.push(Outbound::new(
                peer_id,
                ServerMessage::Distance {
                    distance,
                    user_id: user_id.to_string(),
                    accuracy,
                    timestamp,
                },
            ));
        }

        outbound
    }

    /// Same side effects as an explicit leave, then deregistration
    pub fn on_disconnect(&mut self, user_id: &str) -> Vec<Outbound> {
        self.users.unregister(user_id, &mut self.rooms)
    }

    /// Delivers messages to their recipients' connections.
    ///
    /// A failed or unknown recipient never stops delivery to the rest.
    /// Returns how many messages were queued successfully.
    pub fn dispatch(&self, outbound: Vec<Outbound>) -> usize {
        let mut delivered = 0;

        for Outbound { to, message } in outbound {
            match self.users.get(&to) {
                Some(user) => {
                    if user.send(message) {
                        delivered += 1;
                    } else {
                        warn!("Failed to deliver message to {}", to);
                    }
                }
                None => debug!("Recipient {} is gone, dropping message", to),
            }
        }

        delivered
    }

    pub fn state_of(&self, user_id: &str) -> ConnectionState {
        match self.users.get(user_id) {
            Some(user) => match user.current_room() {
                Some(room_id) => ConnectionState::InRoom(room_id.to_string()),
                None => ConnectionState::Connected,
            },
            None => ConnectionState::Closed,
        }
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }
}

/// Distance in kilometers, combined accuracy in meters and the reconciled
/// (earlier) timestamp of two samples
fn pair_estimate(a: &PositionSample, b: &PositionSample) -> (f64, f64, u64) {
    let distance_km = haversine_distance(a, b) / 1000.0;
    let accuracy = combined_accuracy(a, b);
    let timestamp = a.captured_at.min(b.captured_at);
    (distance_km, accuracy, timestamp)
}
