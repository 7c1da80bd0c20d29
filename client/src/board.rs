//! Per-peer distance board kept by the client

use log::debug;
use shared::ServerMessage;
use std::collections::BTreeMap;

/// Latest report for one peer
#[derive(Debug, Clone, PartialEq)]
pub struct PeerDistance {
    pub distance_m: f64,
    pub accuracy_m: f64,
    pub timestamp: u64,
}

/// What a server message did to the board
#[derive(Debug, Clone, PartialEq)]
pub enum BoardChange {
    Identified(String),
    Updated(String),
    Removed(String),
    Unchanged,
}

/// Distances to every peer in the current room, keyed by peer id
#[derive(Debug, Default)]
pub struct DistanceBoard {
    own_id: Option<String>,
    peers: BTreeMap<String, PeerDistance>,
}

impl DistanceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: ServerMessage) -> BoardChange {
        match message {
            ServerMessage::UserId { user_id } => {
                self.own_id = Some(user_id.clone());
                BoardChange::Identified(user_id)
            }
            ServerMessage::Distance {
                distance,
                user_id,
                accuracy,
                timestamp,
            } => {
                self.peers.insert(
                    user_id.clone(),
                    PeerDistance {
                        distance_m: distance * 1000.0,
                        accuracy_m: accuracy,
                        timestamp,
                    },
                );
                BoardChange::Updated(user_id)
            }
            ServerMessage::LeaveRoom { user_id } => match self.peers.remove(&user_id) {
                Some(_) => BoardChange::Removed(user_id),
                None => BoardChange::Unchanged,
            },
            ServerMessage::Unknown => {
                debug!("Ignoring unknown server message");
                BoardChange::Unchanged
            }
        }
    }

    /// Forgets every peer, e.g. after leaving the room
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn own_id(&self) -> Option<&str> {
        self.own_id.as_deref()
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerDistance> {
        self.peers.get(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// One line per peer, ordered by peer id
    pub fn render(&self) -> Vec<String> {
        self.peers
            .iter()
            .map(|(peer_id, entry)| {
                format!(
                    "{}: {:.1} m (±{:.1} m) @ {}",
                    peer_id, entry.distance_m, entry.accuracy_m, entry.timestamp
                )
            })
            .collect()
    }
}
