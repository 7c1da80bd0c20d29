//! Connected user tracking and identity assignment
//!
//! This module handles the server-side bookkeeping for every open connection:
//! - Identity generation with retry-on-collision
//! - The outbound connection handle used to deliver messages
//! - Each user's position history and current room
//!
//! Room membership itself lives in the room directory. A user's current room
//! can only be changed through `RoomDirectory::join`/`leave`, which keeps both
//! sides of the relationship consistent.

use crate::position_track::PositionTrack;
use crate::room_directory::RoomDirectory;
use crate::session::Outbound;
use log::{debug, info};
use rand::Rng;
use shared::ServerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

pub type UserId = String;
pub type RoomId = String;

/// Outbound half of a user's connection
pub type ConnectionHandle = mpsc::UnboundedSender<ServerMessage>;

/// Size of the numeric space user ids are drawn from
pub const DEFAULT_ID_SPACE: u32 = 1_000_000;

/// A connected user and their position state
#[derive(Debug)]
pub struct User {
    pub id: UserId,
    /// Remote address, kept for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    pub track: PositionTrack,
    current_room: Option<RoomId>,
    connection: ConnectionHandle,
}

impl User {
    pub fn new(id: UserId, addr: SocketAddr, connection: ConnectionHandle, max_history: usize) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            track: PositionTrack::new(max_history),
            current_room: None,
            connection,
        }
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub(crate) fn set_current_room(&mut self, room_id: RoomId) {
        self.current_room = Some(room_id);
    }

    pub(crate) fn take_current_room(&mut self) -> Option<RoomId> {
        self.current_room.take()
    }

    /// Queues a message on the user's connection.
    ///
    /// Returns false if the connection's writer has already gone away.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.connection.send(message).is_ok()
    }
}

/// Owns every connected user, keyed by their generated id
#[derive(Debug)]
pub struct UserRegistry {
    users: HashMap<UserId, User>,
    max_history: usize,
    id_space: u32,
}

impl UserRegistry {
    pub fn new(max_history: usize) -> Self {
        Self::with_id_space(max_history, DEFAULT_ID_SPACE)
    }

    /// Creates a registry drawing ids from `user0` .. `user{id_space - 1}`
    pub fn with_id_space(max_history: usize, id_space: u32) -> Self {
        Self {
            users: HashMap::new(),
            max_history,
            id_space: id_space.max(1),
        }
    }

    /// Registers a new connection and returns its freshly generated id.
    ///
    /// Returns None only when every id in the space is taken.
    pub fn register(&mut self, addr: SocketAddr, connection: ConnectionHandle) -> Option<UserId> {
        if self.users.len() >= self.id_space as usize {
            return None;
        }

        let mut rng = rand::thread_rng();
        let user_id = loop {
            let candidate = format!("user{}", rng.gen_range(0..self.id_space));
            if !self.users.contains_key(&candidate) {
                break candidate;
            }
            debug!("User id {} already taken, retrying", candidate);
        };

        let user = User::new(user_id.clone(), addr, connection, self.max_history);
        info!("User {} connected from {}", user_id, addr);
        self.users.insert(user_id.clone(), user);

        Some(user_id)
    }

    /// Removes a user, leaving their room first.
    ///
    /// Returns the notifications owed to the remaining room members. Unknown
    /// ids are a no-op.
    pub fn unregister(&mut self, user_id: &str, rooms: &mut RoomDirectory) -> Vec<Outbound> {
        let notifications = rooms.leave(self, user_id);

        if let Some(user) = self.users.remove(user_id) {
            info!(
                "User {} disconnected after {:.1}s",
                user.id,
                user.connected_at.elapsed().as_secs_f32()
            );
        }

        notifications
    }

    pub fn get(&self, user_id: &str) -> Option<&User> {
        self.users.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut User> {
        self.users.get_mut(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Returns the number of currently connected users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
