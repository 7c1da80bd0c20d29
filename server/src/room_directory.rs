//! Room membership management
//!
//! Rooms are created lazily on first join and dropped as soon as their last
//! member leaves. Membership and `User::current_room` are only ever changed
//! together, inside `join` and `leave`.

use crate::session::Outbound;
use crate::user_registry::{RoomId, UserId, UserRegistry};
use log::{debug, info, warn};
use shared::ServerMessage;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<RoomId, HashSet<UserId>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a user into `room_id`, leaving any other room first.
    ///
    /// Returns the leave notifications for the previous room's remaining
    /// members. Unknown users are ignored.
    pub fn join(&mut self, users: &mut UserRegistry, user_id: &str, room_id: &str) -> Vec<Outbound> {
        let previous_room = match users.get(user_id) {
            Some(user) => user.current_room().map(str::to_string),
            None => {
                debug!("Join for unknown user {} ignored", user_id);
                return Vec::new();
            }
        };

        let notifications = match previous_room.as_deref() {
            Some(current) if current != room_id => self.leave(users, user_id),
            _ => Vec::new(),
        };

        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());

        if let Some(user) = users.get_mut(user_id) {
            user.set_current_room(room_id.to_string());
        }

        info!("User {} joined room {}", user_id, room_id);
        notifications
    }

    /// Removes a user from their current room.
    ///
    /// Every remaining member gets a `leaveRoom` notification naming the
    /// departed user. An emptied room is deleted.
    pub fn leave(&mut self, users: &mut UserRegistry, user_id: &str) -> Vec<Outbound> {
        let room_id = match users.get_mut(user_id).and_then(|user| user.take_current_room()) {
            Some(room_id) => room_id,
            None => return Vec::new(),
        };

        let mut notifications = Vec::new();

        match self.rooms.get_mut(&room_id) {
            Some(members) => {
                members.remove(user_id);

                let mut remaining: Vec<&UserId> = members.iter().collect();
                remaining.sort();
                for member in remaining {
                    notifications.push(Outbound {
                        to: member.clone(),
                        message: ServerMessage::LeaveRoom {
                            user_id: user_id.to_string(),
                        },
                    });
                }

                if members.is_empty() {
                    self.rooms.remove(&room_id);
                    debug!("Room {} is empty and was removed", room_id);
                }
            }
            None => warn!("User {} referenced missing room {}", user_id, room_id),
        }

        info!("User {} left room {}", user_id, room_id);
        notifications
    }

    /// Returns the members of a room, or an empty set if it doesn't exist
    pub fn members_of(&self, room_id: &str) -> HashSet<UserId> {
        self.rooms.get(room_id).cloned().unwrap_or_default()
    }

    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Returns the number of live rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
