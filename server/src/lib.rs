//! # Proximity Server Library
//!
//! This library provides the realtime room server for the proximity service.
//! Clients hold a WebSocket open, join a named room, periodically report a
//! geolocation sample, and receive pairwise distance estimates to every other
//! member of the same room.
//!
//! ## Core Responsibilities
//!
//! ### Identity and Membership
//! Every accepted connection is assigned a unique user id. Users move between
//! rooms with `joinRoom`/`leaveRoom`; a user belongs to at most one room, and
//! rooms exist only while they have members.
//!
//! ### Position History
//! Each user keeps a bounded, time-ordered history of recent samples. The
//! history can answer "where was this user at time t" by interpolating between
//! the two samples bracketing t.
//!
//! ### Distance Reports
//! On every `refreshDistances` the reporting user is paired with each room
//! peer. Both sides receive the same great-circle distance, the combined
//! accuracy of the two samples, and a reconciled timestamp (the earlier of the
//! two latest sample times).
//!
//! ## Architecture Design
//!
//! ### Single Coordinator
//! All user and room state is owned by one `SessionCoordinator`, which lives
//! on a single task and processes one event at a time. Connection tasks never
//! touch shared state; they forward events over a channel and drain their own
//! outbox. No locks are needed around the registry or the room directory.
//!
//! ### Best-Effort Delivery
//! Outbound messages are queued per connection without waiting for
//! acknowledgment. A dead peer never stalls or aborts delivery to the others;
//! it is cleaned up when its own disconnect event arrives.
//!
//! ## Module Organization
//!
//! - `position_track`: bounded history with interpolated lookup
//! - `user_registry`: identity generation and per-user state
//! - `room_directory`: join/leave and room cleanup
//! - `session`: the protocol state machine and outbound dispatch
//! - `network`: WebSocket accept loop and per-connection tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("0.0.0.0:10002", ServerConfig::default()).await?;
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod position_track;
pub mod room_directory;
pub mod session;
pub mod user_registry;
