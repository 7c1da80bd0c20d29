//! # Proximity Client Library
//!
//! A headless client for the proximity server. It speaks the same JSON
//! protocol as the browser front end: it joins a room, reports its position
//! on a fixed interval, and keeps a board of distances to every other member
//! of the room.
//!
//! ## Module Organization
//!
//! ### Board Module (`board`)
//! Holds the latest distance report per peer. `distance` messages upsert a
//! row, `leaveRoom` messages remove one, and leaving the room locally clears
//! the whole board.
//!
//! ### Walker Module (`walker`)
//! Stands in for a device's geolocation API. It reports a fixed position or,
//! with jitter enabled, a random walk around the starting point.
//!
//! ### Network Module (`network`)
//! Owns the WebSocket connection. The first refresh tick sends `joinRoom`,
//! later ticks send `refreshDistances`, and shutdown sends `leaveRoom` before
//! closing.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use client::walker::Walker;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         server_url: "ws://127.0.0.1:10002".to_string(),
//!         room_id: "park".to_string(),
//!         refresh_interval: Duration::from_secs(2),
//!     };
//!     let walker = Walker::new(48.8584, 2.2945, 10.0, 5.0);
//!
//!     Client::new(config, walker)
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod board;
pub mod network;
pub mod walker;
