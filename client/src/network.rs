use crate::board::{BoardChange, DistanceBoard};
use crate::walker::Walker;
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use shared::{decode_server_message, encode, ClientMessage};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the proximity server
    pub server_url: String,
    pub room_id: String,
    pub refresh_interval: Duration,
}

pub struct Client {
    config: ClientConfig,
    board: DistanceBoard,
    walker: Walker,
    joined: bool,
}

impl Client {
    pub fn new(config: ClientConfig, walker: Walker) -> Self {
        Client {
            config,
            board: DistanceBoard::new(),
            walker,
            joined: false,
        }
    }

    pub fn board(&self) -> &DistanceBoard {
        &self.board
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Applies one text frame from the server to the board
    pub fn handle_text(&mut self, text: &str) -> BoardChange {
        match decode_server_message(text) {
            Ok(message) => self.board.apply(message),
            Err(e) => {
                warn!("Ignoring frame from server: {}", e);
                BoardChange::Unchanged
            }
        }
    }

    /// The message to send on the next refresh tick: a join the first
    /// time, then position refreshes
    pub fn next_request(&mut self) -> ClientMessage {
        let position = self.walker.step();

        if self.joined {
            ClientMessage::RefreshDistances { position }
        } else {
            self.joined = true;
            ClientMessage::JoinRoom {
                room_id: self.config.room_id.clone(),
                position,
            }
        }
    }

    /// Leaving clears every peer from the board
    pub fn leave_request(&mut self) -> ClientMessage {
        self.joined = false;
        self.board.clear();
        ClientMessage::LeaveRoom
    }

    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        info!("Connecting to {}...", self.config.server_url);
        let (ws_stream, _) = connect_async(self.config.server_url.as_str()).await?;
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let mut refresh_interval = interval(self.config.refresh_interval);
        refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                frame = ws_read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.on_text(&text),
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("Server closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Error receiving frame: {}", e);
                            break;
                        }
                    }
                },

                _ = refresh_interval.tick() => {
                    let request = self.next_request();
                    ws_write.send(Message::Text(encode(&request)?)).await?;
                },

                _ = &mut shutdown => {
                    if self.joined {
                        let request = self.leave_request();
                        ws_write.send(Message::Text(encode(&request)?)).await?;
                    }
                    let _ = ws_write.close().await;
                    break;
                }
            }
        }

        Ok(())
    }

    fn on_text(&mut self, text: &str) {
        match self.handle_text(text) {
            BoardChange::Identified(user_id) => info!("Connected! User ID: {}", user_id),
            BoardChange::Updated(_) | BoardChange::Removed(_) => {
                info!("Distances in room {}:", self.config.room_id);
                for line in self.board.render() {
                    info!("  {}", line);
                }
            }
            BoardChange::Unchanged => {}
        }
    }
}
