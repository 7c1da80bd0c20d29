//! Server network layer: WebSocket transport and the coordinator loop

use crate::session::{Outbound, SessionCoordinator};
use crate::user_registry::{ConnectionHandle, UserId};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{encode, ServerMessage, DEFAULT_MAX_HISTORY};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type ConnectionError = Box<dyn std::error::Error + Send + Sync>;

/// Events sent from connection tasks to the coordinator loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        addr: SocketAddr,
        connection: ConnectionHandle,
        reply: oneshot::Sender<Option<UserId>>,
    },
    TextReceived {
        user_id: UserId,
        text: String,
    },
    Disconnected {
        user_id: UserId,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Position samples retained per user
    pub max_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Accepts WebSocket connections and funnels every event through one coordinator
pub struct Server {
    listener: TcpListener,
    coordinator: SessionCoordinator,

    // Connection tasks -> coordinator
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            coordinator: SessionCoordinator::new(config.max_history),
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until `shutdown` completes.
    ///
    /// Accepting sockets and handling events share one task, so every state
    /// change is applied strictly one event at a time.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                },

                event = self.event_rx.recv() => {
                    // The server holds a sender, so the channel never closes here
                    if let Some(event) = event {
                        self.handle_event(event);
                    }
                },

                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, events).await {
                warn!("Connection from {} ended with error: {}", addr, e);
            }
        });
    }

    fn handle_event(&mut self, event: ServerEvent) {
        let outbound = match event {
            ServerEvent::Connected {
                addr,
                connection,
                reply,
            } => match self.coordinator.on_connect(addr, connection) {
                Some((user_id, outbound)) => {
                    if reply.send(Some(user_id.clone())).is_err() {
                        // Connection task vanished before learning its id
                        self.coordinator.on_disconnect(&user_id);
                        return;
                    }
                    outbound
                }
                None => {
                    warn!("Rejecting connection from {}: no free user ids", addr);
                    let _ = reply.send(None);
                    return;
                }
            },

            ServerEvent::TextReceived { user_id, text } => self.coordinator.on_text(&user_id, &text),

            ServerEvent::Disconnected { user_id } => self.coordinator.on_disconnect(&user_id),
        };

        self.deliver(outbound);
    }

    fn deliver(&self, outbound: Vec<Outbound>) {
        let total = outbound.len();
        let delivered = self.coordinator.dispatch(outbound);
        if delivered < total {
            debug!("Delivered {} of {} outbound messages", delivered, total);
        }
    }
}

/// Drives a single client socket for its whole lifetime.
///
/// Once registered, the connection always reports exactly one
/// `Disconnected` event, whatever the reason for closing.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), ConnectionError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (connection, mut outbox) = mpsc::unbounded_channel::<ServerMessage>();

    let (reply_tx, reply_rx) = oneshot::channel();
    events
        .send(ServerEvent::Connected {
            addr,
            connection,
            reply: reply_tx,
        })
        .map_err(|_| "coordinator is not running")?;

    let user_id = match reply_rx.await {
        Ok(Some(user_id)) => user_id,
        _ => {
            let _ = ws_write.send(Message::Close(None)).await;
            return Ok(());
        }
    };

    // Drains the user's outbox until the coordinator drops the handle
    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let text = match encode(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("{}", e);
                    continue;
                }
            };
            if ws_write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_write.close().await;
    });

    let mut result = Ok(());
    while let Some(frame) = ws_read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let event = ServerEvent::TextReceived {
                    user_id: user_id.clone(),
                    text,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
    }

    debug!("Connection for {} from {} closed", user_id, addr);
    let _ = events.send(ServerEvent::Disconnected { user_id });
    let _ = writer.await;

    result
}
