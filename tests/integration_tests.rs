//! Integration tests for the proximity server and client
//!
//! These tests run a real server on a loopback port and talk to it over
//! WebSockets, the way browsers and the terminal client do.

use assert_approx_eq::assert_approx_eq;
use client::board::DistanceBoard;
use client::network::{Client, ClientConfig};
use client::walker::Walker;
use futures_util::{SinkExt, StreamExt};
use server::network::{Server, ServerConfig};
use shared::{decode_server_message, encode, ClientMessage, ServerMessage, WirePosition};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SETTLE: Duration = Duration::from_millis(100);

/// SERVER PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Every connection is greeted with its own id
    #[tokio::test]
    async fn connections_get_distinct_ids() {
        let (url, _stop) = start_server().await;
        let (_a, alice) = connect(&url).await;
        let (_b, bob) = connect(&url).await;

        assert!(alice.starts_with("user"));
        assert!(bob.starts_with("user"));
        assert_ne!(alice, bob);
    }

    /// A refresh reaches both parties with identical figures
    #[tokio::test]
    async fn refresh_reports_distance_to_both_parties() {
        let (url, _stop) = start_server().await;
        let (mut a, alice) = connect(&url).await;
        let (mut b, bob) = connect(&url).await;

        send(&mut a, &join("park", position(0.0, 0.0, 3.0, 1000))).await;
        send(&mut b, &join("park", position(0.0, 1.0, 4.0, 1200))).await;
        sleep(SETTLE).await;

        send(&mut a, &refresh(position(0.0, 0.0, 3.0, 2000))).await;

        let to_alice = recv(&mut a).await;
        let to_bob = recv(&mut b).await;

        match (to_alice, to_bob) {
            (
                ServerMessage::Distance {
                    distance: d1,
                    user_id: peer1,
                    accuracy: a1,
                    timestamp: t1,
                },
                ServerMessage::Distance {
                    distance: d2,
                    user_id: peer2,
                    accuracy: a2,
                    timestamp: t2,
                },
            ) => {
                assert_eq!(peer1, bob);
                assert_eq!(peer2, alice);
                assert_eq!(d1, d2);
                assert_eq!(a1, a2);
                assert_eq!(t1, t2);
                assert_approx_eq!(d1, 111.19, 0.1);
                assert_eq!(a1, 5.0);
                assert_eq!(t1, 1200);
            }
            other => panic!("Expected distance messages, got {:?}", other),
        }
    }

    /// One refresh in a room of three touches both pairs it belongs to
    #[tokio::test]
    async fn refresh_in_room_of_three() {
        let (url, _stop) = start_server().await;
        let mut sockets = Vec::new();
        for i in 0..3 {
            let (mut ws, id) = connect(&url).await;
            send(&mut ws, &join("trio", position(0.0, i as f64 * 0.001, 5.0, 100))).await;
            sockets.push((ws, id));
        }
        sleep(SETTLE).await;

        let refresher = sockets[0].1.clone();
        send(&mut sockets[0].0, &refresh(position(0.0, 0.0, 5.0, 200))).await;

        let mut peers_seen = vec![
            distance_peer(recv(&mut sockets[0].0).await),
            distance_peer(recv(&mut sockets[0].0).await),
        ];
        peers_seen.sort();
        let mut expected = vec![sockets[1].1.clone(), sockets[2].1.clone()];
        expected.sort();
        assert_eq!(peers_seen, expected);

        for (ws, _) in sockets.iter_mut().skip(1) {
            assert_eq!(distance_peer(recv(ws).await), refresher);
            expect_silence(ws).await;
        }
    }

    /// Leaving notifies every remaining member exactly once
    #[tokio::test]
    async fn leave_notifies_remaining_members() {
        let (url, _stop) = start_server().await;
        let (mut a, alice) = connect(&url).await;
        let (mut b, _bob) = connect(&url).await;
        let (mut c, _carol) = connect(&url).await;

        for ws in [&mut a, &mut b, &mut c] {
            send(ws, &join("park", position(1.0, 1.0, 1.0, 1))).await;
        }
        sleep(SETTLE).await;

        send(&mut a, &ClientMessage::LeaveRoom).await;

        for ws in [&mut b, &mut c] {
            assert_eq!(
                recv(ws).await,
                ServerMessage::LeaveRoom {
                    user_id: alice.clone()
                }
            );
            expect_silence(ws).await;
        }
        expect_silence(&mut a).await;
    }

    /// A dropped socket looks like an explicit leave to the rest of the room
    #[tokio::test]
    async fn disconnect_mid_room_notifies_members() {
        let (url, _stop) = start_server().await;
        let (mut a, alice) = connect(&url).await;
        let (mut b, _bob) = connect(&url).await;

        send(&mut a, &join("park", position(1.0, 1.0, 1.0, 1))).await;
        send(&mut b, &join("park", position(1.0, 1.0, 1.0, 1))).await;
        sleep(SETTLE).await;

        a.close(None).await.unwrap();
        drop(a);

        assert_eq!(recv(&mut b).await, ServerMessage::LeaveRoom { user_id: alice });
    }

    /// Switching rooms is an implicit leave of the old one
    #[tokio::test]
    async fn switching_rooms_notifies_old_room() {
        let (url, _stop) = start_server().await;
        let (mut a, alice) = connect(&url).await;
        let (mut b, _bob) = connect(&url).await;

        send(&mut a, &join("a", position(1.0, 1.0, 1.0, 1))).await;
        send(&mut b, &join("a", position(1.0, 1.0, 1.0, 1))).await;
        sleep(SETTLE).await;

        send(&mut a, &join("b", position(1.0, 1.0, 1.0, 2))).await;
        assert_eq!(
            recv(&mut b).await,
            ServerMessage::LeaveRoom {
                user_id: alice.clone()
            }
        );

        // Bob is alone in room a now, so his refresh reaches nobody
        send(&mut b, &refresh(position(1.0, 1.0, 1.0, 3))).await;
        expect_silence(&mut a).await;
        expect_silence(&mut b).await;
    }

    /// Malformed frames are dropped without closing the connection
    #[tokio::test]
    async fn malformed_frames_keep_connection_open() {
        let (url, _stop) = start_server().await;
        let (mut a, _alice) = connect(&url).await;
        let (mut b, bob) = connect(&url).await;

        for garbage in ["{not json", r#"{"type":"joinRoom"}"#, r#"{"type":"teleport"}"#, ""] {
            a.send(Message::Text(garbage.to_string())).await.unwrap();
        }
        a.send(Message::Binary(vec![0xFF, 0x00])).await.unwrap();

        send(&mut a, &join("park", position(0.0, 0.0, 0.0, 1))).await;
        send(&mut b, &join("park", position(0.0, 0.0, 0.0, 1))).await;
        sleep(SETTLE).await;
        send(&mut a, &refresh(position(0.0, 0.0, 0.0, 2))).await;

        assert_eq!(distance_peer(recv(&mut a).await), bob);
    }

    /// Refreshing before joining a room produces nothing
    #[tokio::test]
    async fn refresh_before_join_is_ignored() {
        let (url, _stop) = start_server().await;
        let (mut a, _alice) = connect(&url).await;
        let (mut b, _bob) = connect(&url).await;

        send(&mut b, &join("park", position(0.0, 0.0, 0.0, 1))).await;
        sleep(SETTLE).await;
        send(&mut a, &refresh(position(0.0, 0.0, 0.0, 2))).await;

        expect_silence(&mut a).await;
        expect_silence(&mut b).await;
    }

    /// Browser clients only send coordinates; the server fills in the rest
    #[tokio::test]
    async fn coordinates_only_positions_are_accepted() {
        let (url, _stop) = start_server().await;
        let (mut a, _alice) = connect(&url).await;
        let (mut b, _bob) = connect(&url).await;

        let browser_join = r#"{"type":"joinRoom","roomId":"web","position":{"latitude":0,"longitude":0}}"#;
        a.send(Message::Text(browser_join.to_string())).await.unwrap();
        b.send(Message::Text(browser_join.to_string())).await.unwrap();
        sleep(SETTLE).await;

        let browser_refresh = r#"{"type":"refreshDistances","position":{"latitude":0,"longitude":0.01}}"#;
        a.send(Message::Text(browser_refresh.to_string())).await.unwrap();

        match recv(&mut a).await {
            ServerMessage::Distance {
                distance,
                accuracy,
                timestamp,
                ..
            } => {
                assert_approx_eq!(distance, 1.112, 0.01);
                assert_eq!(accuracy, 0.0);
                assert!(timestamp > 0);
            }
            other => panic!("Expected distance, got {:?}", other),
        }
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod client_server_tests {
    use super::*;

    /// The terminal client joins, refreshes, and leaves on shutdown
    #[tokio::test]
    async fn terminal_client_round_trip() {
        let (url, _stop) = start_server().await;
        let (mut observer, observer_id) = connect(&url).await;
        send(&mut observer, &join("park", position(0.0, 0.0, 2.0, 1))).await;
        sleep(SETTLE).await;

        let config = ClientConfig {
            server_url: url.clone(),
            room_id: "park".to_string(),
            refresh_interval: Duration::from_millis(50),
        };
        let client = Client::new(config, Walker::with_seed(0.0, 0.01, 2.0, 0.0, 9));
        let (quit_tx, quit_rx) = oneshot::channel::<()>();
        let client_task = tokio::spawn(async move {
            client
                .run_until(async move {
                    let _ = quit_rx.await;
                })
                .await
                .is_ok()
        });

        // The first tick joins, the second refreshes and reaches the observer
        let client_id = distance_peer(recv(&mut observer).await);
        assert_ne!(client_id, observer_id);

        quit_tx.send(()).unwrap();
        assert!(timeout(RECV_TIMEOUT, client_task).await.unwrap().unwrap());

        // Drain any refreshes still in flight, then expect the leave notice
        loop {
            match recv(&mut observer).await {
                ServerMessage::Distance { .. } => continue,
                ServerMessage::LeaveRoom { user_id } => {
                    assert_eq!(user_id, client_id);
                    break;
                }
                other => panic!("Unexpected message {:?}", other),
            }
        }
    }

    /// Server output drives the client board the same way the browser list works
    #[tokio::test]
    async fn board_follows_server_messages() {
        let (url, _stop) = start_server().await;
        let (mut a, alice) = connect(&url).await;
        let (mut b, bob) = connect(&url).await;
        let mut board = DistanceBoard::new();
        board.apply(ServerMessage::UserId {
            user_id: alice.clone(),
        });

        send(&mut a, &join("park", position(0.0, 0.0, 3.0, 1))).await;
        send(&mut b, &join("park", position(0.0, 0.001, 4.0, 1))).await;
        sleep(SETTLE).await;
        send(&mut a, &refresh(position(0.0, 0.0, 3.0, 2))).await;

        board.apply(recv(&mut a).await);
        let entry = board.get(&bob).unwrap();
        assert_approx_eq!(entry.distance_m, 111.19, 0.5);
        assert_eq!(entry.accuracy_m, 5.0);

        send(&mut b, &ClientMessage::LeaveRoom).await;
        board.apply(recv(&mut a).await);
        assert!(board.is_empty());
        assert_eq!(board.own_id(), Some(alice.as_str()));
    }
}

// HELPER FUNCTIONS

async fn start_server() -> (String, oneshot::Sender<()>) {
    let server = Server::new("127.0.0.1:0", ServerConfig::default())
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().expect("Failed to read local address");
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let _ = server
            .run_until(async move {
                let _ = stop_rx.await;
            })
            .await;
    });

    (format!("ws://{}", addr), stop_tx)
}

async fn connect(url: &str) -> (Ws, String) {
    let (mut ws, _) = connect_async(url).await.expect("Failed to connect");
    match recv(&mut ws).await {
        ServerMessage::UserId { user_id } => (ws, user_id),
        other => panic!("Expected userId greeting, got {:?}", other),
    }
}

async fn send(ws: &mut Ws, message: &ClientMessage) {
    let text = encode(message).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for a server message")
            .expect("Connection closed")
            .expect("WebSocket error");

        if let Message::Text(text) = frame {
            return decode_server_message(&text).unwrap();
        }
    }
}

async fn expect_silence(ws: &mut Ws) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(SETTLE * 2, ws.next()).await {
        panic!("Expected no message, got {}", text);
    }
}

fn distance_peer(message: ServerMessage) -> String {
    match message {
        ServerMessage::Distance { user_id, .. } => user_id,
        other => panic!("Expected distance, got {:?}", other),
    }
}

fn position(latitude: f64, longitude: f64, accuracy: f64, timestamp: u64) -> WirePosition {
    WirePosition {
        latitude,
        longitude,
        accuracy,
        timestamp: Some(timestamp),
    }
}

fn join(room_id: &str, position: WirePosition) -> ClientMessage {
    ClientMessage::JoinRoom {
        room_id: room_id.to_string(),
        position,
    }
}

fn refresh(position: WirePosition) -> ClientMessage {
    ClientMessage::RefreshDistances { position }
}
