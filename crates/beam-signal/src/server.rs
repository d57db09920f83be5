//! WebSocket front end for the coordination service
//!
//! One task per connection reads client events; a companion writer task
//! drains the connection's event queue onto the socket. Plain HTTP GETs on
//! the same port answer health checks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info};

use beam_core::config::SignalConfig;

use crate::handler::handle_event;
use crate::messages::{ClientEvent, ErrorCode, ServerEvent};
use crate::registry::{ChannelId, PeerChannel, Registry};

/// Coordination service state
pub struct SignalServer {
    registry: Arc<Registry>,
    sweep_interval: Duration,
}

impl SignalServer {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new(Duration::from_secs(config.room_idle_secs))),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
        }
    }

    /// The registry behind this server (for monitoring and tests)
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Bind and run forever
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Coordination service listening on {}", addr);
        self.serve_listener(listener).await
    }

    /// Run on an already-bound listener
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), std::io::Error> {
        // Idle-room sweep
        let registry = self.registry.clone();
        let sweep_interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                let cleared = registry.expire_idle();
                if !cleared.is_empty() {
                    debug!(count = cleared.len(), "idle sweep cleared rooms");
                }
            }
        });

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let registry = self.registry.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, registry).await {
                    debug!("Connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<Registry>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Peek at the request head: a GET without an upgrade header is a plain
    // HTTP health check, everything else goes through the WebSocket handshake
    let mut peek_buf = [0u8; 1024];
    let n = stream.peek(&mut peek_buf).await?;
    let head = String::from_utf8_lossy(&peek_buf[..n]).to_ascii_lowercase();
    if head.starts_with("get ") && !head.contains("upgrade:") {
        return handle_http_request(&mut stream, &registry).await;
    }

    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let channel = PeerChannel::new(ChannelId::generate(), tx);
    debug!(addr = %peer_addr, channel = %channel.id(), "client connected");

    // Writer task: everything the registry enqueues goes out here
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    debug!("failed to encode event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error: {:?}", e);
                break;
            }
        };

        match ClientEvent::from_json(&text) {
            Ok(event) => handle_event(&registry, &channel, event),
            Err(e) => channel.send(ServerEvent::error(
                ErrorCode::InvalidRequest,
                format!("invalid JSON: {}", e),
            )),
        }
    }

    // Transport closure counts as departure
    registry.disconnect(channel.id());
    drop(channel);
    let _ = writer.await;

    debug!(addr = %peer_addr, "connection closed");
    Ok(())
}

/// Handle an HTTP request (for health checks)
async fn handle_http_request(
    stream: &mut TcpStream,
    registry: &Registry,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, content_type, body) = match path {
        "/" => (
            "200 OK",
            "text/plain",
            "Beam coordination service is running\n".to_string(),
        ),
        "/health" => (
            "200 OK",
            "application/json",
            format!(
                r#"{{"status":"healthy","rooms":{},"peers":{}}}"#,
                registry.room_count(),
                registry.peer_count()
            ),
        ),
        "/stats" => (
            "200 OK",
            "application/json",
            format!(
                r#"{{"rooms":{},"peers":{}}}"#,
                registry.room_count(),
                registry.peer_count()
            ),
        ),
        _ => (
            "404 Not Found",
            "application/json",
            r#"{"error":"not found"}"#.to_string(),
        ),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    fn server() -> SignalServer {
        SignalServer::new(&SignalConfig::default())
    }

    #[test]
    fn test_server_creation() {
        let server = server();
        assert_eq!(server.registry().room_count(), 0);
        assert_eq!(server.registry().peer_count(), 0);
    }

    async fn spawn_server() -> (SocketAddr, Arc<Registry>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = server();
        let registry = server.registry().clone();
        tokio::spawn(async move {
            let _ = server.serve_listener(listener).await;
        });
        (addr, registry)
    }

    #[tokio::test]
    async fn test_websocket_session_end_to_end() {
        let (addr, registry) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"create_room","room_id":"r1","peer_id":"p1"}"#.into(),
        ))
        .await
        .unwrap();

        let mut got_created = false;
        let mut got_nickname = false;
        let mut got_snapshot = false;
        for _ in 0..3 {
            let msg = ws.next().await.unwrap().unwrap();
            let Message::Text(text) = msg else { continue };
            let event: serde_json::Value = serde_json::from_str(&text).unwrap();
            match event["type"].as_str().unwrap() {
                "room_created" => got_created = event["room_id"] == "r1",
                "nickname_assigned" => {
                    got_nickname = !event["nickname"].as_str().unwrap().is_empty()
                }
                "all_peers" => got_snapshot = event["peers"].as_array().unwrap().len() == 1,
                other => panic!("unexpected event: {other}"),
            }
        }
        assert!(got_created && got_nickname && got_snapshot);
        assert_eq!(registry.room_count(), 1);

        // Closing the socket is a disconnect: the room empties out and dies
        ws.close(None).await.unwrap();
        for _ in 0..100 {
            if registry.room_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_event() {
        let (addr, _registry) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text("{not json".into())).await.unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text frame")
        };
        let event: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["type"], "error");
        assert_eq!(event["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_http_health_endpoint() {
        let (addr, _registry) = spawn_server().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: beam\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains(r#""status":"healthy""#));
    }
}
