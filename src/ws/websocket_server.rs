use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::protocol::protocol::{ClientMessage, ServerMessage};
use crate::provider::segment::SegmentProvider;
use crate::session::session::{SessionDefaults, create_outbound_channel, spawn_session};

pub async fn start_websocket_server(
    addr: SocketAddr,
    provider: Arc<SegmentProvider>,
    defaults: SessionDefaults,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, provider, defaults).await
}

pub async fn serve(
    listener: TcpListener,
    provider: Arc<SegmentProvider>,
    defaults: SessionDefaults,
) -> anyhow::Result<()> {
    info!("WebSocket server listening on: {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("New WebSocket connection from: {}", peer_addr);
                tokio::spawn(handle_connection(
                    stream,
                    peer_addr,
                    Arc::clone(&provider),
                    defaults.clone(),
                ));
            }
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    provider: Arc<SegmentProvider>,
    defaults: SessionDefaults,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed with {}: {}", peer_addr, e);
            return;
        }
    };

    debug!("WebSocket handshake completed with {}", peer_addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbox, mut replies) = create_outbound_channel();
    let (pong_tx, mut pongs) = mpsc::unbounded_channel::<Vec<u8>>();
    let (session, session_task) = spawn_session(provider, defaults, outbox.clone());

    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                reply = replies.recv() => match reply {
                    Some(reply) => match serde_json::to_string(&reply) {
                        Ok(json) => Message::Text(json),
                        Err(e) => {
                            error!("Failed to serialize reply: {}", e);
                            continue;
                        }
                    },
                    None => break,
                },
                Some(data) = pongs.recv() => Message::Pong(data),
            };
            if let Err(e) = ws_sender.send(frame).await {
                warn!("Failed to send WebSocket frame to {}: {}", peer_addr, e);
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if session.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse message from {}: {}", peer_addr, e);
                    let _ = outbox.send(ServerMessage::invalid_input(format!("Parse error: {}", e)));
                }
            },
            Ok(Message::Close(_)) => {
                info!("WebSocket connection closed by {}", peer_addr);
                break;
            }
            Ok(Message::Ping(data)) => {
                let _ = pong_tx.send(data);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error from {}: {}", peer_addr, e);
                break;
            }
        }
    }

    // Closing the client channel ends the session, which drops the last
    // outbound sender and lets the writer drain and exit.
    drop(session);
    drop(outbox);
    drop(pong_tx);
    let _ = session_task.await;
    let _ = writer.await;

    info!("WebSocket connection with {} terminated", peer_addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config::ScheduleConfig;
    use crate::provider::segment::fakes::provider;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;

    async fn start() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let defaults = SessionDefaults {
            language: "es-ES".to_string(),
            schedule: ScheduleConfig::new(30, 59).unwrap(),
        };
        tokio::spawn(serve(listener, Arc::new(provider(&["hello"])), defaults));
        addr
    }

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn scoring_over_websocket() {
        let addr = start().await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let request = json!({"type": "checkSimilarity", "original": "Hola", "spoken": "hola"});
        ws.send(Message::Text(request.to_string())).await.unwrap();

        let reply = next_json(&mut ws).await;
        assert_eq!(reply["type"], "similarity");
        assert_eq!(reply["similarity"], 100.0);
        assert_eq!(reply["grade"], "good");
    }

    #[tokio::test]
    async fn malformed_frames_get_an_error_reply() {
        let addr = start().await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        ws.send(Message::Text("{\"type\":\"rewind\"}".to_string())).await.unwrap();
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["kind"], "invalidInput");

        // The connection stays usable.
        let begin = json!({"type": "startSession", "videoId": "dQw4w9WgXcQ", "currentTime": 3.0});
        ws.send(Message::Text(begin.to_string())).await.unwrap();
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["type"], "scheduled");
        let delay = reply["delaySeconds"].as_u64().unwrap();
        assert!((30..=59).contains(&delay));
    }

    #[tokio::test]
    async fn pings_are_answered_with_matching_pongs() {
        let addr = start().await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        ws.send(Message::Ping(b"still there".to_vec())).await.unwrap();
        let pong = timeout(Duration::from_secs(5), async {
            loop {
                if let Message::Pong(data) = ws.next().await.unwrap().unwrap() {
                    return data;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(pong, b"still there".to_vec());
    }

    #[tokio::test]
    async fn close_frame_ends_the_connection() {
        let addr = start().await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let begin = json!({"type": "startSession", "videoId": "dQw4w9WgXcQ"});
        ws.send(Message::Text(begin.to_string())).await.unwrap();
        assert_eq!(next_json(&mut ws).await["type"], "scheduled");

        ws.send(Message::Close(None)).await.unwrap();
        let drained = timeout(Duration::from_secs(5), async {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;
        assert!(drained.is_ok(), "server kept the socket open after a close frame");
    }
}
