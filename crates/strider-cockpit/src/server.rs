//! [`CockpitServer`] – HTTP + WebSocket listener in front of a
//! [`RobotService`].
//!
//! Listens on `0.0.0.0:5000` (configurable via [`CockpitServer::with_port`]).
//!
//! * Regular HTTP requests → 200 OK with the status snapshot as JSON.
//! * WebSocket upgrades → frames handled by [`FrameHandler`], bus events
//!   streamed back as [`EventFrame`]s.

use std::net::SocketAddr;
use std::num::NonZeroU32;

use futures_util::{SinkExt, StreamExt};
use governor::{Quota, RateLimiter};
use strider_middleware::Topic;
use strider_runtime::RobotService;
use strider_types::{Event, StriderError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::frame::{EventFrame, FrameHandler};

pub const DEFAULT_PORT: u16 = 5000;

/// Upstream frames accepted per client per second.
pub const DEFAULT_RATE_LIMIT: u32 = 50;

/// Largest HTTP request head read before answering with the status.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

pub struct CockpitServer {
    service: RobotService,
    port: u16,
    rate_limit: NonZeroU32,
}

impl CockpitServer {
    pub fn new(service: RobotService) -> Self {
        Self {
            service,
            port: DEFAULT_PORT,
            rate_limit: NonZeroU32::new(DEFAULT_RATE_LIMIT).unwrap_or(NonZeroU32::MIN),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Frames per second per client; `0` is treated as `1`.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// [`StriderError::Transport`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), StriderError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StriderError::Transport(format!("bind error on {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StriderError> {
        let local = listener
            .local_addr()
            .map_err(|e| StriderError::Transport(e.to_string()))?;
        info!(%local, "cockpit listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let service = self.service.clone();
                    let rate_limit = self.rate_limit;
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, peer, service, rate_limit).await
                        {
                            warn!(%peer, %err, "client error");
                        }
                    });
                }
                Err(err) => warn!(%err, "accept error"),
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: RobotService,
    rate_limit: NonZeroU32,
) -> Result<(), StriderError> {
    // Peek leaves the request in the socket for the WebSocket handshake.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| StriderError::Transport(format!("peek error from {peer}: {e}")))?;

    let head = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();
    let is_ws_upgrade = head
        .lines()
        .any(|line| line.starts_with("upgrade:") && line.contains("websocket"));

    if is_ws_upgrade {
        handle_ws(stream, peer, service, rate_limit).await
    } else {
        serve_status(stream, &service).await
    }
}

/// Consume the request head so closing the socket sends FIN rather than
/// RST over unread bytes.  Request bodies are not expected.
async fn read_request_head(stream: &mut TcpStream) -> Result<(), StriderError> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| StriderError::Transport(format!("HTTP read error: {e}")))?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.len() > MAX_REQUEST_HEAD {
            return Err(StriderError::Transport(
                "HTTP request head too large".to_string(),
            ));
        }
    }
    Ok(())
}

async fn serve_status(mut stream: TcpStream, service: &RobotService) -> Result<(), StriderError> {
    read_request_head(&mut stream).await?;
    let body = serde_json::to_string(&service.status())
        .map_err(|e| StriderError::Transport(format!("status encode error: {e}")))?;
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| StriderError::Transport(format!("HTTP write error: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| StriderError::Transport(format!("HTTP shutdown error: {e}")))
}

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    service: RobotService,
    rate_limit: NonZeroU32,
) -> Result<(), StriderError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| StriderError::Transport(format!("WS handshake from {peer}: {e}")))?;
    info!(%peer, "cockpit client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let bus = service.bus().clone();
    let [mut telemetry, mut commands, mut alerts] = Topic::ALL.map(|t| bus.subscribe_to(t));
    let handler = FrameHandler::new(service, RateLimiter::direct(Quota::per_second(rate_limit)));

    loop {
        let outgoing = tokio::select! {
            event = telemetry.recv() => downstream(Topic::Telemetry, event, peer),
            event = commands.recv() => downstream(Topic::HardwareCommands, event, peer),
            event = alerts.recv() => downstream(Topic::SystemAlerts, event, peer),
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let reply = handler.handle(text.as_str()).await;
                    serde_json::to_string(&reply).ok()
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => None,
            },
        };
        if let Some(json) = outgoing {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    }

    info!(%peer, "cockpit client disconnected");
    Ok(())
}

fn downstream(topic: Topic, event: Result<Event, RecvError>, peer: SocketAddr) -> Option<String> {
    match event {
        Ok(event) => serde_json::to_string(&EventFrame::new(topic, &event)).ok(),
        Err(RecvError::Lagged(n)) => {
            debug!(%peer, topic = topic.as_str(), skipped = n, "client lagging");
            None
        }
        // The service owns the bus; it outlives every connection.
        Err(RecvError::Closed) => None,
    }
}
