use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Connections in these states stay registered.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Inbound frame. Subscribers never interpret these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

/// A persistent, bidirectional client connection.
#[async_trait]
pub trait LiveConnection: Send + Sync {
    fn state(&self) -> ConnectionState;

    async fn send(&self, text: &str) -> Result<(), SendError>;

    /// Next inbound frame, or `None` once the peer has gone away.
    async fn recv(&self) -> Option<Frame>;

    async fn close(&self, reason: &str);
}

/// [`LiveConnection`] over an upgraded axum WebSocket.
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    state: AtomicU8,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            state: AtomicU8::new(ConnectionState::Open as u8),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

#[async_trait]
impl LiveConnection for WsConnection {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    async fn send(&self, text: &str) -> Result<(), SendError> {
        if !self.state().is_live() {
            return Err(SendError::Closed);
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(text.to_owned().into())).await {
            self.set_state(ConnectionState::Closed);
            return Err(SendError::Transport(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&self) -> Option<Frame> {
        let mut stream = self.stream.lock().await;
        match stream.next().await {
            Some(Ok(Message::Text(text))) => Some(Frame::Text(text.to_string())),
            Some(Ok(Message::Binary(data))) => Some(Frame::Binary(data.to_vec())),
            Some(Ok(Message::Ping(_))) => Some(Frame::Ping),
            Some(Ok(Message::Pong(_))) => Some(Frame::Pong),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                self.set_state(ConnectionState::Closed);
                None
            }
        }
    }

    async fn close(&self, reason: &str) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.set_state(ConnectionState::Closing);
        let frame = CloseFrame { code: close_code::NORMAL, reason: reason.to_owned().into() };
        let mut sink = self.sink.lock().await;
        // Peer may already be gone
        let _ = sink.send(Message::Close(Some(frame))).await;
        let _ = sink.close().await;
        self.set_state(ConnectionState::Closed);
    }
}
