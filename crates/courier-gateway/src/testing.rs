use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::connection::{ConnectionState, Frame, LiveConnection, SendError};

/// In-memory connection that records what it was sent.
pub struct MockConnection {
    state: Mutex<ConnectionState>,
    sent: Mutex<Vec<String>>,
    fail_sends: bool,
    closes: Mutex<usize>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl MockConnection {
    fn build(fail_sends: bool) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            state: Mutex::new(ConnectionState::Open),
            sent: Mutex::new(Vec::new()),
            fail_sends,
            closes: Mutex::new(0),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: tokio::sync::Mutex::new(rx),
        })
    }

    pub fn open() -> Arc<Self> {
        Self::build(false)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(true)
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        *self.closes.lock()
    }

    pub fn push_inbound(&self, frame: Frame) {
        if let Some(tx) = self.inbound_tx.lock().as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Simulates the peer disconnecting.
    pub fn hang_up(&self) {
        self.inbound_tx.lock().take();
    }
}

#[async_trait]
impl LiveConnection for MockConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn send(&self, text: &str) -> Result<(), SendError> {
        if self.fail_sends {
            return Err(SendError::Transport("broken pipe".into()));
        }
        if !self.state().is_live() {
            return Err(SendError::Closed);
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn recv(&self) -> Option<Frame> {
        let frame = self.inbound_rx.lock().await.recv().await;
        if frame.is_none() {
            self.set_state(ConnectionState::Closed);
        }
        frame
    }

    async fn close(&self, _reason: &str) {
        *self.closes.lock() += 1;
        self.set_state(ConnectionState::Closed);
    }
}
