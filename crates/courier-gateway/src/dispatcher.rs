use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_types::events::NotificationEvent;

use crate::connection::LiveConnection;
use crate::sink::NotificationSink;

#[derive(Clone)]
struct Subscription {
    conn_id: Uuid,
    token: i64,
    connection: Arc<dyn LiveConnection>,
}

/// Registry of live subscriber connections, keyed by internal channel id.
///
/// The registry lock only guards map mutation and snapshots; sends and
/// closes always happen after it is released.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    channels: Mutex<HashMap<i64, Vec<Subscription>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to `channel` and returns its registry id.
    pub fn register(&self, channel: i64, token: i64, connection: Arc<dyn LiveConnection>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner
            .channels
            .lock()
            .entry(channel)
            .or_default()
            .push(Subscription { conn_id, token, connection });
        conn_id
    }

    /// Registers the connection and reads from it until the peer goes away.
    /// Inbound frames are ignored. The entry itself is left for the reaper.
    pub async fn subscribe(&self, channel: i64, token: i64, connection: Arc<dyn LiveConnection>) {
        let conn_id = self.register(channel, token, connection.clone());
        info!("Subscriber {conn_id} (token {token}) joined channel {channel}");

        while let Some(frame) = connection.recv().await {
            debug!("Subscriber {conn_id} sent {frame:?}, ignoring");
        }

        info!("Subscriber {conn_id} left channel {channel}");
    }

    /// Sends `payload` to every live subscriber of `channel` except those
    /// holding `author`. Returns the number of successful deliveries.
    pub async fn broadcast(&self, channel: i64, author: i64, payload: &str) -> usize {
        let targets: Vec<Subscription> = {
            let channels = self.inner.channels.lock();
            match channels.get(&channel) {
                Some(subs) => subs
                    .iter()
                    .filter(|s| s.token != author && s.connection.state().is_live())
                    .cloned()
                    .collect(),
                None => return 0,
            }
        };

        let results = join_all(targets.iter().map(|s| async move {
            (s.conn_id, s.connection.send(payload).await)
        }))
        .await;

        let mut delivered = 0;
        for (conn_id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Notification to subscriber {conn_id} on channel {channel} failed: {e}"),
            }
        }
        delivered
    }

    /// Drops every connection that is no longer open or connecting and
    /// closes it. Returns how many were removed.
    pub async fn reap(&self) -> usize {
        let dead: Vec<Subscription> = {
            let mut channels = self.inner.channels.lock();
            let mut dead = Vec::new();
            channels.retain(|_, subs| {
                let (live, gone): (Vec<_>, Vec<_>) =
                    std::mem::take(subs).into_iter().partition(|s| s.connection.state().is_live());
                *subs = live;
                dead.extend(gone);
                !subs.is_empty()
            });
            dead
        };

        join_all(dead.iter().map(|s| s.connection.close("connection closed"))).await;
        dead.len()
    }

    pub fn subscriber_count(&self, channel: i64) -> usize {
        self.inner.channels.lock().get(&channel).map_or(0, Vec::len)
    }
}

#[async_trait]
impl NotificationSink for Dispatcher {
    async fn notify(&self, source_token: i64, event: &NotificationEvent) {
        let delivered = self.broadcast(event.channel, source_token, &event.to_json()).await;
        debug!("Channel {} seq {} delivered to {delivered} subscriber(s)", event.channel, event.sequence);
    }
}
