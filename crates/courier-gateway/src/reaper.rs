use std::time::Duration;

use tracing::info;

use crate::dispatcher::Dispatcher;

/// Default pause between reaper sweeps.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// Background task that drops closed subscriber connections.
pub async fn run_reaper(dispatcher: Dispatcher, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let reaped = dispatcher.reap().await;
        if reaped > 0 {
            info!("Reaper: removed {} closed connection(s)", reaped);
        }
    }
}
