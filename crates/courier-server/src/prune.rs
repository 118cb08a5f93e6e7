use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use courier_db::Database;

/// Background task that physically removes expired messages on
/// auto-pruning channels.
pub async fn run_prune_loop(db: Arc<Database>, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.prune_messages()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Prune error: {}", e),
            Err(e) => error!("Prune task panicked: {}", e),
        }
    }
}
