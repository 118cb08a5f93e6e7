use std::sync::Arc;

use courier_db::Database;
use courier_gateway::{Dispatcher, NotificationSink};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    /// Everything told about a new message: the dispatcher, plus push when configured.
    pub sinks: Vec<Arc<dyn NotificationSink>>,
    pub notification_text: String,
}
