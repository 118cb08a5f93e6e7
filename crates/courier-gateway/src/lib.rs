pub mod connection;
pub mod dispatcher;
pub mod push;
pub mod reaper;
pub mod sink;

pub use connection::{ConnectionState, Frame, LiveConnection, SendError, WsConnection};
pub use dispatcher::Dispatcher;
pub use push::{HttpPushGateway, PushGateway, PushNotifier, PushOutcome};
pub use sink::NotificationSink;

#[cfg(test)]
mod testing;
