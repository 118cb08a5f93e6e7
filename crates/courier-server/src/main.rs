mod config;
mod prune;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use courier_api::{AppState, AppStateInner};
use courier_db::Database;
use courier_gateway::{Dispatcher, HttpPushGateway, NotificationSink, PushNotifier, reaper};

use crate::config::Config;

const USAGE: &str = "usage: courier [create-account <name> <user> <password>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [] => serve(config).await,
        [cmd, name, user, password] if cmd == "create-account" => {
            let db = Database::open(&config.db_path, config.db.clone())?;
            let account = db.create_account(name, "Basic", &format!("{user}:{password}"))?;
            println!("{account}");
            Ok(())
        }
        _ => bail!(USAGE),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let db = Arc::new(Database::open(&config.db_path, config.db.clone())?);
    let dispatcher = Dispatcher::new();

    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(dispatcher.clone())];
    match (&config.push_endpoint, &config.push_key) {
        (Some(endpoint), Some(key)) => {
            info!("Push notifications enabled via {}", endpoint);
            let gateway = Arc::new(HttpPushGateway::new(endpoint.clone(), key.clone()));
            sinks.push(Arc::new(PushNotifier::new(db.clone(), gateway, config.notification_text.clone())));
        }
        _ => warn!("COURIER_PUSH_ENDPOINT/COURIER_PUSH_KEY not set, push notifications disabled"),
    }

    tokio::spawn(reaper::run_reaper(dispatcher.clone(), config.reaper_interval));
    tokio::spawn(prune::run_prune_loop(db.clone(), config.prune_interval));

    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher,
        sinks,
        notification_text: config.notification_text.clone(),
    });

    let app = courier_api::router(state, config.db.max_message_size)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Courier listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
