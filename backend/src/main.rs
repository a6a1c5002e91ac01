use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registrar::api::router;
use registrar::config::AppConfig;
use registrar::db;
use registrar::notify::{LogDispatcher, NotificationDispatcher, WebhookDispatcher};
use registrar::services::NotificationSweeper;
use registrar::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "registrar=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = db::connect(&config.database_url, config.max_connections, config.busy_timeout).await?;

    let dispatcher: Arc<dyn NotificationDispatcher> = match &config.webhook_url {
        Some(url) => {
            info!("delivering seat notices to {}", url);
            Arc::new(WebhookDispatcher::new(url.as_str())?)
        }
        None => {
            warn!("NOTIFY_WEBHOOK_URL not set, seat notices will only be logged");
            Arc::new(LogDispatcher)
        }
    };

    let state = AppState::new(pool, dispatcher, config.event_capacity, config.txn);

    if let Some(secs) = config.sweep_interval_secs {
        let sweeper = NotificationSweeper::new(state.enrollment.clone(), secs);
        tokio::spawn(sweeper.start());
    }

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
