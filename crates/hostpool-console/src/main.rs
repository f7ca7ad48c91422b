mod config;
mod monitor;

use std::sync::Arc;

use hostpool_api::ConsoleClient;
use hostpool_core::console::Console;
use hostpool_core::http::HttpBackend;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::monitor::spawn_prefetch;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let client = ConsoleClient::new(&config.api_url);
    tracing::info!(url = client.base_url(), "using console backend");
    let backend = Arc::new(HttpBackend::new(client));
    let mut console = Console::new(backend, config.settings.clone());

    let keys = console
        .load_pool_keys()
        .await
        .expect("failed to load pool keys")
        .to_vec();

    let focus = config.focus_pool.clone().or_else(|| keys.first().cloned());

    if let Some(key) = &focus {
        match console.open_pool(key).await {
            Ok(snapshot) => {
                tracing::info!(
                    pool = %key,
                    hosts = snapshot.host_count(),
                    usage = %snapshot.usage.ratio(),
                    percentage = snapshot.usage.percentage(),
                    "pool opened"
                );
                if let Ok(columns) = console.columns(key) {
                    for column in columns {
                        tracing::info!(
                            column = column.title,
                            aggregate = %column.subtitle,
                            hosts = column.rows().len(),
                            usage = %column.usage.ratio(),
                            "column"
                        );
                    }
                }
            }
            Err(e) => tracing::error!(pool = %key, error = %e, "failed to open pool"),
        }
    }

    // Background prefetch of every other pool
    let prefetch = spawn_prefetch(console.cache().clone(), keys, focus, config.prefetch_interval);

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    prefetch.abort();
    tracing::info!("shutting down");
}
