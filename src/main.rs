use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use http_cache_proxy::origin::HttpOriginClient;
use http_cache_proxy::{backend, proxy, Config, ProxyState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let backend = backend::from_config(&config).await?;
    let origin = Arc::new(HttpOriginClient::new(config.connect_timeout)?);

    let bind_addr = config.bind_addr;
    let state = Arc::new(ProxyState {
        backend,
        origin,
        config,
    });
    let app = proxy::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "proxy listening");
    axum::serve(listener, app).await?;
    Ok(())
}
