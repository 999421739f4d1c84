// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use cardscan_server::api::{router, API_PREFIX};
use cardscan_server::config::{LogFormat, Settings};
use cardscan_server::jwks_refresher::JwksRefresher;
use cardscan_server::state::AppState;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env();
    init_tracing(
        settings
            .as_ref()
            .map(|s| s.log_format)
            .unwrap_or(LogFormat::Pretty),
    );

    let settings = settings.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        tenant = %settings.tenant_id,
        algorithm = %settings.algorithm,
        issuer = %settings.issuer(),
        audience = %settings.audience(),
        clock_skew_secs = settings.clock_skew.as_secs(),
        extraction_enabled = settings.vision.is_some(),
        "Configuration loaded"
    );

    let state = AppState::from_settings(&settings)?;

    // Pre-warm the key cache; the first request refetches if this fails.
    match state.jwks.get(&state.tenant).await {
        Ok(keys) => info!(tenant = %state.tenant, keys = keys.len(), "JWKS loaded"),
        Err(e) => warn!(tenant = %state.tenant, error = %e, "Initial JWKS fetch failed"),
    }

    let shutdown = CancellationToken::new();
    let refresher = settings.refresh_interval.map(|interval| {
        let refresher = JwksRefresher::new(state.jwks.clone(), state.tenant.clone(), interval);
        tokio::spawn(refresher.run(shutdown.clone()))
    });

    let addr: SocketAddr = settings.bind_address().parse().map_err(|e| {
        error!(bind_address = %settings.bind_address(), "Invalid bind address: {}", e);
        e
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{addr} (docs at {API_PREFIX}/docs)");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = refresher {
        if let Err(e) = handle.await {
            warn!(error = %e, "JWKS refresher task failed");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown"),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
