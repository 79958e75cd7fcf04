use axum::Router;
use etag_layer::config::Config;
use etag_layer::metrics::{admin_router, MetricsState};
use etag_layer::{demo, Backends, EtagLayer, StoreWriter};
use etag_store::{resp, LocalStore, SharedStore};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = if Path::new("config.toml").exists() {
        match Config::load(Path::new("config.toml")) {
            Ok(c) => {
                tracing::info!("loaded config from config.toml");
                c
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load config.toml, using defaults");
                Config::default_config()
            }
        }
    } else {
        tracing::info!("no config.toml found, using defaults");
        Config::default_config()
    };

    let prom_handle = match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to install prometheus recorder");
            return;
        }
    };

    let shutdown = CancellationToken::new();
    let writer = StoreWriter::new();
    let mut backends = Backends::new();

    // The RESP server can expose the local store even when no route caches locally.
    let local = (config.local.enabled || config.resp.enabled)
        .then(|| Arc::new(LocalStore::new(config.local.default_ttl())));

    if let Some(store) = &local {
        store.spawn_sweeper(config.local.sweep_interval(), shutdown.clone());
        if config.local.enabled {
            backends = backends.with_local(store.clone());
        }
    }

    if config.shared.enabled {
        let shared = SharedStore::with_pool_size(
            config.shared.addr.clone(),
            config.shared.timeout(),
            config.shared.default_ttl(),
            config.shared.pool_size,
        );
        // Unreachable at startup is not fatal: lookups fail open until it comes back.
        match shared.ping().await {
            Ok(()) => tracing::info!(addr = %shared.addr(), "shared store reachable"),
            Err(e) => tracing::warn!(addr = %shared.addr(), error = %e, "shared store not reachable yet"),
        }
        backends = backends.with_shared(Arc::new(shared));
    }

    if config.resp.enabled {
        if let Some(store) = &local {
            let resp_addr = config.resp.listen_addr.clone();
            let resp_store = Arc::clone(store);
            let resp_shutdown = shutdown.clone();
            tokio::spawn(async move {
                resp::run_resp_server(&resp_addr, resp_store, resp_shutdown).await;
            });
        }
    }

    let app_router = demo::router(&config.policy, &backends, &writer)
        .layer(EtagLayer::new())
        .layer(TraceLayer::new_for_http());

    let metrics_router: Router = admin_router(MetricsState {
        local: local.clone(),
        prometheus: prom_handle,
    });

    let app_addr = config.server.listen_addr.clone();
    let metrics_addr = config.server.metrics_addr.clone();

    tracing::info!(
        app = %app_addr,
        metrics = %metrics_addr,
        local_enabled = config.local.enabled,
        shared_enabled = config.shared.enabled,
        shared_addr = %config.shared.addr,
        resp_enabled = config.resp.enabled,
        client_side_duration = config.policy.client_side_duration,
        server_side_duration = config.policy.server_side_duration,
        "etag layer starting"
    );

    let app_listener = match tokio::net::TcpListener::bind(&app_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %app_addr, "failed to bind app listener");
            return;
        }
    };

    let metrics_listener = match tokio::net::TcpListener::bind(&metrics_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %metrics_addr, "failed to bind metrics listener");
            return;
        }
    };

    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(shutdown_clone).await;
    });

    let app_future = axum::serve(app_listener, app_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let metrics_future = axum::serve(metrics_listener, metrics_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    tokio::select! {
        result = app_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "app server error");
            }
        }
        result = metrics_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "metrics server error");
            }
        }
    }

    // Either server stopping takes the rest down with it.
    shutdown.cancel();

    tracing::info!(pending = writer.pending(), "draining background cache stores");
    writer.drain().await;

    tracing::info!("etag layer shut down");
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler, waiting for Ctrl+C only");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    tracing::info!("shutdown signal received, draining connections...");
    token.cancel();
}
