//! `flowbridge serve`: HTTP server plus the background reconciliation loop.

use anyhow::Result;
use console::style;

use flowbridge_core::reconcile;

use crate::http::router::build_router;
use crate::state::AppState;

pub async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| state.config.listen_host.clone());
    let port = port.unwrap_or(state.config.listen_port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let loop_handle = reconcile::spawn(state.reconciler.clone());

    println!(
        "  {} flowbridge listening on {}",
        style("⚡").bold(),
        style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {} engine {} · host {}",
        style("→").dim(),
        style(&state.config.engine_url).dim(),
        style(&state.config.host_url).dim()
    );
    let app_secret = if state.config.app_secret.is_empty() {
        style("not set".to_string()).yellow()
    } else {
        style(state.config.app_secret.masked()).dim()
    };
    println!(
        "  {} reconciling every {}s as '{}', app secret {}",
        style("→").dim(),
        state.reconciler.settings().poll_interval.as_secs(),
        style(&state.reconciler.settings().owner_app_id).dim(),
        app_secret
    );
    println!("  {}", style("Press Ctrl+C to stop").dim());

    let router = build_router(state);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    loop_handle.stop().await;
    println!("\n  Server stopped.");
    served?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
