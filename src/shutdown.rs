/// Resolves once the process is asked to stop.
///
/// If the handlers cannot be registered, never resolves and the server runs
/// until killed.
pub async fn wait_for_signal() {
    if let Err(e) = wait_for_signal_impl().await {
        log::warn!("Graceful shutdown unavailable: {e:#}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down, waiting for in-flight requests");
}

/// Waits for SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_signal_impl() -> anyhow::Result<()> {
    use anyhow::Context as _;
    use tokio::signal::unix::{signal, SignalKind};

    let mut signal_terminate = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut signal_interrupt = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;

    tokio::select! {
        _ = signal_terminate.recv() => log::info!("Received SIGTERM."),
        _ = signal_interrupt.recv() => log::info!("Received SIGINT."),
    };
    Ok(())
}

/// Waits for Ctrl-C.
#[cfg(windows)]
async fn wait_for_signal_impl() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    log::info!("Received CTRL_C.");
    Ok(())
}
