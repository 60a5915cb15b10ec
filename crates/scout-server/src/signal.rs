use tracing::info;

/// 收到的停机信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Term,
    Interrupt,
}

/// 等 SIGTERM / SIGINT
#[cfg(unix)]
pub async fn wait_for_shutdown() -> ShutdownSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            // 装不上就只剩 Ctrl+C
            info!(error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            return ShutdownSignal::Interrupt;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM");
            ShutdownSignal::Term
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT");
            ShutdownSignal::Interrupt
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> ShutdownSignal {
    let _ = tokio::signal::ctrl_c().await;
    info!("received Ctrl+C");
    ShutdownSignal::Interrupt
}
