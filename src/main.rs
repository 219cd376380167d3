use span_collector::{
    config::Config,
    device::SpanClient,
    logging,
    poll::PollLoop,
    store::{self, StoreWriter},
};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::resolve()?;
    let _log_guard = logging::init(&cfg.logging)?;
    info!(host = %cfg.device.host, log_file = %cfg.logging.file, "starting span-collector");

    let store = store::connect(&cfg.store, cfg.device.request_timeout()).await?;
    info!("connected to store");

    let device = SpanClient::new(&cfg.device)?;
    info!(url = %device.url(), "polling panel");

    let retry = cfg.retry.policy();
    let writer = StoreWriter::new(store, retry);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut poll = PollLoop::new(device, writer, retry, cfg.poll.interval(), shutdown_rx);
    poll.run().await?;

    info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
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
}
