//! postrider: a durable outbound email worker.
//!
//! Watches a shared document store for outbound email requests, delivers
//! them over SMTP, and records per-document delivery state. Two tasks run
//! in this process: the delivery engine's polling loop and the operator
//! HTTP surface. They share nothing but the store.

#[cfg(not(unix))]
compile_error!("postrider only supports unix targets");

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::Context;
use postrider_admin::{AdminServer, AdminState};
use postrider_common::{Config, Signal, SystemClock, logging};
use postrider_delivery::{DeliveryEngine, OverlayDefaults, SmtpMailer};
use postrider_store::{AdminStore, MailStore};
use tokio::sync::broadcast;

/// Grace period for in-flight work after a termination signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(8);
    sender
});

/// Wait for SIGINT or SIGTERM.
async fn termination_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
        _ = terminate.recv() => {
            tracing::info!("terminate signal received, shutting down");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    logging::init(config.log.level, config.log.file.as_deref())
        .context("failed to initialize logging")?;

    tracing::info!(
        smtp_server = %config.smtp.server,
        smtp_port = config.smtp.port,
        store = %config.store.database_url,
        poll_interval = config.engine.poll_interval_secs,
        admin_port = config.admin.port,
        "starting postrider"
    );

    let store = postrider_store::connect(&config.store)
        .context("failed to open document store")?;
    let mailer =
        SmtpMailer::new(&config.smtp).context("failed to build SMTP transport")?;

    let engine = DeliveryEngine::new(
        MailStore::new(store.clone()),
        AdminStore::new(store.clone()),
        Arc::new(mailer),
        Arc::new(SystemClock),
        OverlayDefaults::from_config(&config),
    );

    let admin = AdminServer::bind(AdminState::new(&config, store))
        .await
        .context("failed to start admin server")?;

    let mut engine_task = tokio::spawn(engine.serve(SHUTDOWN_BROADCAST.subscribe()));
    let mut admin_task = tokio::spawn(admin.serve(SHUTDOWN_BROADCAST.subscribe()));

    tokio::select! {
        result = &mut engine_task => {
            result.context("delivery engine panicked")??;
            anyhow::bail!("delivery engine stopped unexpectedly");
        }
        result = &mut admin_task => {
            result.context("admin server panicked")??;
            anyhow::bail!("admin server stopped unexpectedly");
        }
        result = termination_signal() => {
            result?;
        }
    }

    let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);

    // Give both tasks a chance to finish their current suspension point.
    let drain = async {
        let _ = (&mut engine_task).await;
        let _ = (&mut admin_task).await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("shutdown grace period elapsed with work still in flight");
    }

    tracing::info!("postrider stopped");
    Ok(())
}
