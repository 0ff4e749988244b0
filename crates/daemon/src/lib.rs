//! Attention Coin Daemon
//!
//! Long-running payout service.
//!
//! ## Components
//!
//! - **PayoutService**: wires settings, store and funding source into a
//!   [`PayoutCycle`](attention_payout::PayoutCycle)
//! - **Trigger server**: axum HTTP endpoint for external cron services
//! - **Scheduler**: built-in interval trigger
//!
//! ## Endpoints
//!
//! - `POST /api/cron/payouts` (and `GET`) - run one cycle, returns the batch
//!   summary. Requires `Authorization: Bearer <cron_secret>`.
//! - `GET /health` - liveness
//!
//! Both triggers share the cycle's single-flight guard, so a scheduled run
//! and an HTTP run never overlap in one process.

mod scheduler;
mod server;
mod service;

pub use scheduler::{spawn_scheduler, Scheduler};
pub use server::{router, serve, AppState};
pub use service::{settlement_config, treasury_keypair, PayoutService};

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use attention_settings::Settings;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] attention_settings::SettingsError),

    #[error("Keystore error: {0}")]
    Keystore(#[from] attention_keystore::KeystoreError),

    #[error("Store error: {0}")]
    Store(#[from] attention_store::StoreError),

    #[error("Payout error: {0}")]
    Payout(#[from] attention_payout::PayoutError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Run the trigger server and scheduler until Ctrl-C
pub async fn run_daemon(settings: Settings) -> Result<()> {
    settings.validate_server()?;

    let service = PayoutService::from_settings(&settings).await?;
    if let Some(pg) = &service.postgres {
        pg.migrate().await?;
    }

    let secret = settings.server.cron_secret.clone().unwrap_or_default();
    let state = AppState::new(service.cycle.clone(), &secret);

    let scheduler = spawn_scheduler(
        service.cycle.clone(),
        Duration::from_secs(settings.server.schedule_interval_secs),
    );

    let listener = TcpListener::bind(settings.server.listen_addr.as_str()).await?;
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    };
    let result = serve(listener, state, shutdown).await;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    // An HTTP-triggered cycle may still be disbursing on its own task
    service.cycle.wait_idle().await;
    result
}
