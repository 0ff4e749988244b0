//! Attention Coin Daemon Binary
//!
//! Serves the payout trigger endpoint and runs the built-in scheduler.

use attention_daemon::{run_daemon, DaemonError};
use attention_settings::Settings;

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    dotenvy::dotenv().ok();
    attention_logging::init_logging(false);

    tracing::info!("Starting Attention Coin payout daemon...");

    let mut settings = Settings::load_or_default()?;
    settings.apply_env();

    if let Err(e) = run_daemon(settings).await {
        tracing::error!("Daemon error: {}", e);
        return Err(e);
    }

    tracing::info!("Daemon stopped");
    Ok(())
}
