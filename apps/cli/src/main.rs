//! Attention Coin CLI
//!
//! Operator interface for the payout service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use attention_core::{lamports_to_sol, BatchSummary};
use attention_daemon::{run_daemon, PayoutService};
use attention_settings::Settings;
use attention_settlement::FundingSource;
use attention_store::PayoutStore;

/// Attention Coin - proportional SOL payouts for approved submissions
#[derive(Parser)]
#[command(name = "attention")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trigger server and built-in scheduler
    Serve,

    /// Run one payout cycle now and print its summary
    RunCycle {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show effective settings and payout config
    Config,

    /// Show the treasury balance
    Balance,

    /// List failed payouts that are still retryable
    FailedPayouts {
        /// Override payout.max_retries
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    attention_logging::init_logging(cli.verbose);

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::load_or_default().context("Failed to load settings")?,
    };
    settings.apply_env();

    match cli.command {
        Commands::Serve => {
            run_daemon(settings).await.context("Daemon failed")?;
        }
        Commands::RunCycle { json } => {
            run_cycle(&settings, json).await?;
        }
        Commands::Config => {
            show_config(&settings).await?;
        }
        Commands::Balance => {
            balance(&settings).await?;
        }
        Commands::FailedPayouts { max_retries } => {
            failed_payouts(&settings, max_retries).await?;
        }
        Commands::Migrate => {
            migrate(&settings).await?;
        }
    }

    Ok(())
}

async fn service(settings: &Settings) -> Result<PayoutService> {
    PayoutService::from_settings(settings)
        .await
        .context("Failed to start payout service")
}

async fn run_cycle(settings: &Settings, json: bool) -> Result<()> {
    let service = service(settings).await?;
    info!("Running payout cycle...");
    let summary = service.cycle.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if let Some(error) = &summary.error {
        anyhow::bail!("Payout cycle aborted: {}", error);
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!("Payout Batch {}", summary.batch_id);
    println!("==============================================");
    println!("Processed:  {}", summary.total_processed);
    println!("Successful: {}", summary.successful);
    println!("Failed:     {}", summary.failed);
    println!("Paid:       {} SOL", lamports_to_sol(summary.total_amount));
    println!("Duration:   {}ms", summary.duration_ms);
    if let Some(error) = &summary.error {
        println!("Error:      {}", error);
    }
    if !summary.errors.is_empty() {
        println!();
        println!("Recipient errors:");
        for e in &summary.errors {
            println!("  {} [{:?}] {}", e.user_id, e.kind, e.reason);
        }
    }
}

async fn show_config(settings: &Settings) -> Result<()> {
    println!("Settings");
    println!("========");
    let mut redacted = settings.clone();
    if redacted.server.cron_secret.is_some() {
        redacted.server.cron_secret = Some("********".to_string());
    }
    if redacted.database.url.is_some() {
        redacted.database.url = Some("********".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&redacted)?);

    let service = service(settings).await?;
    let config = service
        .cycle
        .effective_config()
        .await
        .context("Failed to load payout config")?;

    println!();
    println!("Effective payout config");
    println!("=======================");
    println!("Budget:       {} SOL", config.budget_sol);
    println!("Max per user: {} SOL", config.max_per_user_sol);
    println!("Min payout:   {} SOL", config.min_payout_sol);
    Ok(())
}

async fn balance(settings: &Settings) -> Result<()> {
    let service = service(settings).await?;
    let lamports = service
        .settlement
        .spendable_balance()
        .await
        .context("Failed to fetch treasury balance")?;

    println!("Treasury: {}", service.settlement.signer_pubkey());
    println!("Balance:  {} SOL ({} lamports)", lamports_to_sol(lamports), lamports);
    if service.settlement.is_mock() {
        println!("(mock ledger)");
    }
    Ok(())
}

async fn failed_payouts(settings: &Settings, max_retries: Option<u32>) -> Result<()> {
    let max_retries = max_retries.unwrap_or(settings.payout.max_retries);
    let service = service(settings).await?;
    let records = service
        .store
        .retryable_failed_payouts(max_retries)
        .await
        .context("Failed to query failed payouts")?;

    if records.is_empty() {
        println!("No retryable failed payouts");
        return Ok(());
    }

    println!("{} retryable failed payouts (retry_count < {})", records.len(), max_retries);
    for r in records {
        println!(
            "  {} user {} {} SOL attempts {} batch {}: {}",
            r.id,
            r.user_id,
            lamports_to_sol(r.amount),
            r.retry_count,
            r.batch_id,
            r.error.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn migrate(settings: &Settings) -> Result<()> {
    let service = service(settings).await?;
    let pg = service
        .postgres
        .as_ref()
        .context("No database configured (set DATABASE_URL or database.url)")?;
    pg.migrate().await.context("Migration failed")?;
    println!("Migrations applied");
    Ok(())
}
