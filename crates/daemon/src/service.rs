//! Payout service wiring

use std::sync::Arc;

use solana_sdk::signature::{Keypair, Signer};
use tracing::{info, warn};

use attention_core::sol_to_lamports;
use attention_keystore::{expand_path, keypair_from_base58, load_keypair_file};
use attention_payout::PayoutCycle;
use attention_settings::{LedgerMode, Settings, SolanaSettings};
use attention_settlement::{Cluster, SettlementClient, SettlementConfig, SettlementMode};
use attention_store::{MemoryStore, PayoutStore, PgStore};

use crate::{DaemonError, Result};

/// Settlement client configuration from the `solana` settings section
pub fn settlement_config(solana: &SolanaSettings) -> Result<SettlementConfig> {
    let mode = match solana.mode {
        LedgerMode::Mock => SettlementMode::Mock,
        LedgerMode::Live => SettlementMode::Live,
    };
    let mock_balance = sol_to_lamports(solana.mock_balance_sol)
        .map_err(|e| DaemonError::Config(format!("solana.mock_balance_sol: {}", e)))?;
    // FromStr for Cluster is infallible
    let cluster: Cluster = solana.cluster.parse().unwrap_or(Cluster::Devnet);

    Ok(SettlementConfig {
        mode,
        rpc_url: solana.rpc_url.clone(),
        commitment: solana.commitment.clone(),
        cluster,
        mock_balance,
    })
}

/// Treasury keypair from `TREASURY_SECRET_KEY` or the keypair file, if any
pub fn treasury_keypair(solana: &SolanaSettings) -> Result<Option<Keypair>> {
    if let Some(secret) = &solana.secret_key {
        return Ok(Some(keypair_from_base58(secret)?));
    }
    if let Some(path) = &solana.keypair_path {
        return Ok(Some(load_keypair_file(&expand_path(path))?));
    }
    Ok(None)
}

/// Everything a running payout service needs
pub struct PayoutService {
    pub cycle: Arc<PayoutCycle>,
    pub store: Arc<dyn PayoutStore>,
    pub settlement: Arc<SettlementClient>,
    /// Set when backed by Postgres
    pub postgres: Option<PgStore>,
}

impl PayoutService {
    /// Build the service described by `settings`.
    ///
    /// Uses Postgres when `database.url` is set, otherwise an empty
    /// in-memory store.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate_live()?;

        let config = settlement_config(&settings.solana)?;
        let settlement = match treasury_keypair(&settings.solana)? {
            Some(keypair) => {
                info!("Treasury {}", keypair.pubkey());
                SettlementClient::with_keypair(config, keypair)
            }
            None => {
                // validate_live guarantees a keypair in live mode
                let keypair = Keypair::new();
                info!("[MOCK] Using ephemeral treasury {}", keypair.pubkey());
                SettlementClient::with_keypair(config, keypair)
            }
        };
        let settlement = Arc::new(settlement);

        let (store, postgres): (Arc<dyn PayoutStore>, Option<PgStore>) = match &settings.database.url {
            Some(url) => {
                let pg = PgStore::connect(url, settings.database.max_connections).await?;
                (Arc::new(pg.clone()) as Arc<dyn PayoutStore>, Some(pg))
            }
            None => {
                warn!("No database configured, using an in-memory store");
                (Arc::new(MemoryStore::new()) as Arc<dyn PayoutStore>, None)
            }
        };

        let cycle = PayoutCycle::new(store.clone(), settlement.clone(), settings.payout.clone())?;

        Ok(Self {
            cycle: Arc::new(cycle),
            store,
            settlement,
            postgres,
        })
    }
}
