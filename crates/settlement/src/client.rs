//! Settlement client for interacting with Solana
//!
//! Supports two modes:
//! - **Mock Mode**: For development/testing without Solana. Balance and
//!   transfers live in memory; individual destinations can be made to fail.
//! - **Live Mode**: Actual Solana RPC calls. Transfers are plain system
//!   transfers signed by the treasury keypair and awaited until the
//!   configured commitment is reached.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use solana_system_interface::instruction as system_instruction;

use crate::{Cluster, FundingSource, MockTransfer, Result, SettlementError};

/// Settlement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    /// Mock mode for development - state is in-memory
    Mock,
    /// Live Solana mode
    Live,
}

/// Settlement client configuration
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Settlement mode (Mock or Live)
    pub mode: SettlementMode,
    /// Solana RPC endpoint (only used in Live mode)
    pub rpc_url: String,
    /// Commitment level a transfer must reach before it counts
    pub commitment: String,
    /// Cluster for explorer links
    pub cluster: Cluster,
    /// Starting treasury balance in mock mode (lamports)
    pub mock_balance: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            mode: SettlementMode::Mock,
            rpc_url: "https://api.devnet.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            cluster: Cluster::Devnet,
            mock_balance: 0,
        }
    }
}

impl SettlementConfig {
    /// Create a mock configuration with the given treasury balance
    pub fn mock(balance: u64) -> Self {
        Self {
            mode: SettlementMode::Mock,
            mock_balance: balance,
            ..Default::default()
        }
    }

    /// Create a live configuration for Solana devnet
    pub fn devnet() -> Self {
        Self {
            mode: SettlementMode::Live,
            ..Default::default()
        }
    }

    /// Create a live configuration for Solana mainnet
    pub fn mainnet() -> Self {
        Self {
            mode: SettlementMode::Live,
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "finalized".to_string(),
            cluster: Cluster::MainnetBeta,
            mock_balance: 0,
        }
    }

    /// Create a live configuration against an arbitrary RPC endpoint
    pub fn live(rpc_url: impl Into<String>, cluster: Cluster) -> Self {
        Self {
            mode: SettlementMode::Live,
            rpc_url: rpc_url.into(),
            cluster,
            ..Default::default()
        }
    }

    /// Get commitment config for Solana client
    fn commitment_config(&self) -> CommitmentConfig {
        match self.commitment.as_str() {
            "finalized" => CommitmentConfig::finalized(),
            "confirmed" => CommitmentConfig::confirmed(),
            "processed" => {
                warn!("'processed' commitment can be rolled back, using 'confirmed'");
                CommitmentConfig::confirmed()
            }
            _ => CommitmentConfig::confirmed(),
        }
    }
}

/// In-memory state for mock mode
#[derive(Debug, Default)]
struct MockState {
    /// Treasury balance in lamports
    balance: u64,
    /// Destinations whose transfers fail
    failing: HashSet<Pubkey>,
    /// Artificial confirmation latency
    latency: Option<Duration>,
    /// Executed transfers, in order
    transfers: Vec<MockTransfer>,
    /// Transaction counter for generating mock signatures
    tx_counter: u64,
}

/// Settlement client for treasury operations
///
/// This client abstracts the Solana RPC calls and transaction building.
/// In mock mode, state is tracked in-memory.
pub struct SettlementClient {
    config: SettlementConfig,
    /// Treasury keypair for signing transfers
    signer_keypair: Option<Keypair>,
    /// Treasury public key
    signer_pubkey: Pubkey,
    /// Solana RPC client (only used in Live mode)
    rpc_client: Option<Arc<RpcClient>>,
    /// Mock state (only used in Mock mode)
    mock_state: Arc<RwLock<MockState>>,
}

impl SettlementClient {
    /// Create a client with a public key only (read-only in live mode)
    pub fn new(config: SettlementConfig, signer_pubkey: Pubkey) -> Self {
        let rpc_client = Self::rpc_for(&config);
        let mock_state = MockState {
            balance: config.mock_balance,
            ..Default::default()
        };

        Self {
            config,
            signer_keypair: None,
            signer_pubkey,
            rpc_client,
            mock_state: Arc::new(RwLock::new(mock_state)),
        }
    }

    /// Create a client with the treasury keypair for signing
    pub fn with_keypair(config: SettlementConfig, keypair: Keypair) -> Self {
        let mut client = Self::new(config, keypair.pubkey());
        client.signer_keypair = Some(keypair);
        client
    }

    fn rpc_for(config: &SettlementConfig) -> Option<Arc<RpcClient>> {
        if config.mode == SettlementMode::Live {
            Some(Arc::new(RpcClient::new_with_commitment(
                config.rpc_url.clone(),
                config.commitment_config(),
            )))
        } else {
            None
        }
    }

    /// Treasury public key
    pub fn signer_pubkey(&self) -> &Pubkey {
        &self.signer_pubkey
    }

    /// Check if running in mock mode
    pub fn is_mock(&self) -> bool {
        self.config.mode == SettlementMode::Mock
    }

    /// Get SOL balance in lamports for the treasury account
    pub async fn get_balance(&self) -> Result<u64> {
        if self.is_mock() {
            let state = self.mock_state.read().expect("settlement lock poisoned");
            return Ok(state.balance);
        }

        let rpc = self.rpc()?;
        rpc.get_balance(&self.signer_pubkey).await
            .map_err(|e| SettlementError::RpcError(format!("get_balance: {}", e)))
    }

    /// Send lamports from the treasury to `destination`.
    ///
    /// Returns only once the transfer is confirmed at the configured
    /// commitment. A send that is accepted but never confirmed is an error.
    pub async fn send_lamports(&self, destination: &Pubkey, lamports: u64) -> Result<Signature> {
        if lamports == 0 {
            return Err(SettlementError::InvalidAmount(lamports));
        }
        debug!("Transferring {} lamports to {}", lamports, destination);

        if self.is_mock() {
            return self.mock_transfer(destination, lamports).await;
        }

        // Live mode
        let rpc = self.rpc()?;
        let keypair = self.signer_keypair.as_ref()
            .ok_or(SettlementError::NotAuthorized)?;

        let blockhash = rpc.get_latest_blockhash().await
            .map_err(|e| SettlementError::RpcError(format!("get_latest_blockhash: {}", e)))?;

        let tx = transfer_transaction(keypair, destination, lamports, blockhash);

        let signature = rpc.send_and_confirm_transaction(&tx).await
            .map_err(|e| SettlementError::TransactionFailed(e.to_string()))?;

        info!("Transfer confirmed: {} ({} lamports -> {})", signature, lamports, destination);
        Ok(signature)
    }

    fn rpc(&self) -> Result<&Arc<RpcClient>> {
        self.rpc_client.as_ref()
            .ok_or_else(|| SettlementError::RpcError("RPC client not initialized".to_string()))
    }

    // ==================== Mock ledger ====================

    async fn mock_transfer(&self, destination: &Pubkey, lamports: u64) -> Result<Signature> {
        let latency = {
            let state = self.mock_state.read().expect("settlement lock poisoned");
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.mock_state.write().expect("settlement lock poisoned");

        if state.failing.contains(destination) {
            warn!("[MOCK] Simulated transfer failure to {}", destination);
            return Err(SettlementError::TransactionFailed(
                "[MOCK] simulated network error".to_string(),
            ));
        }
        if lamports > state.balance {
            return Err(SettlementError::InsufficientFunds {
                available: state.balance,
                required: lamports,
            });
        }

        state.balance -= lamports;
        let signature = Self::generate_mock_signature(&mut state);
        state.transfers.push(MockTransfer {
            destination: *destination,
            lamports,
            signature,
        });

        info!("[MOCK] Transferred {} lamports to {} ({})", lamports, destination, signature);
        Ok(signature)
    }

    /// Generate mock signature (when already holding lock)
    fn generate_mock_signature(state: &mut MockState) -> Signature {
        state.tx_counter += 1;
        let mut sig = [0u8; 64];
        sig[0..8].copy_from_slice(&state.tx_counter.to_le_bytes());
        sig[8..16].copy_from_slice(b"mocktxn!");
        Signature::from(sig)
    }

    /// Set the mock treasury balance
    pub fn set_mock_balance(&self, lamports: u64) {
        let mut state = self.mock_state.write().expect("settlement lock poisoned");
        state.balance = lamports;
    }

    /// Make every transfer to `destination` fail (mock mode)
    pub fn fail_mock_destination(&self, destination: Pubkey) {
        let mut state = self.mock_state.write().expect("settlement lock poisoned");
        state.failing.insert(destination);
    }

    /// Undo [`Self::fail_mock_destination`]
    pub fn heal_mock_destination(&self, destination: &Pubkey) {
        let mut state = self.mock_state.write().expect("settlement lock poisoned");
        state.failing.remove(destination);
    }

    /// Delay every mock transfer by `latency`
    pub fn set_mock_latency(&self, latency: Option<Duration>) {
        let mut state = self.mock_state.write().expect("settlement lock poisoned");
        state.latency = latency;
    }

    /// Transfers executed so far (mock mode)
    pub fn mock_transfers(&self) -> Vec<MockTransfer> {
        let state = self.mock_state.read().expect("settlement lock poisoned");
        state.transfers.clone()
    }
}

#[async_trait]
impl FundingSource for SettlementClient {
    async fn spendable_balance(&self) -> Result<u64> {
        self.get_balance().await
    }

    async fn transfer(&self, destination: &Pubkey, lamports: u64) -> Result<Signature> {
        self.send_lamports(destination, lamports).await
    }

    fn explorer_url(&self, signature: &Signature) -> String {
        self.config.cluster.explorer_tx_url(signature)
    }
}

/// Single system transfer from `payer`, signed and fee-paid by it
fn transfer_transaction(payer: &Keypair, destination: &Pubkey, lamports: u64, blockhash: Hash) -> Transaction {
    let instruction = system_instruction::transfer(&payer.pubkey(), destination, lamports);
    Transaction::new_signed_with_payer(&[instruction], Some(&payer.pubkey()), &[payer], blockhash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_default_config() {
        let config = SettlementConfig::default();
        assert!(config.rpc_url.contains("solana"));
        assert_eq!(config.commitment, "confirmed");
        assert_eq!(config.mode, SettlementMode::Mock);
    }

    #[test]
    fn test_mainnet_config() {
        let config = SettlementConfig::mainnet();
        assert_eq!(config.mode, SettlementMode::Live);
        assert_eq!(config.commitment, "finalized");
        assert_eq!(config.cluster, Cluster::MainnetBeta);
    }

    #[test]
    fn test_transfer_transaction_is_system_transfer() {
        let payer = Keypair::new();
        let destination = Pubkey::new_unique();
        let tx = transfer_transaction(&payer, &destination, 1_500, Hash::new_unique());

        assert!(tx.verify().is_ok());
        assert_eq!(tx.message.account_keys[0], payer.pubkey());
        assert_eq!(tx.message.instructions.len(), 1);
        assert_eq!(
            tx.message.program_id(0),
            Some(&solana_system_interface::program::id())
        );

        // SystemInstruction::Transfer: u32 variant index 2, then u64 lamports
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&1_500u64.to_le_bytes());
        assert_eq!(tx.message.instructions[0].data, data);
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = SettlementClient::new(SettlementConfig::mock(0), Pubkey::new_unique());
        assert!(client.is_mock());
        assert_eq!(client.get_balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mock_transfer_debits_balance() {
        let client = SettlementClient::with_keypair(SettlementConfig::mock(1_000), Keypair::new());
        let dest = Pubkey::new_unique();

        let sig = client.transfer(&dest, 400).await.unwrap();
        assert_ne!(sig, Signature::default());
        assert_eq!(client.spendable_balance().await.unwrap(), 600);

        let transfers = client.mock_transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].destination, dest);
        assert_eq!(transfers[0].lamports, 400);
        assert_eq!(transfers[0].signature, sig);
    }

    #[tokio::test]
    async fn test_mock_signatures_unique() {
        let client = SettlementClient::new(SettlementConfig::mock(1_000), Pubkey::new_unique());
        let a = client.transfer(&Pubkey::new_unique(), 1).await.unwrap();
        let b = client.transfer(&Pubkey::new_unique(), 1).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_mock_insufficient_funds() {
        let client = SettlementClient::new(SettlementConfig::mock(10), Pubkey::new_unique());
        let result = client.transfer(&Pubkey::new_unique(), 11).await;
        assert_eq!(
            result,
            Err(SettlementError::InsufficientFunds { available: 10, required: 11 })
        );
        assert!(client.mock_transfers().is_empty());
    }

    #[tokio::test]
    async fn test_mock_failing_destination() {
        let client = SettlementClient::new(SettlementConfig::mock(1_000), Pubkey::new_unique());
        let bad = Pubkey::new_unique();
        client.fail_mock_destination(bad);

        assert!(matches!(
            client.transfer(&bad, 5).await,
            Err(SettlementError::TransactionFailed(_))
        ));
        assert_eq!(client.get_balance().await.unwrap(), 1_000);

        client.heal_mock_destination(&bad);
        assert!(client.transfer(&bad, 5).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_amount_rejected_locally() {
        let client = SettlementClient::new(SettlementConfig::mock(1_000), Pubkey::new_unique());
        let err = client.transfer(&Pubkey::new_unique(), 0).await.unwrap_err();
        assert!(err.is_validation());
        assert!(client.mock_transfers().is_empty());
    }

    #[tokio::test]
    async fn test_live_transfer_requires_keypair() {
        let server = MockServer::start().await;
        let client = SettlementClient::new(
            SettlementConfig::live(server.uri(), Cluster::Custom(server.uri())),
            Pubkey::new_unique(),
        );
        let err = client.transfer(&Pubkey::new_unique(), 5).await.unwrap_err();
        assert_eq!(err, SettlementError::NotAuthorized);
    }

    #[tokio::test]
    async fn test_live_get_balance_over_rpc() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getBalance" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "result": { "context": { "slot": 1 }, "value": 5_000_000_000u64 },
                "id": 1
            })))
            .mount(&server)
            .await;

        let client = SettlementClient::new(
            SettlementConfig::live(server.uri(), Cluster::Devnet),
            Pubkey::new_unique(),
        );
        assert!(!client.is_mock());
        assert_eq!(client.spendable_balance().await.unwrap(), 5_000_000_000);
    }

    #[tokio::test]
    async fn test_live_rpc_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = SettlementClient::new(
            SettlementConfig::live(server.uri(), Cluster::Devnet),
            Pubkey::new_unique(),
        );
        assert!(matches!(
            client.spendable_balance().await,
            Err(SettlementError::RpcError(_))
        ));
    }

    #[test]
    fn test_explorer_url_uses_cluster() {
        let client = SettlementClient::new(SettlementConfig::mock(0), Pubkey::new_unique());
        let url = client.explorer_url(&Signature::default());
        assert!(url.contains("cluster=devnet"));
    }
}
