//! Settlement types

use std::fmt;
use std::str::FromStr;

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use crate::{Result, SettlementError};

/// Cluster the treasury lives on (drives explorer links)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cluster {
    Devnet,
    Testnet,
    MainnetBeta,
    /// Local validator or private RPC, explorer pointed at a custom URL
    Custom(String),
}

impl Cluster {
    /// Explorer link for a transaction signature
    pub fn explorer_tx_url(&self, signature: &Signature) -> String {
        match self {
            Self::MainnetBeta => format!("https://explorer.solana.com/tx/{}", signature),
            Self::Devnet => format!("https://explorer.solana.com/tx/{}?cluster=devnet", signature),
            Self::Testnet => format!("https://explorer.solana.com/tx/{}?cluster=testnet", signature),
            Self::Custom(url) => format!(
                "https://explorer.solana.com/tx/{}?cluster=custom&customUrl={}",
                signature, url
            ),
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Devnet => f.write_str("devnet"),
            Self::Testnet => f.write_str("testnet"),
            Self::MainnetBeta => f.write_str("mainnet-beta"),
            Self::Custom(url) => f.write_str(url),
        }
    }
}

impl FromStr for Cluster {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "devnet" => Self::Devnet,
            "testnet" => Self::Testnet,
            "mainnet" | "mainnet-beta" => Self::MainnetBeta,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// A transfer executed against the mock ledger
#[derive(Debug, Clone, PartialEq)]
pub struct MockTransfer {
    pub destination: Pubkey,
    pub lamports: u64,
    pub signature: Signature,
}

/// Parse a base58 wallet address, rejecting anything that is not a 32-byte key
pub fn parse_destination(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address.trim())
        .map_err(|e| SettlementError::InvalidAddress(format!("{}: {}", address, e)))
}
