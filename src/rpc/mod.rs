//! RPC boundary
//!
//! [`ChainRpc`] is the narrow set of ledger calls the trade pipeline needs.
//! [`SolanaRpc`] implements it over the nonblocking Solana RPC client; tests
//! substitute in-memory implementations.

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

use crate::pricing::TokenAmount;

pub mod errors;
pub mod solana;

pub use errors::RpcError;
pub use solana::SolanaRpc;

/// Server-side filter for a program-account scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Exact account data length
    DataSize(u64),
    /// Byte-range equality at a fixed offset
    Memcmp { offset: usize, bytes: Vec<u8> },
}

/// Raw account returned by a program-account scan
#[derive(Debug, Clone)]
pub struct KeyedAccount {
    pub pubkey: Pubkey,
    pub data: Vec<u8>,
}

/// Blockhash plus the last block height at which it is still valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Result of simulating a transaction
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    /// Transaction error as returned by the node (JSON form), if any
    pub err: Option<serde_json::Value>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Ledger view of a submitted signature
#[derive(Debug, Clone, Default)]
pub struct SignatureState {
    /// Execution error (JSON form) if the transaction landed but failed
    pub err: Option<serde_json::Value>,
    /// Whether the configured commitment level has been reached
    pub confirmed: bool,
}

/// Ledger calls used by the trade pipeline
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Endpoint label used in logs and errors
    fn endpoint(&self) -> &str;

    /// Scan accounts owned by `program_id` matching every filter
    async fn program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, RpcError>;

    /// Balance of an SPL token account in base units
    async fn token_account_balance(&self, account: &Pubkey) -> Result<TokenAmount, RpcError>;

    async fn latest_blockhash(&self) -> Result<LatestBlockhash, RpcError>;

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationReport, RpcError>;

    /// `None` when the node has not seen the signature yet
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureState>, RpcError>;

    async fn block_height(&self) -> Result<u64, RpcError>;
}
