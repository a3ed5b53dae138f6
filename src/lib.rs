//! PumpSwap trading library
//!
//! Pool discovery and constant-product sizing against the PumpSwap AMM,
//! exact trade instruction encoding, V0 transaction assembly, and
//! submission through a bundle relay or a single-endpoint relay with
//! confirmation polling.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod observability;
pub mod pool;
pub mod pricing;
pub mod relay;
pub mod retry;
pub mod rpc;
pub mod trader;
pub mod tx_builder;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use config::Config;
pub use errors::{TradeError, TradeOutcome};
pub use pool::{MintRole, PricedPool, ReserveReader};
pub use relay::{BundleRelay, RelayStrategy, SingleEndpointRelay};
pub use retry::RetryPolicy;
pub use rpc::{ChainRpc, SolanaRpc};
pub use trader::PumpSwapTrader;
pub use wallet::WalletManager;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
