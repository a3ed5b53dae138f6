//! Relay submission
//!
//! Two strategies share the [`RelayStrategy`] seam:
//! - [`BundleRelay`]: separate tip transaction, simulate, `sendBundle` raced
//!   across every enabled endpoint, confirm on the tip signature
//! - [`SingleEndpointRelay`]: tip transfer inside the trade transaction, one
//!   `sendTransaction` POST, confirm on the trade signature
//!
//! Both confirm by polling signature status against the blockhash validity
//! window.

use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, signature::Keypair, signature::Signature,
};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::TradeError;
use crate::metrics::{metrics, Timer};
use crate::rpc::{ChainRpc, SignatureState};
use crate::tx_builder::AssembledTransaction;

pub mod bundle;
pub mod single;

pub use bundle::BundleRelay;
pub use single::SingleEndpointRelay;

/// A relay URL and its selection weight. Weight 0 disables the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl RelayEndpoint {
    pub fn new(url: impl Into<String>, weight: u32) -> Self {
        Self {
            url: url.into(),
            weight,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.weight > 0
    }
}

/// Weighted random choice among enabled endpoints
pub fn pick_weighted(endpoints: &[RelayEndpoint]) -> Option<&RelayEndpoint> {
    let dist = WeightedIndex::new(endpoints.iter().map(|e| e.weight)).ok()?;
    endpoints.get(dist.sample(&mut thread_rng()))
}

/// Uniform random tip account
pub fn pick_tip_account(accounts: &[Pubkey]) -> Option<Pubkey> {
    accounts.choose(&mut thread_rng()).copied()
}

/// Confirmation polling bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmSettings {
    pub poll_interval: Duration,
    /// Overall cap, applied even while the blockhash is still valid
    pub timeout: Duration,
}

impl Default for ConfirmSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(400),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Signatures of a submission that reached confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReceipt {
    /// Signature that confirmation was tracked on
    pub signature: Signature,
    pub trade_signature: Signature,
}

/// A way of getting a signed trade transaction on chain
#[async_trait]
pub trait RelayStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Instructions the assembler appends to the trade before signing.
    /// Empty for strategies that tip out of band.
    fn inline_tip(&self, _payer: &Pubkey) -> Result<Vec<Instruction>, TradeError> {
        Ok(Vec::new())
    }

    /// Submit and wait for confirmation. `signer` pays any separate tip.
    async fn submit(
        &self,
        tx: AssembledTransaction,
        signer: &Keypair,
    ) -> Result<RelayReceipt, TradeError>;
}

/// JSON-RPC envelope returned by relay endpoints
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub result: Option<Value>,
    pub error: Option<Value>,
}

/// POST a JSON-RPC call. `Ok` only if the endpoint returned a `result`.
pub(crate) async fn post_json_rpc(
    http: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
) -> Result<Value, String> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response = http
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("request failed: {}", e))?;

    let status = response.status();
    let parsed: JsonRpcResponse = response
        .json()
        .await
        .map_err(|e| format!("HTTP {}: unreadable body: {}", status, e))?;

    match (parsed.result, parsed.error) {
        (Some(result), _) if status.is_success() => Ok(result),
        (_, Some(error)) => Err(format!("HTTP {}: {}", status, error)),
        _ => Err(format!("HTTP {}: no result", status)),
    }
}

/// Poll until `signature` is confirmed, fails, or its blockhash expires.
///
/// Transient RPC errors while polling are logged and the poll continues.
pub async fn confirm_signature(
    rpc: &dyn ChainRpc,
    signature: &Signature,
    last_valid_block_height: u64,
    settings: ConfirmSettings,
) -> Result<(), TradeError> {
    let timer = Timer::new();
    let started = Instant::now();
    let mut status_polls = 0u32;
    let mut last_status: Option<SignatureState> = None;

    loop {
        status_polls += 1;
        match rpc.signature_status(signature).await {
            Ok(Some(state)) => {
                last_status = Some(state.clone());
                if let Some(payload) = state.err {
                    warn!(signature = %signature, error = %payload, "Transaction landed with error");
                    return Err(TradeError::TransactionFailed {
                        signature: *signature,
                        payload,
                    });
                }
                if state.confirmed {
                    timer.observe_duration(&metrics().confirm_latency);
                    info!(
                        signature = %signature,
                        elapsed_ms = timer.elapsed_ms(),
                        "Transaction confirmed"
                    );
                    return Ok(());
                }
            }
            Ok(None) => debug!(signature = %signature, status_polls, "Signature not seen yet"),
            Err(e) => debug!(signature = %signature, error = %e, "Status poll failed"),
        }

        let expired = match rpc.block_height().await {
            Ok(height) => height > last_valid_block_height,
            Err(e) => {
                debug!(error = %e, "Block height poll failed");
                false
            }
        };
        if expired || started.elapsed() >= settings.timeout {
            metrics().confirmation_timeouts.inc();
            let status_seen = last_status.is_some();
            warn!(
                signature = %signature,
                last_valid_block_height,
                blockhash_expired = expired,
                status_polls,
                status_seen,
                last_status = ?last_status,
                "Confirmation timed out"
            );
            return Err(TradeError::ConfirmationTimeout {
                signature: *signature,
                status_seen,
            });
        }

        sleep(settings.poll_interval).await;
    }
}
