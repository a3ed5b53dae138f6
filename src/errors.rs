//! Error taxonomy for the trade pipeline
//!
//! Every component converts its low-level failures into [`TradeError`] at its
//! boundary. The trader wraps the final result in [`TradeOutcome`], so callers
//! only ever see a signature or a classified failure.

use serde_json::Value;
use solana_sdk::signature::Signature;
use thiserror::Error;

use crate::pricing::PricingError;
use crate::rpc::RpcError;

/// Errors produced while discovering, sizing, building, or relaying a trade
#[derive(Error, Debug, Clone)]
pub enum TradeError {
    /// No pool matches the mint (fatal for this trade)
    #[error("No pool found for mint {mint}")]
    NotFound { mint: String },

    /// An RPC call failed outside of pool discovery
    #[error("RPC error: {0}")]
    RpcTransient(#[from] RpcError),

    /// A reserve balance could not be read after exhausting retries
    #[error("Reserves unavailable for pool {pool}: {reason}")]
    ReserveUnavailable { pool: String, reason: String },

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Blockhash error: {0}")]
    Blockhash(String),

    /// Pre-broadcast simulation rejected the trade; nothing was sent
    #[error(
        "Simulation failed at instruction {instruction_index:?} (custom code {custom_code:?}): {payload}"
    )]
    SimulationFailed {
        instruction_index: Option<u8>,
        custom_code: Option<u32>,
        payload: Value,
    },

    /// Every relay endpoint rejected the submission
    #[error("All relay endpoints rejected the submission (signature {signature})")]
    RelayRejected { signature: Signature },

    /// The blockhash expired before confirmation; the transaction may still have landed.
    /// `status_seen` is set when a node reported the signature at least once.
    #[error("Confirmation timed out for {signature} (status seen: {status_seen})")]
    ConfirmationTimeout {
        signature: Signature,
        status_seen: bool,
    },

    /// The transaction landed but its execution failed
    #[error("Transaction {signature} failed on chain: {payload}")]
    TransactionFailed { signature: Signature, payload: Value },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TradeError {
    /// Whether rerunning the whole pipeline with a fresh blockhash might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RpcTransient(err) => err.is_retryable(),
            Self::ReserveUnavailable { .. } => true,
            Self::Blockhash(_) => true,
            Self::RelayRejected { .. } => true,
            Self::ConfirmationTimeout { .. } => true,

            Self::NotFound { .. } => false,
            Self::Pricing(_) => false,
            Self::InstructionBuild { .. } => false,
            Self::InvalidInstructionOrder(_) => false,
            Self::Signing(_) => false,
            Self::SimulationFailed { .. } => false,
            Self::TransactionFailed { .. } => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::RpcTransient(_) => "rpc",
            Self::ReserveUnavailable { .. } => "reserves",
            Self::Pricing(_) => "pricing",
            Self::InstructionBuild { .. } => "instruction",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Signing(_) => "signing",
            Self::Blockhash(_) => "blockhash",
            Self::SimulationFailed { .. } => "simulation",
            Self::RelayRejected { .. } => "relay",
            Self::ConfirmationTimeout { .. } => "confirmation",
            Self::TransactionFailed { .. } => "execution",
            Self::Configuration(_) => "config",
        }
    }

    /// Signature of a transaction that may have reached the network
    pub fn signature(&self) -> Option<Signature> {
        match self {
            Self::RelayRejected { signature }
            | Self::ConfirmationTimeout { signature, .. }
            | Self::TransactionFailed { signature, .. } => Some(*signature),
            _ => None,
        }
    }
}

// Convenience constructors
impl TradeError {
    pub fn not_found(mint: impl ToString) -> Self {
        Self::NotFound {
            mint: mint.to_string(),
        }
    }

    pub fn reserve_unavailable(pool: impl ToString, reason: impl ToString) -> Self {
        Self::ReserveUnavailable {
            pool: pool.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Classify a simulation error payload.
    ///
    /// Recognizes `{"InstructionError": [index, {"Custom": code}]}`; any other
    /// shape is kept verbatim with no index or code.
    pub fn from_simulation(payload: Value) -> Self {
        let (instruction_index, custom_code) = parse_instruction_error(&payload);
        Self::SimulationFailed {
            instruction_index,
            custom_code,
            payload,
        }
    }
}

fn parse_instruction_error(payload: &Value) -> (Option<u8>, Option<u32>) {
    let Some(parts) = payload.get("InstructionError").and_then(Value::as_array) else {
        return (None, None);
    };

    let index = parts
        .first()
        .and_then(Value::as_u64)
        .and_then(|i| u8::try_from(i).ok());
    let code = parts
        .get(1)
        .and_then(|detail| detail.get("Custom"))
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok());

    (index, code)
}

/// Final, user-visible result of a trade invocation
#[derive(Debug, Clone)]
pub enum TradeOutcome {
    Success {
        /// Signature the confirmation was tracked on
        signature: Signature,
        /// Signature of the trade transaction itself
        trade_signature: Signature,
    },
    Failure {
        reason: TradeError,
        /// Present when something may have reached the network
        signature: Option<Signature>,
    },
}

impl TradeOutcome {
    pub fn failure(reason: TradeError) -> Self {
        let signature = reason.signature();
        Self::Failure { reason, signature }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn signature(&self) -> Option<Signature> {
        match self {
            Self::Success { signature, .. } => Some(*signature),
            Self::Failure { signature, .. } => *signature,
        }
    }
}

impl From<Result<(Signature, Signature), TradeError>> for TradeOutcome {
    fn from(result: Result<(Signature, Signature), TradeError>) -> Self {
        match result {
            Ok((signature, trade_signature)) => Self::Success {
                signature,
                trade_signature,
            },
            Err(reason) => Self::failure(reason),
        }
    }
}
