//! Observability module for correlation and structured trade logging

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::Span;
use uuid::Uuid;

use crate::errors::TradeError;

/// Correlation ID for tracking one trade across components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Structured logger bound to one trade invocation
#[derive(Debug, Clone)]
pub struct TradeLogger {
    correlation_id: CorrelationId,
    operation: &'static str,
    mint: Pubkey,
}

impl TradeLogger {
    pub fn new(operation: &'static str, mint: Pubkey) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            operation,
            mint,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Span carrying the correlation id; every event inside inherits it
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "trade",
            correlation_id = %self.correlation_id,
            operation = self.operation,
            mint = %self.mint,
        )
    }

    pub fn log_attempt(&self, amount: u64, slippage_bps: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = self.operation,
            mint = %self.mint,
            amount,
            slippage_bps,
            "Trade attempt"
        );
    }

    pub fn log_sized(&self, pool: &Pubkey, amount_a: u64, amount_b: u64) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            pool = %pool,
            amount_a,
            amount_b,
            "Trade sized"
        );
    }

    pub fn log_success(&self, signature: &str, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = self.operation,
            mint = %self.mint,
            signature = %signature,
            latency_ms,
            "Trade confirmed"
        );
    }

    pub fn log_failure(&self, error: &TradeError, latency_ms: u64) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = self.operation,
            mint = %self.mint,
            category = error.category(),
            retryable = error.is_retryable(),
            signature = ?error.signature(),
            error = %error,
            latency_ms,
            "Trade failed"
        );
    }
}
