use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSimulateTransactionConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use tracing::debug;

use super::{
    AccountFilter, ChainRpc, KeyedAccount, LatestBlockhash, RpcError, SignatureState,
    SimulationReport,
};
use crate::metrics::{metrics, Timer};
use crate::pricing::{parse_ui_amount, TokenAmount};

/// Parse a commitment level name ("processed", "confirmed", "finalized")
pub fn parse_commitment(level: &str) -> Result<CommitmentConfig, RpcError> {
    CommitmentLevel::from_str(level)
        .map(|commitment| CommitmentConfig { commitment })
        .map_err(|_| RpcError::Decode(format!("unknown commitment level '{}'", level)))
}

/// [`ChainRpc`] over the nonblocking Solana RPC client
pub struct SolanaRpc {
    client: RpcClient,
    endpoint: String,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(url: &str, commitment: CommitmentConfig, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                url.to_string(),
                timeout,
                commitment,
            ),
            endpoint: url.to_string(),
            commitment,
        }
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.commitment
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcError {
        RpcError::from_client_error(err, &self.endpoint)
    }
}

fn to_rpc_filter(filter: &AccountFilter) -> RpcFilterType {
    match filter {
        AccountFilter::DataSize(size) => RpcFilterType::DataSize(*size),
        AccountFilter::Memcmp { offset, bytes } => {
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(*offset, bytes))
        }
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, RpcError> {
        let timer = Timer::new();
        let config = RpcProgramAccountsConfig {
            filters: Some(filters.iter().map(to_rpc_filter).collect()),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };

        let accounts = self
            .client
            .get_program_accounts_with_config(program_id, config)
            .await
            .map_err(|e| self.map_err(e))?;
        timer.observe_duration(&metrics().rpc_latency);

        debug!(
            program = %program_id,
            matches = accounts.len(),
            "Program account scan complete"
        );

        Ok(accounts
            .into_iter()
            .map(|(pubkey, account)| KeyedAccount {
                pubkey,
                data: account.data,
            })
            .collect())
    }

    async fn token_account_balance(&self, account: &Pubkey) -> Result<TokenAmount, RpcError> {
        let timer = Timer::new();
        let balance = self
            .client
            .get_token_account_balance_with_commitment(account, self.commitment)
            .await
            .map_err(|e| self.map_err(e))?
            .value;
        timer.observe_duration(&metrics().rpc_latency);

        let raw = match balance.amount.parse::<u64>() {
            Ok(raw) => raw,
            // Fall back to the decimal string, which is exact unlike `ui_amount`
            Err(_) => parse_ui_amount(&balance.ui_amount_string, balance.decimals)
                .map_err(|e| RpcError::Decode(format!("token balance for {}: {}", account, e)))?,
        };

        Ok(TokenAmount::new(raw, balance.decimals))
    }

    async fn latest_blockhash(&self) -> Result<LatestBlockhash, RpcError> {
        let timer = Timer::new();
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        timer.observe_duration(&metrics().rpc_latency);

        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationReport, RpcError> {
        let timer = Timer::new();
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };

        let result = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))?
            .value;
        timer.observe_duration(&metrics().rpc_latency);

        Ok(SimulationReport {
            err: result
                .err
                .as_ref()
                .and_then(|err| serde_json::to_value(err).ok()),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureState>, RpcError> {
        let statuses = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.map_err(e))?
            .value;

        Ok(statuses.into_iter().next().flatten().map(|status| SignatureState {
            confirmed: status.satisfies_commitment(self.commitment),
            err: status
                .err
                .as_ref()
                .and_then(|err| serde_json::to_value(err).ok()),
        }))
    }

    async fn block_height(&self) -> Result<u64, RpcError> {
        self.client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e))
    }
}
