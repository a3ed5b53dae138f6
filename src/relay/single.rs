//! Single-endpoint relay: tip inside the trade, one `sendTransaction` POST

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use rand::seq::SliceRandom;
use serde_json::json;
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, signature::Keypair, system_instruction,
};
use tracing::{info, warn};

use super::{
    confirm_signature, pick_tip_account, pick_weighted, post_json_rpc, ConfirmSettings,
    RelayEndpoint, RelayReceipt, RelayStrategy,
};
use crate::errors::TradeError;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use crate::tx_builder::AssembledTransaction;

/// Smallest tip the provider accepts, in lamports
pub const MIN_TIP_LAMPORTS: u64 = 1_000_000;

/// Submits a tipped trade transaction to one provider endpoint
pub struct SingleEndpointRelay {
    rpc: Arc<dyn ChainRpc>,
    http: reqwest::Client,
    endpoints: Vec<RelayEndpoint>,
    api_keys: Vec<String>,
    tip_accounts: Vec<Pubkey>,
    tip_lamports: u64,
    confirm: ConfirmSettings,
    /// Full target URL fixed by the caller, bypassing weighted selection
    target: Option<String>,
}

impl SingleEndpointRelay {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        http: reqwest::Client,
        endpoints: Vec<RelayEndpoint>,
        api_keys: Vec<String>,
        tip_accounts: Vec<Pubkey>,
        tip_lamports: u64,
        confirm: ConfirmSettings,
    ) -> Result<Self, TradeError> {
        if !endpoints.iter().any(RelayEndpoint::is_enabled) {
            return Err(TradeError::Configuration(
                "single relay has no enabled endpoint".to_string(),
            ));
        }
        if tip_accounts.is_empty() {
            return Err(TradeError::Configuration(
                "single relay has no tip accounts".to_string(),
            ));
        }

        Ok(Self {
            rpc,
            http,
            endpoints,
            api_keys,
            tip_accounts,
            tip_lamports: tip_lamports.max(MIN_TIP_LAMPORTS),
            confirm,
            target: None,
        })
    }

    /// Always submit to `url` (base URL with API key already appended)
    pub fn with_target(mut self, url: impl Into<String>) -> Self {
        self.target = Some(url.into());
        self
    }

    pub fn tip_lamports(&self) -> u64 {
        self.tip_lamports
    }

    /// Endpoint URL chosen by weight with a random API key appended
    pub fn choose_target(&self) -> Result<String, TradeError> {
        if let Some(target) = &self.target {
            return Ok(target.clone());
        }

        let endpoint = pick_weighted(&self.endpoints).ok_or_else(|| {
            TradeError::Configuration("single relay has no enabled endpoint".to_string())
        })?;
        let key = self
            .api_keys
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default();

        Ok(format!("{}{}", endpoint.url, key))
    }
}

#[async_trait]
impl RelayStrategy for SingleEndpointRelay {
    fn name(&self) -> &'static str {
        "single"
    }

    fn inline_tip(&self, payer: &Pubkey) -> Result<Vec<Instruction>, TradeError> {
        let tip_account = pick_tip_account(&self.tip_accounts)
            .ok_or_else(|| TradeError::Configuration("no tip accounts".to_string()))?;
        Ok(vec![system_instruction::transfer(
            payer,
            &tip_account,
            self.tip_lamports,
        )])
    }

    async fn submit(
        &self,
        tx: AssembledTransaction,
        _signer: &Keypair,
    ) -> Result<RelayReceipt, TradeError> {
        let signature = tx.signature();
        let target = self.choose_target()?;
        let encoded = BASE64_STANDARD.encode(tx.serialize()?);

        let response = post_json_rpc(
            &self.http,
            &target,
            "sendTransaction",
            json!([encoded, {"encoding": "base64"}]),
        )
        .await;

        if let Err(e) = response {
            metrics().relay_rejected.inc();
            warn!(signature = %signature, error = %e, "Relay rejected the transaction");
            return Err(TradeError::RelayRejected { signature });
        }

        metrics().relay_accepted.inc();
        info!(signature = %signature, "Transaction accepted by relay, confirming");

        confirm_signature(
            self.rpc.as_ref(),
            &signature,
            tx.last_valid_block_height,
            self.confirm,
        )
        .await?;

        Ok(RelayReceipt {
            signature,
            trade_signature: signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{LatestBlockhash, SignatureState};
    use crate::test_utils::MockRpc;
    use crate::tx_builder::{assemble, plan_sell, ComputeBudget, TradeAccounts, WSOL_MINT};
    use mockito::{Matcher, Server};
    use solana_sdk::{hash::Hash, signer::Signer};

    fn relay(rpc: Arc<MockRpc>, base_url: String, tip: u64) -> SingleEndpointRelay {
        SingleEndpointRelay::new(
            rpc,
            reqwest::Client::new(),
            vec![RelayEndpoint::new(base_url, 1)],
            vec!["key-1".to_string()],
            vec![Pubkey::new_unique()],
            tip,
            ConfirmSettings::default(),
        )
        .unwrap()
    }

    fn tipped_trade(relay: &SingleEndpointRelay, signer: &Keypair) -> AssembledTransaction {
        let accounts = TradeAccounts::derive(
            Pubkey::new_unique(),
            signer.pubkey(),
            Pubkey::new_unique(),
            WSOL_MINT,
        );
        let mut plan = plan_sell(&accounts, 10, 1, ComputeBudget::default()).unwrap();
        plan.append_tips(relay.inline_tip(&signer.pubkey()).unwrap());
        assemble(
            plan,
            &[signer],
            LatestBlockhash {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 500,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_tip_is_raised_to_provider_minimum() {
        let rpc = Arc::new(MockRpc::new());
        let relay = relay(rpc, "http://relay/?c=".into(), 10);
        assert_eq!(relay.tip_lamports(), MIN_TIP_LAMPORTS);

        let payer = Pubkey::new_unique();
        let tips = relay.inline_tip(&payer).unwrap();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].program_id, solana_sdk::system_program::ID);
        assert_eq!(tips[0].accounts[0].pubkey, payer);
    }

    #[test]
    fn test_target_appends_api_key() {
        let rpc = Arc::new(MockRpc::new());
        let relay = relay(rpc, "http://ams1.relay/?c=".into(), MIN_TIP_LAMPORTS);
        assert_eq!(relay.choose_target().unwrap(), "http://ams1.relay/?c=key-1");

        let relay = relay.with_target("http://pinned/?c=abc");
        assert_eq!(relay.choose_target().unwrap(), "http://pinned/?c=abc");
    }

    #[tokio::test]
    async fn test_send_transaction_request_shape() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .match_query(Matcher::UrlEncoded("c".into(), "key-1".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({
                    "jsonrpc": "2.0",
                    "method": "sendTransaction",
                })),
                Matcher::Regex(r#""encoding":"base64""#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"sig"}"#)
            .expect(1)
            .create_async()
            .await;

        let rpc = Arc::new(MockRpc::new());
        rpc.set_status(Some(SignatureState {
            err: None,
            confirmed: true,
        }));
        let relay = relay(rpc.clone(), format!("{}/?c=", server.url()), MIN_TIP_LAMPORTS);
        let signer = Keypair::new();
        let tx = tipped_trade(&relay, &signer);
        let trade_sig = tx.signature();

        let receipt = relay.submit(tx, &signer).await.unwrap();
        assert_eq!(receipt.signature, trade_sig);
        assert_eq!(receipt.trade_signature, trade_sig);
        // No simulate step on this path
        assert_eq!(rpc.simulate_calls(), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejection_returns_trade_signature() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(403)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32001,"message":"bad key"}}"#)
            .create_async()
            .await;

        let rpc = Arc::new(MockRpc::new());
        let relay = relay(rpc, format!("{}/?c=", server.url()), MIN_TIP_LAMPORTS);
        let signer = Keypair::new();
        let tx = tipped_trade(&relay, &signer);
        let trade_sig = tx.signature();

        let err = relay.submit(tx, &signer).await.unwrap_err();
        assert!(matches!(err, TradeError::RelayRejected { signature } if signature == trade_sig));
    }
}
