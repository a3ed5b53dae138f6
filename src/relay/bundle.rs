//! Bundle relay: tip transaction + trade transaction raced across endpoints

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_instruction,
    transaction::VersionedTransaction,
};
use tracing::{debug, error, info, warn};

use super::{
    confirm_signature, pick_tip_account, post_json_rpc, ConfirmSettings, RelayEndpoint,
    RelayReceipt, RelayStrategy,
};
use crate::errors::TradeError;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use crate::tx_builder::{serialize_transaction, sign_instructions, AssembledTransaction};

/// Submits `[tip_tx, trade_tx]` bundles with `sendBundle`
pub struct BundleRelay {
    rpc: Arc<dyn ChainRpc>,
    http: reqwest::Client,
    endpoints: Vec<RelayEndpoint>,
    tip_accounts: Vec<Pubkey>,
    tip_lamports: u64,
    confirm: ConfirmSettings,
}

impl BundleRelay {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        http: reqwest::Client,
        endpoints: Vec<RelayEndpoint>,
        tip_accounts: Vec<Pubkey>,
        tip_lamports: u64,
        confirm: ConfirmSettings,
    ) -> Result<Self, TradeError> {
        if !endpoints.iter().any(RelayEndpoint::is_enabled) {
            return Err(TradeError::Configuration(
                "bundle relay has no enabled endpoint".to_string(),
            ));
        }
        if tip_accounts.is_empty() {
            return Err(TradeError::Configuration(
                "bundle relay has no tip accounts".to_string(),
            ));
        }

        Ok(Self {
            rpc,
            http,
            endpoints,
            tip_accounts,
            tip_lamports,
            confirm,
        })
    }

    fn build_tip_transaction(
        &self,
        signer: &Keypair,
        trade: &AssembledTransaction,
    ) -> Result<VersionedTransaction, TradeError> {
        let tip_account = pick_tip_account(&self.tip_accounts)
            .ok_or_else(|| TradeError::Configuration("no tip accounts".to_string()))?;
        debug!(tip_account = %tip_account, lamports = self.tip_lamports, "Building tip transaction");

        let tip_ix = system_instruction::transfer(&signer.pubkey(), &tip_account, self.tip_lamports);
        sign_instructions(&[tip_ix], &[signer], trade.blockhash)
    }

    /// Simulate the trade; any error is terminal for this attempt.
    async fn simulate(&self, trade: &AssembledTransaction) -> Result<(), TradeError> {
        let report = self.rpc.simulate_transaction(&trade.transaction).await?;

        if let Some(payload) = report.err {
            metrics().simulation_failures.inc();
            let err = TradeError::from_simulation(payload);
            if let TradeError::SimulationFailed {
                instruction_index,
                custom_code,
                ..
            } = &err
            {
                error!(
                    signature = %trade.signature(),
                    instruction_index = ?instruction_index,
                    custom_code = ?custom_code,
                    units_consumed = ?report.units_consumed,
                    "Trade simulation failed, not broadcasting"
                );
            }
            for line in &report.logs {
                debug!(log = %line, "Simulation log");
            }
            return Err(err);
        }

        debug!(units_consumed = ?report.units_consumed, "Trade simulation ok");
        Ok(())
    }

    /// Send the bundle to every enabled endpoint and wait for all of them.
    /// Returns the number of endpoints that accepted it.
    async fn broadcast(&self, bundle: &[String]) -> usize {
        let enabled: Vec<&RelayEndpoint> =
            self.endpoints.iter().filter(|e| e.is_enabled()).collect();

        let requests = enabled.iter().map(|endpoint| {
            post_json_rpc(&self.http, &endpoint.url, "sendBundle", json!([bundle]))
        });
        let responses = join_all(requests).await;

        let mut accepted = 0;
        for (endpoint, response) in enabled.iter().zip(responses) {
            match response {
                Ok(bundle_id) => {
                    accepted += 1;
                    debug!(endpoint = %endpoint.url, bundle_id = %bundle_id, "Bundle accepted");
                }
                Err(e) => warn!(endpoint = %endpoint.url, error = %e, "Bundle rejected"),
            }
        }
        accepted
    }
}

#[async_trait]
impl RelayStrategy for BundleRelay {
    fn name(&self) -> &'static str {
        "bundle"
    }

    async fn submit(
        &self,
        tx: AssembledTransaction,
        signer: &Keypair,
    ) -> Result<RelayReceipt, TradeError> {
        let tip_tx = self.build_tip_transaction(signer, &tx)?;
        let tip_signature: Signature = tip_tx.signatures[0];
        let trade_signature = tx.signature();

        self.simulate(&tx).await?;

        let bundle = vec![
            bs58::encode(serialize_transaction(&tip_tx)?).into_string(),
            bs58::encode(tx.serialize()?).into_string(),
        ];
        let accepted = self.broadcast(&bundle).await;

        if accepted == 0 {
            metrics().relay_rejected.inc();
            warn!(tip_signature = %tip_signature, "No relay endpoint accepted the bundle");
            return Err(TradeError::RelayRejected {
                signature: tip_signature,
            });
        }

        metrics().relay_accepted.inc();
        info!(
            accepted,
            tip_signature = %tip_signature,
            trade_signature = %trade_signature,
            "Bundle accepted, confirming"
        );

        confirm_signature(
            self.rpc.as_ref(),
            &tip_signature,
            tx.last_valid_block_height,
            self.confirm,
        )
        .await?;

        Ok(RelayReceipt {
            signature: tip_signature,
            trade_signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{LatestBlockhash, SignatureState};
    use crate::test_utils::MockRpc;
    use crate::tx_builder::{
        assemble, plan_buy, ComputeBudget, TradeAccounts, WSOL_MINT,
    };
    use mockito::{Matcher, Server};
    use solana_sdk::hash::Hash;

    fn trade(signer: &Keypair) -> AssembledTransaction {
        let accounts = TradeAccounts::derive(
            Pubkey::new_unique(),
            signer.pubkey(),
            Pubkey::new_unique(),
            WSOL_MINT,
        );
        let plan = plan_buy(&accounts, 1_000, 2_000, ComputeBudget::default()).unwrap();
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

    fn relay(rpc: Arc<MockRpc>, urls: &[String]) -> BundleRelay {
        BundleRelay::new(
            rpc,
            reqwest::Client::new(),
            urls.iter().map(|u| RelayEndpoint::new(u.clone(), 1)).collect(),
            vec![Pubkey::new_unique()],
            1_000_000,
            ConfirmSettings::default(),
        )
        .unwrap()
    }

    fn confirmed_rpc() -> Arc<MockRpc> {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_status(Some(SignatureState {
            err: None,
            confirmed: true,
        }));
        rpc
    }

    #[tokio::test]
    async fn test_bundle_accepted_by_one_endpoint() {
        let mut ok_server = Server::new_async().await;
        let mut bad_server = Server::new_async().await;
        let ok = ok_server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "sendBundle"})))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"bundle-id"}"#)
            .expect(1)
            .create_async()
            .await;
        let bad = bad_server
            .mock("POST", "/")
            .with_status(500)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"busy"}}"#)
            .expect(1)
            .create_async()
            .await;

        let signer = Keypair::new();
        let tx = trade(&signer);
        let trade_sig = tx.signature();
        let rpc = confirmed_rpc();
        let relay = relay(rpc.clone(), &[ok_server.url(), bad_server.url()]);

        let receipt = relay.submit(tx, &signer).await.unwrap();
        assert_eq!(receipt.trade_signature, trade_sig);
        assert_ne!(receipt.signature, trade_sig);
        assert_eq!(rpc.simulate_calls(), 1);

        ok.assert_async().await;
        bad.assert_async().await;
    }

    #[tokio::test]
    async fn test_simulation_failure_prevents_broadcast() {
        let mut server = Server::new_async().await;
        let never = server.mock("POST", "/").expect(0).create_async().await;

        let rpc = confirmed_rpc();
        rpc.set_simulation_error(json!({"InstructionError": [6, {"Custom": 6004}]}));
        let signer = Keypair::new();
        let relay = relay(rpc, &[server.url()]);

        let err = relay.submit(trade(&signer), &signer).await.unwrap_err();
        match err {
            TradeError::SimulationFailed {
                instruction_index,
                custom_code,
                payload,
            } => {
                assert_eq!(instruction_index, Some(6));
                assert_eq!(custom_code, Some(6004));
                assert_eq!(payload, json!({"InstructionError": [6, {"Custom": 6004}]}));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_all_endpoints_reject() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bad bundle"}}"#)
            .create_async()
            .await;

        let signer = Keypair::new();
        let relay = relay(confirmed_rpc(), &[server.url()]);
        let err = relay.submit(trade(&signer), &signer).await.unwrap_err();

        let sig = err.signature();
        assert!(matches!(err, TradeError::RelayRejected { .. }));
        assert!(sig.is_some());
    }

    #[test]
    fn test_requires_enabled_endpoint_and_tip_account() {
        let rpc: Arc<dyn ChainRpc> = Arc::new(MockRpc::new());
        let result = BundleRelay::new(
            rpc.clone(),
            reqwest::Client::new(),
            vec![RelayEndpoint::new("http://off", 0)],
            vec![Pubkey::new_unique()],
            1,
            ConfirmSettings::default(),
        );
        assert!(matches!(result, Err(TradeError::Configuration(_))));

        let result = BundleRelay::new(
            rpc,
            reqwest::Client::new(),
            vec![RelayEndpoint::new("http://on", 1)],
            vec![],
            1,
            ConfirmSettings::default(),
        );
        assert!(matches!(result, Err(TradeError::Configuration(_))));
    }
}
