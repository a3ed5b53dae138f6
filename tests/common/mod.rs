//! Shared in-memory ledger for the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pumpswap_relay::pool::{PoolAccount, ACTIVE_POOL_LAYOUT};
use pumpswap_relay::pricing::{TokenAmount, NATIVE_DECIMALS, TOKEN_DECIMALS};
use pumpswap_relay::rpc::{
    AccountFilter, ChainRpc, KeyedAccount, LatestBlockhash, RpcError, SignatureState,
    SimulationReport,
};
use pumpswap_relay::tx_builder::WSOL_MINT;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

pub struct Ledger {
    pools: Mutex<Vec<KeyedAccount>>,
    balances: Mutex<HashMap<Pubkey, TokenAmount>>,
    simulation_error: Mutex<Option<serde_json::Value>>,
    confirmed: Mutex<bool>,
    blockhash: Hash,
    pub simulations: AtomicU32,
    pub status_polls: AtomicU32,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            simulation_error: Mutex::new(None),
            confirmed: Mutex::new(true),
            blockhash: Hash::new_unique(),
            simulations: AtomicU32::new(0),
            status_polls: AtomicU32::new(0),
        }
    }

    /// Register a `mint`/WSOL pool with the given reserves
    pub fn wsol_pool(&self, mint: Pubkey, base_reserve: u64, quote_reserve: u64) -> Pubkey {
        let account = PoolAccount {
            pool_bump: 254,
            index: 0,
            creator: Pubkey::new_unique(),
            base_mint: mint,
            quote_mint: WSOL_MINT,
            lp_mint: Pubkey::new_unique(),
            pool_base_token_account: Pubkey::new_unique(),
            pool_quote_token_account: Pubkey::new_unique(),
            lp_supply: 0,
        };
        let address = Pubkey::new_unique();
        self.pools.lock().unwrap().push(KeyedAccount {
            pubkey: address,
            data: account.encode(ACTIVE_POOL_LAYOUT),
        });
        let mut balances = self.balances.lock().unwrap();
        balances.insert(
            account.pool_base_token_account,
            TokenAmount::new(base_reserve, TOKEN_DECIMALS),
        );
        balances.insert(
            account.pool_quote_token_account,
            TokenAmount::new(quote_reserve, NATIVE_DECIMALS),
        );
        address
    }

    pub fn fail_simulation(&self, err: serde_json::Value) {
        *self.simulation_error.lock().unwrap() = Some(err);
    }

    pub fn never_confirm(&self) {
        *self.confirmed.lock().unwrap() = false;
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }
}

fn matches(data: &[u8], filters: &[AccountFilter]) -> bool {
    filters.iter().all(|f| match f {
        AccountFilter::DataSize(size) => data.len() as u64 == *size,
        AccountFilter::Memcmp { offset, bytes } => {
            data.get(*offset..offset + bytes.len()) == Some(bytes.as_slice())
        }
    })
}

#[async_trait]
impl ChainRpc for Ledger {
    fn endpoint(&self) -> &str {
        "ledger://test"
    }

    async fn program_accounts(
        &self,
        _program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, RpcError> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|a| matches(&a.data, filters))
            .cloned()
            .collect())
    }

    async fn token_account_balance(&self, account: &Pubkey) -> Result<TokenAmount, RpcError> {
        self.balances
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .ok_or_else(|| RpcError::AccountNotFound {
                account: account.to_string(),
                endpoint: "ledger://test".to_string(),
            })
    }

    async fn latest_blockhash(&self) -> Result<LatestBlockhash, RpcError> {
        Ok(LatestBlockhash {
            blockhash: self.blockhash,
            last_valid_block_height: 150,
        })
    }

    async fn simulate_transaction(
        &self,
        _tx: &VersionedTransaction,
    ) -> Result<SimulationReport, RpcError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        Ok(SimulationReport {
            err: self.simulation_error.lock().unwrap().clone(),
            logs: Vec::new(),
            units_consumed: Some(60_000),
        })
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<SignatureState>, RpcError> {
        let polls = self.status_polls.fetch_add(1, Ordering::SeqCst);
        // Unseen on the first poll, then landed
        if polls == 0 || !*self.confirmed.lock().unwrap() {
            return Ok(None);
        }
        Ok(Some(SignatureState {
            err: None,
            confirmed: true,
        }))
    }

    async fn block_height(&self) -> Result<u64, RpcError> {
        // Advances with every status poll
        Ok(100 + 10 * self.status_polls.load(Ordering::SeqCst) as u64)
    }
}
