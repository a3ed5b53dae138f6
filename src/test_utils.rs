//! Test Utilities Module
//!
//! In-memory [`ChainRpc`] for deterministic tests of pool discovery, relay
//! confirmation, and the full trade pipeline. Program-account scans apply the
//! requested filters to the stored accounts, so filter offsets are exercised
//! for real.
//!
//! Only compiled when running tests or when the `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

use crate::pool::{PoolAccount, ACTIVE_POOL_LAYOUT};
use crate::pricing::{TokenAmount, NATIVE_DECIMALS, TOKEN_DECIMALS};
use crate::rpc::{
    AccountFilter, ChainRpc, KeyedAccount, LatestBlockhash, RpcError, SignatureState,
    SimulationReport,
};
use crate::tx_builder::WSOL_MINT;

const MOCK_ENDPOINT: &str = "mock://rpc";

/// Pool account with fresh token account addresses
pub fn pool_fixture(base_mint: Pubkey, quote_mint: Pubkey) -> PoolAccount {
    PoolAccount {
        pool_bump: 255,
        index: 0,
        creator: Pubkey::new_unique(),
        base_mint,
        quote_mint,
        lp_mint: Pubkey::new_unique(),
        pool_base_token_account: Pubkey::new_unique(),
        pool_quote_token_account: Pubkey::new_unique(),
        lp_supply: 1_000_000,
    }
}

fn transport_error() -> RpcError {
    RpcError::Transport {
        endpoint: MOCK_ENDPOINT.to_string(),
        message: "connection reset".to_string(),
    }
}

fn matches_filters(data: &[u8], filters: &[AccountFilter]) -> bool {
    filters.iter().all(|filter| match filter {
        AccountFilter::DataSize(size) => data.len() as u64 == *size,
        AccountFilter::Memcmp { offset, bytes } => {
            data.get(*offset..*offset + bytes.len()) == Some(bytes.as_slice())
        }
    })
}

/// Scriptable in-memory RPC
pub struct MockRpc {
    accounts: Mutex<Vec<KeyedAccount>>,
    balances: Mutex<HashMap<Pubkey, TokenAmount>>,
    failing_balances: Mutex<HashSet<Pubkey>>,
    scan_failures_left: AtomicU32,
    failing_offsets: Mutex<HashSet<usize>>,
    last_filters: Mutex<Vec<AccountFilter>>,
    blockhash: Hash,
    last_valid_block_height: u64,
    simulation_error: Mutex<Option<serde_json::Value>>,
    status: Mutex<Option<SignatureState>>,
    height_start: AtomicU64,
    height_step: AtomicU64,

    scan_calls: AtomicU32,
    simulate_calls: AtomicU32,
    status_calls: AtomicU32,
    height_calls: AtomicU64,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            failing_balances: Mutex::new(HashSet::new()),
            scan_failures_left: AtomicU32::new(0),
            failing_offsets: Mutex::new(HashSet::new()),
            last_filters: Mutex::new(Vec::new()),
            blockhash: Hash::new_unique(),
            last_valid_block_height: 1_000,
            simulation_error: Mutex::new(None),
            status: Mutex::new(None),
            height_start: AtomicU64::new(0),
            height_step: AtomicU64::new(0),
            scan_calls: AtomicU32::new(0),
            simulate_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            height_calls: AtomicU64::new(0),
        }
    }

    /// Register a pool and the balances of its two token accounts.
    /// Returns the pool address.
    pub fn add_pool(&self, account: PoolAccount, base_reserve: u64, quote_reserve: u64) -> Pubkey {
        let address = Pubkey::new_unique();
        let quote_decimals = if account.quote_mint == WSOL_MINT {
            NATIVE_DECIMALS
        } else {
            TOKEN_DECIMALS
        };

        self.accounts.lock().unwrap().push(KeyedAccount {
            pubkey: address,
            data: account.encode(ACTIVE_POOL_LAYOUT),
        });
        self.set_balance(
            account.pool_base_token_account,
            TokenAmount::new(base_reserve, TOKEN_DECIMALS),
        );
        self.set_balance(
            account.pool_quote_token_account,
            TokenAmount::new(quote_reserve, quote_decimals),
        );
        address
    }

    pub fn set_balance(&self, account: Pubkey, amount: TokenAmount) {
        self.balances.lock().unwrap().insert(account, amount);
    }

    /// Make every read of `account` fail with a transient error
    pub fn fail_balance(&self, account: Pubkey) {
        self.failing_balances.lock().unwrap().insert(account);
    }

    /// Fail the next `n` program-account scans with a transient error
    pub fn fail_scans(&self, n: u32) {
        self.scan_failures_left.store(n, Ordering::SeqCst);
    }

    /// Make every scan with a memcmp filter at `offset` fail with a
    /// transient error. Selects one role scan by its mint field offset.
    pub fn fail_scans_at(&self, offset: usize) {
        self.failing_offsets.lock().unwrap().insert(offset);
    }

    pub fn set_simulation_error(&self, err: serde_json::Value) {
        *self.simulation_error.lock().unwrap() = Some(err);
    }

    /// Status returned for every signature
    pub fn set_status(&self, status: Option<SignatureState>) {
        *self.status.lock().unwrap() = status;
    }

    /// Block height starts at `start` and grows by `step` per query
    pub fn set_block_height(&self, start: u64, step: u64) {
        self.height_start.store(start, Ordering::SeqCst);
        self.height_step.store(step, Ordering::SeqCst);
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn scan_calls(&self) -> u32 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn simulate_calls(&self) -> u32 {
        self.simulate_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn last_filters(&self) -> Vec<AccountFilter> {
        self.last_filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    fn endpoint(&self) -> &str {
        MOCK_ENDPOINT
    }

    async fn program_accounts(
        &self,
        _program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, RpcError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_filters.lock().unwrap() = filters.to_vec();

        let failing = self
            .scan_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let role_failing = {
            let failing_offsets = self.failing_offsets.lock().unwrap();
            filters.iter().any(|filter| {
                matches!(filter, AccountFilter::Memcmp { offset, .. } if failing_offsets.contains(offset))
            })
        };
        if failing || role_failing {
            return Err(transport_error());
        }

        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|keyed| matches_filters(&keyed.data, filters))
            .cloned()
            .collect())
    }

    async fn token_account_balance(&self, account: &Pubkey) -> Result<TokenAmount, RpcError> {
        if self.failing_balances.lock().unwrap().contains(account) {
            return Err(transport_error());
        }
        self.balances
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .ok_or_else(|| RpcError::AccountNotFound {
                account: account.to_string(),
                endpoint: MOCK_ENDPOINT.to_string(),
            })
    }

    async fn latest_blockhash(&self) -> Result<LatestBlockhash, RpcError> {
        Ok(LatestBlockhash {
            blockhash: self.blockhash,
            last_valid_block_height: self.last_valid_block_height,
        })
    }

    async fn simulate_transaction(
        &self,
        _tx: &VersionedTransaction,
    ) -> Result<SimulationReport, RpcError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SimulationReport {
            err: self.simulation_error.lock().unwrap().clone(),
            logs: vec!["Program log: mock".to_string()],
            units_consumed: Some(42_000),
        })
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<SignatureState>, RpcError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().unwrap().clone())
    }

    async fn block_height(&self) -> Result<u64, RpcError> {
        let n = self.height_calls.fetch_add(1, Ordering::SeqCst);
        let start = self.height_start.load(Ordering::SeqCst);
        let step = self.height_step.load(Ordering::SeqCst);
        Ok(start + n * step)
    }
}
