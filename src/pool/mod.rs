//! Pool discovery and reserve reads
//!
//! [`ReserveReader`] locates PumpSwap pools for a mint with a filtered
//! program-account scan, reads both reserve balances, and selects the pool to
//! price or trade against. Nothing is cached: every trade attempt re-reads
//! pools and reserves.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::errors::TradeError;
use crate::metrics::metrics;
use crate::pricing::{Reserves, TokenAmount};
use crate::retry::RetryPolicy;
use crate::rpc::{AccountFilter, ChainRpc, KeyedAccount, RpcError};
use crate::tx_builder::instructions::{PUMP_AMM_PROGRAM_ID, WSOL_MINT};

pub mod layout;

pub use layout::{AccountLayout, FieldSpec, LayoutError, PoolAccount, ACTIVE_POOL_LAYOUT};

/// Which pool field the queried mint occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MintRole {
    Base,
    Quote,
}

impl fmt::Display for MintRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintRole::Base => write!(f, "base"),
            MintRole::Quote => write!(f, "quote"),
        }
    }
}

/// A pool found by a mint scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRecord {
    pub address: Pubkey,
    pub role: MintRole,
    pub account: PoolAccount,
}

impl PoolRecord {
    /// Whether the trade instruction can target this pool: queried mint
    /// as base and wrapped SOL as quote.
    pub fn is_tradable(&self) -> bool {
        self.role == MintRole::Base && self.account.quote_mint == WSOL_MINT
    }
}

/// Pool together with both reserves from the same read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedPool {
    pub record: PoolRecord,
    pub reserves: Reserves,
}

impl PricedPool {
    pub fn address(&self) -> Pubkey {
        self.record.address
    }

    pub fn spot_price(&self) -> Option<f64> {
        self.reserves.spot_price()
    }
}

/// Reads pools and reserves through a [`ChainRpc`]
#[derive(Clone)]
pub struct ReserveReader {
    rpc: Arc<dyn ChainRpc>,
    retry: RetryPolicy,
    layout: &'static AccountLayout,
}

impl ReserveReader {
    pub fn new(rpc: Arc<dyn ChainRpc>, retry: RetryPolicy) -> Self {
        Self {
            rpc,
            retry,
            layout: ACTIVE_POOL_LAYOUT,
        }
    }

    pub fn with_layout(mut self, layout: &'static AccountLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
        &self.rpc
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Scan for pools where `mint` sits at the field selected by `role`.
    ///
    /// Exhausting retries yields [`TradeError::NotFound`]. An empty scan is
    /// not an error here; selection functions decide.
    pub async fn find_pools_by_mint(
        &self,
        mint: &Pubkey,
        role: MintRole,
    ) -> Result<Vec<PoolRecord>, TradeError> {
        let filters = vec![
            AccountFilter::DataSize(self.layout.data_size),
            AccountFilter::Memcmp {
                offset: self.layout.mint_field(role).offset,
                bytes: mint.to_bytes().to_vec(),
            },
        ];

        let accounts = self.scan(mint, &filters).await?;
        Ok(self.decode_all(accounts, role))
    }

    /// Pools with `mint` as base and wrapped SOL as quote, in one scan
    pub async fn base_quote_pools(&self, mint: &Pubkey) -> Result<Vec<PoolRecord>, TradeError> {
        let filters = vec![
            AccountFilter::DataSize(self.layout.data_size),
            AccountFilter::Memcmp {
                offset: self.layout.base_mint.offset,
                bytes: mint.to_bytes().to_vec(),
            },
            AccountFilter::Memcmp {
                offset: self.layout.quote_mint.offset,
                bytes: WSOL_MINT.to_bytes().to_vec(),
            },
        ];

        let accounts = self.scan(mint, &filters).await?;
        Ok(self.decode_all(accounts, MintRole::Base))
    }

    async fn scan(
        &self,
        mint: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, TradeError> {
        let rpc = &self.rpc;
        self.retry
            .run("find_pools_by_mint", || {
                rpc.program_accounts(&PUMP_AMM_PROGRAM_ID, filters)
            })
            .await
            .map_err(|e| {
                metrics().pools_not_found.inc();
                warn!(mint = %mint, error = %e, "Pool scan failed after retries");
                TradeError::not_found(mint)
            })
    }

    fn decode_all(&self, accounts: Vec<KeyedAccount>, role: MintRole) -> Vec<PoolRecord> {
        accounts
            .into_iter()
            .filter_map(|keyed| match PoolAccount::decode(self.layout, &keyed.data) {
                Ok(account) => Some(PoolRecord {
                    address: keyed.pubkey,
                    role,
                    account,
                }),
                Err(e) => {
                    warn!(pool = %keyed.pubkey, error = %e, "Skipping undecodable pool account");
                    None
                }
            })
            .collect()
    }

    /// Read both reserve balances of a pool.
    ///
    /// Either read failing after retries discards the whole pool with
    /// [`TradeError::ReserveUnavailable`]; reserves are never zero-filled.
    pub async fn read_reserves(&self, pool: &PoolRecord) -> Result<Reserves, TradeError> {
        let (base, quote) = tokio::try_join!(
            self.balance(&pool.account.pool_base_token_account),
            self.balance(&pool.account.pool_quote_token_account),
        )
        .map_err(|e| {
            metrics().reserve_reads_failed.inc();
            TradeError::reserve_unavailable(pool.address, e)
        })?;

        debug!(
            pool = %pool.address,
            base = base.raw,
            quote = quote.raw,
            "Reserves read"
        );
        Ok(Reserves { base, quote })
    }

    async fn balance(&self, account: &Pubkey) -> Result<TokenAmount, RpcError> {
        let rpc = &self.rpc;
        self.retry
            .run("token_account_balance", || rpc.token_account_balance(account))
            .await
    }

    /// Price every candidate concurrently, drop the unreadable ones, and
    /// order by human-scaled quote reserve, deepest first. Pools quoted in
    /// tokens of different decimals compare on `ui()`, never on raw units.
    pub async fn price_pools(&self, records: Vec<PoolRecord>) -> Vec<PricedPool> {
        let reads = records.iter().map(|record| self.read_reserves(record));
        let results = join_all(reads).await;

        let mut priced: Vec<PricedPool> = records
            .into_iter()
            .zip(results)
            .filter_map(|(record, result)| match result {
                Ok(reserves) => Some(PricedPool { record, reserves }),
                Err(e) => {
                    warn!(pool = %record.address, error = %e, "Discarding pool");
                    None
                }
            })
            .collect();

        priced.sort_by(|a, b| b.reserves.quote.ui().total_cmp(&a.reserves.quote.ui()));
        priced
    }

    /// Pools holding `mint` in either role, with reserves, deepest first.
    ///
    /// The base-role and quote-role scans run concurrently. One failing scan
    /// is tolerated as long as the other succeeds.
    pub async fn pools_with_reserves(&self, mint: &Pubkey) -> Result<Vec<PricedPool>, TradeError> {
        let (as_base, as_quote) = tokio::join!(
            self.find_pools_by_mint(mint, MintRole::Base),
            self.find_pools_by_mint(mint, MintRole::Quote),
        );

        let records = match (as_base, as_quote) {
            (Err(e), Err(_)) => return Err(e),
            (Ok(base), Err(e)) | (Err(e), Ok(base)) => {
                warn!(mint = %mint, error = %e, "One pool scan failed, continuing with the other");
                base
            }
            (Ok(mut base), Ok(quote)) => {
                base.extend(quote);
                base
            }
        };

        Ok(self.price_pools(records).await)
    }

    /// Deepest pool for `mint` in either role
    pub async fn canonical_pool(&self, mint: &Pubkey) -> Result<PricedPool, TradeError> {
        let pool = self
            .pools_with_reserves(mint)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TradeError::not_found(mint))?;

        info!(
            mint = %mint,
            pool = %pool.address(),
            role = %pool.record.role,
            quote_reserve = pool.reserves.quote.raw,
            quote_reserve_ui = pool.reserves.quote.ui(),
            "Canonical pool selected"
        );
        Ok(pool)
    }

    /// Deepest pool the trade instruction can target (mint as base, WSOL as quote)
    pub async fn tradable_pool(&self, mint: &Pubkey) -> Result<PricedPool, TradeError> {
        let records: Vec<PoolRecord> = self
            .find_pools_by_mint(mint, MintRole::Base)
            .await?
            .into_iter()
            .filter(PoolRecord::is_tradable)
            .collect();

        let pool = self
            .price_pools(records)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| {
                metrics().pools_not_found.inc();
                TradeError::not_found(mint)
            })?;

        info!(
            mint = %mint,
            pool = %pool.address(),
            quote_reserve = pool.reserves.quote.raw,
            "Tradable pool selected"
        );
        Ok(pool)
    }
}
