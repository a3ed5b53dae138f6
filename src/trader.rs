//! Trade orchestration
//!
//! [`PumpSwapTrader`] wires the pipeline together for one invocation:
//! pool selection, sizing, instruction plan, relay tip, fresh blockhash,
//! assembly, and relay submission. Trading entry points return a
//! [`TradeOutcome`]; read-only helpers return `Result`.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use tracing::Instrument;

use crate::errors::{TradeError, TradeOutcome};
use crate::metrics::{metrics, Timer};
use crate::observability::TradeLogger;
use crate::pool::{MintRole, ReserveReader};
use crate::pricing::{
    buy_quote, sell_quote, BuyQuote, PricingError, Reserves, SellQuote, BPS_DENOMINATOR,
};
use crate::relay::{RelayReceipt, RelayStrategy};
use crate::tx_builder::{
    assemble, plan_buy, plan_sell, ComputeBudget, InstructionPlan, TradeAccounts, TradeAction,
};
use crate::wallet::WalletManager;

/// Default slippage tolerance, 10%
pub const DEFAULT_SLIPPAGE_BPS: u64 = 1_000;

/// Fixed-point scale for sell fractions; resolution is 1e-9 of the balance
const FRACTION_SCALE: u128 = 1_000_000_000;

pub struct PumpSwapTrader {
    reader: ReserveReader,
    relay: Arc<dyn RelayStrategy>,
    wallet: WalletManager,
    slippage_bps: u64,
    budget: ComputeBudget,
}

impl PumpSwapTrader {
    pub fn new(reader: ReserveReader, relay: Arc<dyn RelayStrategy>, wallet: WalletManager) -> Self {
        Self {
            reader,
            relay,
            wallet,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            budget: ComputeBudget::default(),
        }
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u64) -> Self {
        self.slippage_bps = slippage_bps.min(BPS_DENOMINATOR);
        self
    }

    pub fn with_compute_budget(mut self, budget: ComputeBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn slippage_bps(&self) -> u64 {
        self.slippage_bps
    }

    pub fn relay_name(&self) -> &'static str {
        self.relay.name()
    }

    /// Spot price of `mint` in units of its pool counterpart, from the
    /// deepest pool holding it in either role.
    pub async fn price(&self, mint: &Pubkey) -> Result<f64, TradeError> {
        let pool = self.reader.canonical_pool(mint).await?;
        let reserves = pool.reserves;
        let empty = || {
            TradeError::Pricing(PricingError::EmptyReserves {
                reserve_in: reserves.base.raw,
                reserve_out: reserves.quote.raw,
            })
        };

        let quote_per_base = pool.spot_price().ok_or_else(empty)?;
        match pool.record.role {
            MintRole::Base => Ok(quote_per_base),
            // Mint is the quote side: invert to price it in base units
            MintRole::Quote if quote_per_base > 0.0 => Ok(1.0 / quote_per_base),
            MintRole::Quote => Err(empty()),
        }
    }

    /// Tokens a buy paying `lamports` would return at current reserves
    pub async fn quote_buy(&self, mint: &Pubkey, lamports: u64) -> Result<BuyQuote, TradeError> {
        let pool = self.reader.tradable_pool(mint).await?;
        Ok(buy_quote(lamports, &pool.reserves, self.slippage_bps)?)
    }

    /// Lamports a sell of `raw_tokens` would return at current reserves
    pub async fn quote_sell(&self, mint: &Pubkey, raw_tokens: u64) -> Result<SellQuote, TradeError> {
        let pool = self.reader.tradable_pool(mint).await?;
        Ok(sell_quote(raw_tokens, &pool.reserves, self.slippage_bps)?)
    }

    /// Spend `lamports` of SOL on `mint`
    pub async fn buy(&self, mint: &Pubkey, lamports: u64) -> TradeOutcome {
        self.execute(TradeAction::Buy, mint, lamports).await
    }

    /// Sell `raw_tokens` base units of `mint`
    pub async fn sell(&self, mint: &Pubkey, raw_tokens: u64) -> TradeOutcome {
        self.execute(TradeAction::Sell, mint, raw_tokens).await
    }

    /// Sell `fraction` (0, 1] of the wallet's current `mint` balance
    pub async fn sell_percentage(&self, mint: &Pubkey, fraction: f64) -> TradeOutcome {
        match self.percentage_amount(mint, fraction).await {
            Ok(amount) => self.sell(mint, amount).await,
            Err(e) => {
                metrics().trades_total.inc();
                metrics().trades_failed.inc();
                TradeLogger::new("sell", *mint).log_failure(&e, 0);
                TradeOutcome::failure(e)
            }
        }
    }

    /// Base units corresponding to `fraction` of the wallet balance.
    ///
    /// The fraction is rounded to 1e-9 and applied in u128, then the result
    /// is floored to whole base units. A fraction of 1.0 sells the full
    /// balance.
    pub async fn percentage_amount(&self, mint: &Pubkey, fraction: f64) -> Result<u64, TradeError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(PricingError::InvalidAmount(format!(
                "sell fraction {} outside (0, 1]",
                fraction
            ))
            .into());
        }
        let scaled = (fraction * FRACTION_SCALE as f64).round() as u128;

        let token_account = get_associated_token_address(&self.wallet.pubkey(), mint);
        let rpc = self.reader.rpc();
        let balance = self
            .reader
            .retry_policy()
            .run("token_account_balance", || rpc.token_account_balance(&token_account))
            .await?;

        let amount = (balance.raw as u128 * scaled / FRACTION_SCALE) as u64;
        if amount == 0 {
            return Err(PricingError::InvalidAmount(format!(
                "nothing to sell: balance {} of {}",
                balance.raw, mint
            ))
            .into());
        }
        Ok(amount)
    }

    async fn execute(&self, action: TradeAction, mint: &Pubkey, amount: u64) -> TradeOutcome {
        let logger = TradeLogger::new(action.as_str(), *mint);
        let span = logger.span();

        async {
            metrics().trades_total.inc();
            let timer = Timer::new();
            logger.log_attempt(amount, self.slippage_bps);

            let result = self.run_pipeline(action, mint, amount, &logger).await;
            timer.observe_duration(&metrics().trade_latency);

            match &result {
                Ok(receipt) => {
                    metrics().trades_success.inc();
                    logger.log_success(&receipt.trade_signature.to_string(), timer.elapsed_ms());
                }
                Err(e) => {
                    metrics().trades_failed.inc();
                    logger.log_failure(e, timer.elapsed_ms());
                }
            }

            TradeOutcome::from(result.map(|r| (r.signature, r.trade_signature)))
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(
        &self,
        action: TradeAction,
        mint: &Pubkey,
        amount: u64,
        logger: &TradeLogger,
    ) -> Result<RelayReceipt, TradeError> {
        if amount == 0 {
            return Err(PricingError::InvalidAmount("trade amount is zero".to_string()).into());
        }

        let pool = self.reader.tradable_pool(mint).await?;
        let payer = self.wallet.pubkey();
        let accounts = TradeAccounts::derive(
            pool.address(),
            payer,
            pool.record.account.base_mint,
            pool.record.account.quote_mint,
        );

        let mut plan = self.plan(action, &accounts, amount, &pool.reserves, logger)?;
        plan.append_tips(self.relay.inline_tip(&payer)?);

        let rpc = self.reader.rpc();
        let blockhash = self
            .reader
            .retry_policy()
            .run("latest_blockhash", || rpc.latest_blockhash())
            .await
            .map_err(|e| TradeError::Blockhash(e.to_string()))?;

        let tx = assemble(plan, &[self.wallet.keypair()], blockhash)?;
        self.relay.submit(tx, self.wallet.keypair()).await
    }

    fn plan(
        &self,
        action: TradeAction,
        accounts: &TradeAccounts,
        amount: u64,
        reserves: &Reserves,
        logger: &TradeLogger,
    ) -> Result<InstructionPlan, TradeError> {
        match action {
            TradeAction::Buy => {
                let quote = buy_quote(amount, reserves, self.slippage_bps)?;
                if quote.base_out == 0 {
                    return Err(PricingError::InvalidAmount(format!(
                        "{} lamports buys zero tokens",
                        amount
                    ))
                    .into());
                }
                logger.log_sized(&accounts.pool, quote.base_out, quote.max_quote_in);
                plan_buy(accounts, quote.base_out, quote.max_quote_in, self.budget)
            }
            TradeAction::Sell => {
                let quote = sell_quote(amount, reserves, self.slippage_bps)?;
                logger.log_sized(&accounts.pool, quote.base_in, quote.min_quote_out);
                plan_sell(accounts, quote.base_in, quote.min_quote_out, self.budget)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{TokenAmount, TOKEN_DECIMALS};
    use crate::retry::RetryPolicy;
    use crate::test_utils::{pool_fixture, MockRpc};
    use crate::tx_builder::{AssembledTransaction, TradePayload, PUMP_AMM_PROGRAM_ID, WSOL_MINT};
    use async_trait::async_trait;
    use solana_sdk::instruction::Instruction;
    use solana_sdk::signature::{Keypair, Signature, Signer};
    use std::sync::Mutex;

    /// Records submitted transactions and answers with a fixed result
    struct RecordingRelay {
        submitted: Mutex<Vec<AssembledTransaction>>,
        reject: bool,
        tip: Option<Pubkey>,
    }

    impl RecordingRelay {
        fn new(reject: bool, tip: Option<Pubkey>) -> Arc<Self> {
            Arc::new(Self {
                submitted: Mutex::new(Vec::new()),
                reject,
                tip,
            })
        }
    }

    #[async_trait]
    impl RelayStrategy for RecordingRelay {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn inline_tip(&self, payer: &Pubkey) -> Result<Vec<Instruction>, TradeError> {
            Ok(self
                .tip
                .map(|to| solana_sdk::system_instruction::transfer(payer, &to, 1_000_000))
                .into_iter()
                .collect())
        }

        async fn submit(
            &self,
            tx: AssembledTransaction,
            _signer: &Keypair,
        ) -> Result<RelayReceipt, TradeError> {
            let signature = tx.signature();
            self.submitted.lock().unwrap().push(tx);
            if self.reject {
                return Err(TradeError::RelayRejected { signature });
            }
            Ok(RelayReceipt {
                signature,
                trade_signature: signature,
            })
        }
    }

    fn trader(rpc: Arc<MockRpc>, relay: Arc<RecordingRelay>, wallet: WalletManager) -> PumpSwapTrader {
        PumpSwapTrader::new(ReserveReader::new(rpc, RetryPolicy::default()), relay, wallet)
            .with_slippage_bps(100)
    }

    fn trade_payload(tx: &AssembledTransaction) -> TradePayload {
        let message = &tx.transaction.message;
        let keys = message.static_account_keys();
        let ix = message
            .instructions()
            .iter()
            .find(|ix| keys[ix.program_id_index as usize] == PUMP_AMM_PROGRAM_ID)
            .expect("trade instruction present");
        TradePayload::decode(&ix.data).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_sizes_from_reserves() {
        let mint = Pubkey::new_unique();
        let rpc = Arc::new(MockRpc::new());
        rpc.add_pool(pool_fixture(mint, WSOL_MINT), 1_000_000_000, 100_000_000_000);
        let relay = RecordingRelay::new(false, None);
        let t = trader(rpc, relay.clone(), WalletManager::from_keypair(Keypair::new()));

        let outcome = t.buy(&mint, 1_000_000_000).await;
        assert!(outcome.is_success(), "{:?}", outcome);

        let submitted = relay.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let payload = trade_payload(&submitted[0]);
        assert_eq!(payload.action, TradeAction::Buy);
        assert_eq!(payload.amount_a, 9_900_990);
        assert_eq!(payload.amount_b, 1_010_000_000);
        assert_eq!(outcome.signature(), Some(submitted[0].signature()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_applies_min_output() {
        let mint = Pubkey::new_unique();
        let rpc = Arc::new(MockRpc::new());
        rpc.add_pool(pool_fixture(mint, WSOL_MINT), 1_000_000_000, 100_000_000_000);
        let relay = RecordingRelay::new(false, None);
        let t = trader(rpc, relay.clone(), WalletManager::from_keypair(Keypair::new()));

        assert!(t.sell(&mint, 10_000_000).await.is_success());

        let payload = trade_payload(&relay.submitted.lock().unwrap()[0]);
        assert_eq!(payload.action, TradeAction::Sell);
        assert_eq!(payload.amount_a, 10_000_000);
        // 990_099_009 out, minus 1%
        assert_eq!(payload.amount_b, 980_198_019);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_tip_lands_after_trade() {
        let mint = Pubkey::new_unique();
        let tip_account = Pubkey::new_unique();
        let rpc = Arc::new(MockRpc::new());
        rpc.add_pool(pool_fixture(mint, WSOL_MINT), 1_000_000_000, 100_000_000_000);
        let relay = RecordingRelay::new(false, Some(tip_account));
        let t = trader(rpc.clone(), relay.clone(), WalletManager::from_keypair(Keypair::new()));

        assert!(t.sell(&mint, 1_000).await.is_success());

        let submitted = relay.submitted.lock().unwrap();
        let tx = &submitted[0];
        let keys = tx.transaction.message.static_account_keys();
        assert!(keys.contains(&tip_account));
        assert_eq!(*tx.transaction.message.recent_blockhash(), rpc.blockhash());
        assert_eq!(tx.last_valid_block_height, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pool_is_failure_without_signature() {
        let rpc = Arc::new(MockRpc::new());
        let relay = RecordingRelay::new(false, None);
        let t = trader(rpc, relay.clone(), WalletManager::from_keypair(Keypair::new()));

        let outcome = t.buy(&Pubkey::new_unique(), 1_000).await;
        match outcome {
            TradeOutcome::Failure { reason, signature } => {
                assert!(matches!(reason, TradeError::NotFound { .. }));
                assert!(signature.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(relay.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_rejection_keeps_signature() {
        let mint = Pubkey::new_unique();
        let rpc = Arc::new(MockRpc::new());
        rpc.add_pool(pool_fixture(mint, WSOL_MINT), 1_000_000, 1_000_000_000);
        let relay = RecordingRelay::new(true, None);
        let t = trader(rpc, relay.clone(), WalletManager::from_keypair(Keypair::new()));

        let outcome = t.buy(&mint, 1_000_000).await;
        assert!(!outcome.is_success());
        let sent: Signature = relay.submitted.lock().unwrap()[0].signature();
        assert_eq!(outcome.signature(), Some(sent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_amount_is_rejected_before_rpc() {
        let rpc = Arc::new(MockRpc::new());
        let t = trader(rpc.clone(), RecordingRelay::new(false, None), WalletManager::from_keypair(Keypair::new()));

        let outcome = t.sell(&Pubkey::new_unique(), 0).await;
        assert!(matches!(
            outcome,
            TradeOutcome::Failure { reason: TradeError::Pricing(_), .. }
        ));
        assert_eq!(rpc.scan_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_percentage_uses_wallet_balance() {
        let mint = Pubkey::new_unique();
        let wallet = WalletManager::from_keypair(Keypair::new());
        let rpc = Arc::new(MockRpc::new());
        rpc.add_pool(pool_fixture(mint, WSOL_MINT), 1_000_000_000, 100_000_000_000);
        rpc.set_balance(
            get_associated_token_address(&wallet.pubkey(), &mint),
            TokenAmount::new(4_000_000, TOKEN_DECIMALS),
        );
        let relay = RecordingRelay::new(false, None);
        let t = trader(rpc, relay.clone(), wallet);

        assert_eq!(t.percentage_amount(&mint, 0.25).await.unwrap(), 1_000_000);
        assert!(t.sell_percentage(&mint, 0.5).await.is_success());
        let payload = trade_payload(&relay.submitted.lock().unwrap()[0]);
        assert_eq!(payload.amount_a, 2_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_percentage_keeps_fine_fractions() {
        let mint = Pubkey::new_unique();
        let wallet = WalletManager::from_keypair(Keypair::new());
        let token_account = get_associated_token_address(&wallet.pubkey(), &mint);
        let rpc = Arc::new(MockRpc::new());
        rpc.set_balance(token_account, TokenAmount::new(3_000_000, TOKEN_DECIMALS));
        let t = trader(rpc.clone(), RecordingRelay::new(false, None), wallet);

        // Basis-point rounding would have given 999_900
        assert_eq!(t.percentage_amount(&mint, 0.33333).await.unwrap(), 999_990);
        assert_eq!(t.percentage_amount(&mint, 1.0).await.unwrap(), 3_000_000);
        assert_eq!(t.percentage_amount(&mint, 0.000001).await.unwrap(), 3);

        rpc.set_balance(token_account, TokenAmount::new(u64::MAX, TOKEN_DECIMALS));
        assert_eq!(t.percentage_amount(&mint, 1.0).await.unwrap(), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_percentage_rejects_bad_fraction_and_empty_balance() {
        let mint = Pubkey::new_unique();
        let wallet = WalletManager::from_keypair(Keypair::new());
        let rpc = Arc::new(MockRpc::new());
        rpc.set_balance(
            get_associated_token_address(&wallet.pubkey(), &mint),
            TokenAmount::new(0, TOKEN_DECIMALS),
        );
        let t = trader(rpc, RecordingRelay::new(false, None), wallet);

        assert!(t.percentage_amount(&mint, 0.0).await.is_err());
        assert!(t.percentage_amount(&mint, 1.5).await.is_err());
        assert!(t.percentage_amount(&mint, f64::NAN).await.is_err());
        assert!(!t.sell_percentage(&mint, 1.0).await.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_in_both_roles() {
        let mint = Pubkey::new_unique();
        let rpc = Arc::new(MockRpc::new());
        // 1_000 tokens (6 dp) against 10 SOL (9 dp)
        rpc.add_pool(pool_fixture(mint, WSOL_MINT), 1_000_000_000, 10_000_000_000);
        let t = trader(rpc, RecordingRelay::new(false, None), WalletManager::from_keypair(Keypair::new()));
        let price = t.price(&mint).await.unwrap();
        assert!((price - 0.01).abs() < 1e-12);

        // Mint on the quote side of a token/token pool
        let quote_mint = Pubkey::new_unique();
        let rpc = Arc::new(MockRpc::new());
        rpc.add_pool(pool_fixture(Pubkey::new_unique(), quote_mint), 2_000_000, 1_000_000);
        let t = trader(rpc, RecordingRelay::new(false, None), WalletManager::from_keypair(Keypair::new()));
        let price = t.price(&quote_mint).await.unwrap();
        assert!((price - 2.0).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_buy_matches_reserves() {
        let mint = Pubkey::new_unique();
        let rpc = Arc::new(MockRpc::new());
        rpc.add_pool(pool_fixture(mint, WSOL_MINT), 1_000_000_000, 100_000_000_000);
        let t = trader(rpc, RecordingRelay::new(false, None), WalletManager::from_keypair(Keypair::new()));

        let quote = t.quote_buy(&mint, 1_000_000_000).await.unwrap();
        assert_eq!(quote.base_out, 9_900_990);
        assert_eq!(quote.max_quote_in, 1_010_000_000);
    }
}
