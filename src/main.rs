//! PumpSwap trading CLI
//!
//! Thin harness over the library: loads configuration and the wallet,
//! builds the RPC client and the configured relay, then runs one command.
//!
//! ```text
//! pumpswap price --mint <MINT>
//! pumpswap quote --mint <MINT> --sol 0.5
//! pumpswap buy   --mint <MINT> --sol 0.5
//! pumpswap sell  --mint <MINT> --amount 1250.5
//! pumpswap sell  --mint <MINT> --percent 50
//! ```

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pumpswap_relay::config::{Config, RelayKind};
use pumpswap_relay::metrics::metrics;
use pumpswap_relay::pricing::{parse_ui_amount, to_ui_amount, NATIVE_DECIMALS, TOKEN_DECIMALS};
use pumpswap_relay::relay::{BundleRelay, RelayStrategy, SingleEndpointRelay};
use pumpswap_relay::rpc::solana::parse_commitment;
use pumpswap_relay::{
    ChainRpc, PumpSwapTrader, ReserveReader, SolanaRpc, TradeOutcome, WalletManager,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print prometheus metrics after the command
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Spot price of a mint from its deepest pool
    Price {
        #[arg(long)]
        mint: String,
    },
    /// Tokens a buy would return, without sending anything
    Quote {
        #[arg(long)]
        mint: String,
        /// SOL to spend, e.g. 0.25
        #[arg(long)]
        sol: String,
    },
    /// Buy a token with SOL
    Buy {
        #[arg(long)]
        mint: String,
        /// SOL to spend, e.g. 0.25
        #[arg(long)]
        sol: String,
    },
    /// Sell a token for SOL
    Sell(SellArgs),
}

#[derive(ClapArgs, Debug)]
struct SellArgs {
    #[arg(long)]
    mint: String,
    /// Token amount in whole units, e.g. 1250.5
    #[arg(long, conflicts_with = "percent", required_unless_present = "percent")]
    amount: Option<String>,
    /// Percentage of the wallet balance, 0-100
    #[arg(long)]
    percent: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting pumpswap");

    let config = load_config(&args.config)?;
    let signs = matches!(args.command, Command::Buy { .. } | Command::Sell(_));
    let trader = build_trader(&config, signs)?;

    let result = run(&trader, args.command).await;

    if args.print_metrics {
        print!("{}", metrics().render()?);
    }
    result
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "pumpswap_relay=debug,pumpswap=debug,info"
    } else {
        "pumpswap_relay=info,pumpswap=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    let path = if std::path::Path::new(path).exists() {
        Some(path)
    } else {
        warn!(path, "Config file not found, using defaults");
        None
    };
    Config::load(path)
        .with_context(|| format!("Failed to load config from {}", path.unwrap_or("defaults")))
}

fn load_wallet(config: &Config) -> Result<WalletManager> {
    if let Some(secret) = &config.wallet.private_key {
        return WalletManager::from_base58(secret).context("Failed to load PRIVATE_KEY");
    }
    match &config.wallet.keypair_path {
        Some(path) => WalletManager::from_file(path).context("Failed to load wallet"),
        None => bail!("No wallet configured: set PRIVATE_KEY or wallet.keypair_path"),
    }
}

fn build_relay(config: &Config, rpc: Arc<dyn ChainRpc>) -> Result<Arc<dyn RelayStrategy>> {
    let http = reqwest::Client::builder()
        .timeout(config.rpc_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let confirm = config.confirm_settings();

    let relay: Arc<dyn RelayStrategy> = match config.relay.strategy {
        RelayKind::Bundle => {
            let bundle = &config.relay.bundle;
            Arc::new(BundleRelay::new(
                rpc,
                http,
                bundle.endpoints.clone(),
                config.bundle_tip_accounts()?,
                bundle.tip_lamports,
                confirm,
            )?)
        }
        RelayKind::Single => {
            let single = &config.relay.single;
            Arc::new(SingleEndpointRelay::new(
                rpc,
                http,
                single.endpoints.clone(),
                single.api_keys.clone(),
                config.single_tip_accounts()?,
                single.tip_lamports,
                confirm,
            )?)
        }
    };
    Ok(relay)
}

fn build_trader(config: &Config, signs: bool) -> Result<PumpSwapTrader> {
    let commitment = parse_commitment(&config.rpc.commitment)?;
    let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(
        &config.rpc.url,
        commitment,
        config.rpc_timeout(),
    ));
    info!(endpoint = rpc.endpoint(), commitment = %config.rpc.commitment, "RPC client ready");

    // Read-only commands never sign
    let wallet = if signs {
        load_wallet(config)?
    } else {
        WalletManager::from_keypair(Keypair::new())
    };
    if signs {
        info!(wallet = %wallet.pubkey(), "Wallet loaded");
    }

    let reader = ReserveReader::new(Arc::clone(&rpc), config.retry_policy());
    let relay = build_relay(config, rpc)?;
    info!(relay = relay.name(), "Relay configured");

    Ok(PumpSwapTrader::new(reader, relay, wallet)
        .with_slippage_bps(config.trading.slippage_bps)
        .with_compute_budget(config.compute_budget()))
}

fn parse_mint(mint: &str) -> Result<Pubkey> {
    Pubkey::from_str(mint).with_context(|| format!("Invalid mint address: {}", mint))
}

async fn run(trader: &PumpSwapTrader, command: Command) -> Result<()> {
    match command {
        Command::Price { mint } => {
            let mint = parse_mint(&mint)?;
            let price = trader.price(&mint).await?;
            println!("{} price: {:.12}", mint, price);
            Ok(())
        }
        Command::Quote { mint, sol } => {
            let mint = parse_mint(&mint)?;
            let lamports = parse_ui_amount(&sol, NATIVE_DECIMALS)?;
            let quote = trader.quote_buy(&mint, lamports).await?;
            println!(
                "{} SOL buys {} tokens (max spend {} SOL at {} bps slippage)",
                to_ui_amount(quote.quote_in, NATIVE_DECIMALS),
                to_ui_amount(quote.base_out, TOKEN_DECIMALS),
                to_ui_amount(quote.max_quote_in, NATIVE_DECIMALS),
                trader.slippage_bps(),
            );
            Ok(())
        }
        Command::Buy { mint, sol } => {
            let mint = parse_mint(&mint)?;
            let lamports = parse_ui_amount(&sol, NATIVE_DECIMALS)?;
            report(trader.buy(&mint, lamports).await)
        }
        Command::Sell(sell) => {
            let mint = parse_mint(&sell.mint)?;
            let outcome = match (sell.amount, sell.percent) {
                (Some(amount), _) => {
                    let raw = parse_ui_amount(&amount, TOKEN_DECIMALS)?;
                    trader.sell(&mint, raw).await
                }
                (None, Some(percent)) => trader.sell_percentage(&mint, percent / 100.0).await,
                (None, None) => bail!("Either --amount or --percent is required"),
            };
            report(outcome)
        }
    }
}

fn report(outcome: TradeOutcome) -> Result<()> {
    match outcome {
        TradeOutcome::Success {
            signature,
            trade_signature,
        } => {
            println!("confirmed: {}", trade_signature);
            if signature != trade_signature {
                println!("tracked via tip transaction: {}", signature);
            }
            Ok(())
        }
        TradeOutcome::Failure { reason, signature } => {
            if let Some(signature) = signature {
                println!("last signature (may still land): {}", signature);
            }
            bail!("{} trade failed: {}", reason.category(), reason)
        }
    }
}
