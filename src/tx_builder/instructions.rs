//! PumpSwap trade instruction encoding
//!
//! The program takes a 24-byte payload (8-byte discriminator followed by two
//! little-endian u64 operands) and a fixed list of 17 accounts. Every address
//! besides the pool, trader, and mints is either a program constant or an
//! associated token account derived offline.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program,
};
use spl_associated_token_account::get_associated_token_address;

use crate::errors::TradeError;

pub const PUMP_AMM_PROGRAM_ID: Pubkey = pubkey!("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA");
pub const GLOBAL_CONFIG: Pubkey = pubkey!("ADyA8hdefvWN2dbGGWFotbzWxrAvLW83WG6QCVXvJKqw");
pub const EVENT_AUTHORITY: Pubkey = pubkey!("GS4CU59F31iL7aR2Q8zVS8DRrcRnXX1yjQ66TqNVQnaR");
pub const FEE_RECIPIENT: Pubkey = pubkey!("62qc2CNXwrYqQScmEdiZFFAnJR262PxWEuNQtxfafNgV");
/// Wrapped SOL token account of [`FEE_RECIPIENT`]
pub const FEE_RECIPIENT_ATA: Pubkey = pubkey!("94qWNrtmfn42h3ZjUZwWvK1MEo9uVmmrBPd2hpNjYDjb");
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

pub const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

pub const TRADE_PAYLOAD_LEN: usize = 24;
pub const TRADE_ACCOUNT_COUNT: usize = 17;

/// Trade direction, from the trader's point of view on the base token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    /// operands: `(base_amount_out, max_quote_amount_in)`
    Buy,
    /// operands: `(base_amount_in, min_quote_amount_out)`
    Sell,
}

impl TradeAction {
    pub fn discriminator(&self) -> [u8; 8] {
        match self {
            TradeAction::Buy => BUY_DISCRIMINATOR,
            TradeAction::Sell => SELL_DISCRIMINATOR,
        }
    }

    pub fn from_discriminator(bytes: &[u8]) -> Option<Self> {
        if bytes == BUY_DISCRIMINATOR {
            Some(TradeAction::Buy)
        } else if bytes == SELL_DISCRIMINATOR {
            Some(TradeAction::Sell)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
        }
    }
}

/// Every account the trade instruction references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeAccounts {
    pub pool: Pubkey,
    pub user: Pubkey,
    pub global_config: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub user_base_token_account: Pubkey,
    pub user_quote_token_account: Pubkey,
    pub pool_base_token_account: Pubkey,
    pub pool_quote_token_account: Pubkey,
    pub protocol_fee_recipient: Pubkey,
    pub protocol_fee_recipient_token_account: Pubkey,
    pub token_program: Pubkey,
    pub system_program: Pubkey,
    pub associated_token_program: Pubkey,
    pub event_authority: Pubkey,
    pub program: Pubkey,
}

impl TradeAccounts {
    /// Resolve the full account set without touching the network.
    pub fn derive(pool: Pubkey, user: Pubkey, base_mint: Pubkey, quote_mint: Pubkey) -> Self {
        Self {
            pool,
            user,
            global_config: GLOBAL_CONFIG,
            base_mint,
            quote_mint,
            user_base_token_account: get_associated_token_address(&user, &base_mint),
            user_quote_token_account: get_associated_token_address(&user, &quote_mint),
            pool_base_token_account: get_associated_token_address(&pool, &base_mint),
            pool_quote_token_account: get_associated_token_address(&pool, &quote_mint),
            protocol_fee_recipient: FEE_RECIPIENT,
            protocol_fee_recipient_token_account: FEE_RECIPIENT_ATA,
            token_program: spl_token::ID,
            system_program: system_program::ID,
            associated_token_program: spl_associated_token_account::ID,
            event_authority: EVENT_AUTHORITY,
            program: PUMP_AMM_PROGRAM_ID,
        }
    }

    /// Account metas in program order
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new_readonly(self.pool, false),
            AccountMeta::new(self.user, true),
            AccountMeta::new_readonly(self.global_config, false),
            AccountMeta::new_readonly(self.base_mint, false),
            AccountMeta::new_readonly(self.quote_mint, false),
            AccountMeta::new(self.user_base_token_account, false),
            AccountMeta::new(self.user_quote_token_account, false),
            AccountMeta::new(self.pool_base_token_account, false),
            AccountMeta::new(self.pool_quote_token_account, false),
            AccountMeta::new_readonly(self.protocol_fee_recipient, false),
            AccountMeta::new(self.protocol_fee_recipient_token_account, false),
            // base and quote token programs
            AccountMeta::new_readonly(self.token_program, false),
            AccountMeta::new_readonly(self.token_program, false),
            AccountMeta::new_readonly(self.system_program, false),
            AccountMeta::new_readonly(self.associated_token_program, false),
            AccountMeta::new_readonly(self.event_authority, false),
            AccountMeta::new_readonly(self.program, false),
        ]
    }
}

/// Decoded trade payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradePayload {
    pub action: TradeAction,
    pub amount_a: u64,
    pub amount_b: u64,
}

impl TradePayload {
    pub fn new(action: TradeAction, amount_a: u64, amount_b: u64) -> Self {
        Self {
            action,
            amount_a,
            amount_b,
        }
    }

    pub fn encode(&self) -> [u8; TRADE_PAYLOAD_LEN] {
        let mut data = [0u8; TRADE_PAYLOAD_LEN];
        data[..8].copy_from_slice(&self.action.discriminator());
        data[8..16].copy_from_slice(&self.amount_a.to_le_bytes());
        data[16..24].copy_from_slice(&self.amount_b.to_le_bytes());
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, TradeError> {
        if data.len() != TRADE_PAYLOAD_LEN {
            return Err(TradeError::instruction_failed(
                PUMP_AMM_PROGRAM_ID.to_string(),
                format!("payload is {} bytes, expected {}", data.len(), TRADE_PAYLOAD_LEN),
            ));
        }

        let action = TradeAction::from_discriminator(&data[..8]).ok_or_else(|| {
            TradeError::instruction_failed(PUMP_AMM_PROGRAM_ID.to_string(), "unknown discriminator")
        })?;
        let operand = |range: std::ops::Range<usize>| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[range]);
            u64::from_le_bytes(bytes)
        };

        Ok(Self {
            action,
            amount_a: operand(8..16),
            amount_b: operand(16..24),
        })
    }
}

/// Build the PumpSwap trade instruction.
///
/// For [`TradeAction::Buy`] the operands are `(base_amount_out,
/// max_quote_amount_in)`; for [`TradeAction::Sell`] they are
/// `(base_amount_in, min_quote_amount_out)`.
pub fn encode_trade(
    action: TradeAction,
    accounts: &TradeAccounts,
    amount_a: u64,
    amount_b: u64,
) -> Instruction {
    Instruction {
        program_id: PUMP_AMM_PROGRAM_ID,
        accounts: accounts.to_account_metas(),
        data: TradePayload::new(action, amount_a, amount_b).encode().to_vec(),
    }
}
