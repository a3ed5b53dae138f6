//! Trade transaction building
//!
//! - **instructions**: PumpSwap program constants, the 17-account trade
//!   instruction, and its 24-byte payload
//! - **assemble**: ordered instruction plans (budget, setup, trade, cleanup),
//!   ordering validation, and V0 compile + sign
//!
//! Nothing here touches the network. The blockhash is fetched by the caller
//! and passed in.

pub mod assemble;
pub mod instructions;

pub use assemble::{
    assemble, plan_buy, plan_sell, sanity_check_ix_order, serialize_transaction,
    sign_instructions, AssembledTransaction, ComputeBudget, InstructionPlan,
};
pub use instructions::{
    encode_trade, TradeAccounts, TradeAction, TradePayload, PUMP_AMM_PROGRAM_ID, WSOL_MINT,
};
