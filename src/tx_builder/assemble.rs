//! Instruction planning, ordering validation, and signing
//!
//! A trade transaction always has the shape
//! 1. compute budget (exactly one CU limit, exactly one CU price)
//! 2. setup: idempotent ATA creation, WSOL funding + `sync_native`
//! 3. the PumpSwap trade instruction
//! 4. cleanup: close the WSOL account, then any inline relay tips
//!
//! [`sanity_check_ix_order`] enforces this on every assembly.

use solana_sdk::{
    compute_budget::{self, ComputeBudgetInstruction},
    hash::Hash,
    instruction::Instruction,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_instruction,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use spl_token::instruction::{close_account, sync_native};
use tracing::debug;

use super::instructions::{encode_trade, TradeAccounts, TradeAction, PUMP_AMM_PROGRAM_ID};
use crate::errors::TradeError;
use crate::rpc::LatestBlockhash;

const SET_COMPUTE_UNIT_LIMIT_TAG: u8 = 2;
const SET_COMPUTE_UNIT_PRICE_TAG: u8 = 3;
const CLOSE_ACCOUNT_TAG: u8 = 9;
const SYNC_NATIVE_TAG: u8 = 17;

/// Compute budget requested by a trade transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeBudget {
    pub unit_limit: u32,
    /// Priority fee in micro-lamports per compute unit
    pub unit_price: u64,
}

impl Default for ComputeBudget {
    fn default() -> Self {
        Self {
            unit_limit: 130_000,
            unit_price: 90_000,
        }
    }
}

/// Ordered instructions for one trade transaction
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub action: TradeAction,
    pub instructions: Vec<Instruction>,
}

impl InstructionPlan {
    /// Append relay tip instructions after cleanup
    pub fn append_tips(&mut self, tips: Vec<Instruction>) {
        self.instructions.extend(tips);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Index of the trade instruction, if present
    pub fn trade_index(&self) -> Option<usize> {
        self.instructions
            .iter()
            .position(|ix| ix.program_id == PUMP_AMM_PROGRAM_ID)
    }
}

fn budget_instructions(budget: ComputeBudget) -> [Instruction; 2] {
    [
        ComputeBudgetInstruction::set_compute_unit_limit(budget.unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(budget.unit_price),
    ]
}

fn close_wsol(accounts: &TradeAccounts) -> Result<Instruction, TradeError> {
    close_account(
        &accounts.token_program,
        &accounts.user_quote_token_account,
        &accounts.user,
        &accounts.user,
        &[],
    )
    .map_err(|e| TradeError::instruction_failed("spl_token::close_account", e.to_string()))
}

/// Plan a buy of `base_amount_out` tokens paying at most `max_quote_amount_in` lamports.
///
/// The WSOL account is funded with `max_quote_amount_in` and closed after the
/// trade, returning the unspent remainder.
pub fn plan_buy(
    accounts: &TradeAccounts,
    base_amount_out: u64,
    max_quote_amount_in: u64,
    budget: ComputeBudget,
) -> Result<InstructionPlan, TradeError> {
    let payer = accounts.user;
    let wsol_ata = accounts.user_quote_token_account;

    let mut instructions = Vec::with_capacity(8);
    instructions.extend(budget_instructions(budget));
    instructions.push(create_associated_token_account_idempotent(
        &payer,
        &accounts.user,
        &accounts.quote_mint,
        &accounts.token_program,
    ));
    instructions.push(system_instruction::transfer(
        &payer,
        &wsol_ata,
        max_quote_amount_in,
    ));
    instructions.push(
        sync_native(&accounts.token_program, &wsol_ata)
            .map_err(|e| TradeError::instruction_failed("spl_token::sync_native", e.to_string()))?,
    );
    instructions.push(create_associated_token_account_idempotent(
        &payer,
        &accounts.user,
        &accounts.base_mint,
        &accounts.token_program,
    ));
    instructions.push(encode_trade(
        TradeAction::Buy,
        accounts,
        base_amount_out,
        max_quote_amount_in,
    ));
    instructions.push(close_wsol(accounts)?);

    Ok(InstructionPlan {
        action: TradeAction::Buy,
        instructions,
    })
}

/// Plan a sell of `base_amount_in` tokens for at least `min_quote_amount_out` lamports.
pub fn plan_sell(
    accounts: &TradeAccounts,
    base_amount_in: u64,
    min_quote_amount_out: u64,
    budget: ComputeBudget,
) -> Result<InstructionPlan, TradeError> {
    let payer = accounts.user;

    let mut instructions = Vec::with_capacity(6);
    instructions.extend(budget_instructions(budget));
    instructions.push(create_associated_token_account_idempotent(
        &payer,
        &accounts.user,
        &accounts.quote_mint,
        &accounts.token_program,
    ));
    instructions.push(create_associated_token_account_idempotent(
        &payer,
        &accounts.user,
        &accounts.base_mint,
        &accounts.token_program,
    ));
    instructions.push(encode_trade(
        TradeAction::Sell,
        accounts,
        base_amount_in,
        min_quote_amount_out,
    ));
    // Unwrap the proceeds
    instructions.push(close_wsol(accounts)?);

    Ok(InstructionPlan {
        action: TradeAction::Sell,
        instructions,
    })
}

fn budget_tag(ix: &Instruction) -> Option<u8> {
    (ix.program_id == compute_budget::id())
        .then(|| ix.data.first().copied())
        .flatten()
}

fn is_setup(ix: &Instruction) -> bool {
    ix.program_id == spl_associated_token_account::ID
        || (ix.program_id == spl_token::ID && ix.data.first() == Some(&SYNC_NATIVE_TAG))
}

fn is_cleanup(ix: &Instruction) -> bool {
    ix.program_id == spl_token::ID && ix.data.first() == Some(&CLOSE_ACCOUNT_TAG)
}

/// Validate the phase ordering of a trade transaction.
///
/// # Errors
///
/// Returns [`TradeError::InvalidInstructionOrder`] if:
/// - the list is empty
/// - there is not exactly one CU-limit and one CU-price instruction
/// - a compute budget instruction follows a non-budget instruction
/// - there is not exactly one trade instruction
/// - a setup instruction follows the trade, or a cleanup instruction precedes it
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<(), TradeError> {
    if instructions.is_empty() {
        return Err(TradeError::InvalidInstructionOrder(
            "Instruction list is empty".to_string(),
        ));
    }

    let mut limits = 0;
    let mut prices = 0;
    let mut seen_non_budget = false;
    for (idx, ix) in instructions.iter().enumerate() {
        match budget_tag(ix) {
            Some(tag) => {
                if seen_non_budget {
                    return Err(TradeError::InvalidInstructionOrder(format!(
                        "Compute budget instruction at position {} follows program instructions",
                        idx
                    )));
                }
                match tag {
                    SET_COMPUTE_UNIT_LIMIT_TAG => limits += 1,
                    SET_COMPUTE_UNIT_PRICE_TAG => prices += 1,
                    _ => {}
                }
            }
            None => seen_non_budget = true,
        }
    }
    if limits != 1 || prices != 1 {
        return Err(TradeError::InvalidInstructionOrder(format!(
            "Expected one CU limit and one CU price instruction, found {} and {}",
            limits, prices
        )));
    }

    let trades: Vec<usize> = instructions
        .iter()
        .enumerate()
        .filter(|(_, ix)| ix.program_id == PUMP_AMM_PROGRAM_ID)
        .map(|(idx, _)| idx)
        .collect();
    let trade_idx = match trades.as_slice() {
        [idx] => *idx,
        _ => {
            return Err(TradeError::InvalidInstructionOrder(format!(
                "Expected exactly one trade instruction, found {}",
                trades.len()
            )))
        }
    };

    for (idx, ix) in instructions.iter().enumerate() {
        if idx > trade_idx && is_setup(ix) {
            return Err(TradeError::InvalidInstructionOrder(format!(
                "Setup instruction at position {} follows the trade at {}",
                idx, trade_idx
            )));
        }
        if idx < trade_idx && is_cleanup(ix) {
            return Err(TradeError::InvalidInstructionOrder(format!(
                "Cleanup instruction at position {} precedes the trade at {}",
                idx, trade_idx
            )));
        }
    }

    Ok(())
}

/// Signed, single-use trade transaction.
///
/// Relay strategies take it by value; retrying means assembling a new one
/// against a fresh blockhash.
#[derive(Debug)]
pub struct AssembledTransaction {
    pub transaction: VersionedTransaction,
    pub payer: Pubkey,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl AssembledTransaction {
    pub fn signature(&self) -> Signature {
        self.transaction.signatures[0]
    }

    /// Wire bytes of the signed transaction
    pub fn serialize(&self) -> Result<Vec<u8>, TradeError> {
        serialize_transaction(&self.transaction)
    }
}

pub fn serialize_transaction(tx: &VersionedTransaction) -> Result<Vec<u8>, TradeError> {
    bincode::serialize(tx).map_err(|e| TradeError::Signing(format!("serialize: {}", e)))
}

/// Compile `instructions` into a V0 message and sign with `signers`
/// (the first signer pays fees).
pub fn sign_instructions(
    instructions: &[Instruction],
    signers: &[&Keypair],
    blockhash: Hash,
) -> Result<VersionedTransaction, TradeError> {
    let payer = signers
        .first()
        .ok_or_else(|| TradeError::Signing("No signer supplied".to_string()))?
        .pubkey();

    let message = MessageV0::try_compile(&payer, instructions, &[], blockhash).map_err(|e| {
        TradeError::instruction_failed("message", format!("Failed to compile message: {}", e))
    })?;

    VersionedTransaction::try_new(VersionedMessage::V0(message), signers)
        .map_err(|e| TradeError::Signing(e.to_string()))
}

/// Validate, compile, and sign a plan.
pub fn assemble(
    plan: InstructionPlan,
    signers: &[&Keypair],
    blockhash: LatestBlockhash,
) -> Result<AssembledTransaction, TradeError> {
    sanity_check_ix_order(&plan.instructions)?;

    let transaction = sign_instructions(&plan.instructions, signers, blockhash.blockhash)?;
    let payer = *transaction.message.static_account_keys().first().ok_or_else(|| {
        TradeError::Signing("Compiled message has no fee payer".to_string())
    })?;

    debug!(
        action = plan.action.as_str(),
        instructions = plan.instructions.len(),
        signature = %transaction.signatures[0],
        "Transaction assembled"
    );

    Ok(AssembledTransaction {
        transaction,
        payer,
        blockhash: blockhash.blockhash,
        last_valid_block_height: blockhash.last_valid_block_height,
    })
}
