//! Constant-product pricing
//!
//! All sizing is integer math in base units. Quotes round in the pool's
//! favor: the `+ 1` on the post-trade output reserve means the trader never
//! receives a fractional unit the reserves cannot back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decimal exponent of the native asset (lamports per SOL)
pub const NATIVE_DECIMALS: u8 = 9;

/// Decimal exponent of tokens traded on PumpSwap
pub const TOKEN_DECIMALS: u8 = 6;

/// Basis-point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Pool has an empty reserve (in={reserve_in}, out={reserve_out})")]
    EmptyReserves { reserve_in: u64, reserve_out: u64 },

    #[error("Invalid decimal amount '{0}'")]
    InvalidAmount(String),

    #[error("Amount '{0}' overflows u64 base units")]
    Overflow(String),
}

/// Token quantity in base units together with its decimal exponent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: u64, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Human-scaled value, for display and spot price only
    pub fn ui(&self) -> f64 {
        to_ui_amount(self.raw, self.decimals)
    }
}

/// Both reserves of a pool, read in the same attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub base: TokenAmount,
    pub quote: TokenAmount,
}

impl Reserves {
    /// Quote units per base unit, human scaled. `None` for an empty base reserve.
    pub fn spot_price(&self) -> Option<f64> {
        let base = self.base.ui();
        if base > 0.0 {
            Some(self.quote.ui() / base)
        } else {
            None
        }
    }
}

/// Sizing for a buy: quote in, base out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyQuote {
    pub quote_in: u64,
    pub base_out: u64,
    pub max_quote_in: u64,
}

/// Sizing for a sell: base in, quote out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellQuote {
    pub base_in: u64,
    pub quote_out: u64,
    pub min_quote_out: u64,
}

/// Output amount for `input` against a constant-product pool.
///
/// `k = Rin * Rout`, `Rout' = k / (Rin + input) + 1`, `out = Rout - Rout'`.
/// A zero input yields zero.
pub fn quote_output_amount(
    input: u64,
    reserve_in: u64,
    reserve_out: u64,
) -> Result<u64, PricingError> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(PricingError::EmptyReserves {
            reserve_in,
            reserve_out,
        });
    }

    let k = reserve_in as u128 * reserve_out as u128;
    let new_reserve_in = reserve_in as u128 + input as u128;
    let new_reserve_out = k / new_reserve_in + 1;

    Ok((reserve_out as u128).saturating_sub(new_reserve_out) as u64)
}

/// Largest input the trader tolerates: `amount + floor(amount * bps / 10000)`.
///
/// The allowance is floored, so the bound never exceeds the exact
/// percentage: `max_input_with_slippage(9_999, 1) == 9_999`. Saturates at
/// `u64::MAX`.
pub fn max_input_with_slippage(amount: u64, basis_points: u64) -> u64 {
    let extra = amount as u128 * basis_points as u128 / BPS_DENOMINATOR as u128;
    (amount as u128 + extra).min(u64::MAX as u128) as u64
}

/// Smallest output the trader accepts: `amount - floor(amount * bps / 10000)`.
///
/// The cut is floored, so the bound is never looser than the exact
/// percentage: `min_output_with_slippage(9_999, 1) == 9_999`. Floors at 0.
pub fn min_output_with_slippage(amount: u64, basis_points: u64) -> u64 {
    let cut = amount as u128 * basis_points as u128 / BPS_DENOMINATOR as u128;
    (amount as u128).saturating_sub(cut) as u64
}

/// Size a buy of base tokens paying `quote_in` quote units.
pub fn buy_quote(
    quote_in: u64,
    reserves: &Reserves,
    slippage_bps: u64,
) -> Result<BuyQuote, PricingError> {
    let base_out = quote_output_amount(quote_in, reserves.quote.raw, reserves.base.raw)?;
    Ok(BuyQuote {
        quote_in,
        base_out,
        max_quote_in: max_input_with_slippage(quote_in, slippage_bps),
    })
}

/// Size a sell of `base_in` base units.
pub fn sell_quote(
    base_in: u64,
    reserves: &Reserves,
    slippage_bps: u64,
) -> Result<SellQuote, PricingError> {
    let quote_out = quote_output_amount(base_in, reserves.base.raw, reserves.quote.raw)?;
    Ok(SellQuote {
        base_in,
        quote_out,
        min_quote_out: min_output_with_slippage(quote_out, slippage_bps),
    })
}

/// Convert a human decimal string ("1.25") into base units without floats.
///
/// Digits beyond `decimals` are truncated.
pub fn parse_ui_amount(amount: &str, decimals: u8) -> Result<u64, PricingError> {
    let trimmed = amount.trim();
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    let valid = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !valid(whole) || !valid(fraction) {
        return Err(PricingError::InvalidAmount(amount.to_string()));
    }

    let scale = 10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| PricingError::Overflow(amount.to_string()))?;

    let whole_units = if whole.is_empty() {
        0u128
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| PricingError::Overflow(amount.to_string()))?
    };

    let mut fraction_digits: String = fraction.chars().take(decimals as usize).collect();
    while fraction_digits.len() < decimals as usize {
        fraction_digits.push('0');
    }
    let fraction_units = if fraction_digits.is_empty() {
        0u128
    } else {
        fraction_digits
            .parse::<u128>()
            .map_err(|_| PricingError::InvalidAmount(amount.to_string()))?
    };

    let total = whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or_else(|| PricingError::Overflow(amount.to_string()))?;

    u64::try_from(total).map_err(|_| PricingError::Overflow(amount.to_string()))
}

/// Base units to a human-scaled float
pub fn to_ui_amount(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}
