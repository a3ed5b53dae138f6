//! Versioned PumpSwap pool account layout
//!
//! Field offsets live in a descriptor table rather than in decoding code, so a
//! program upgrade that moves fields is a data change: add a new
//! [`AccountLayout`] and point [`ACTIVE_POOL_LAYOUT`] at it.

use solana_sdk::pubkey::Pubkey;

use super::MintRole;

/// Byte range of one field inside the account data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
}

impl FieldSpec {
    const fn new(name: &'static str, offset: usize, len: usize) -> Self {
        Self { name, offset, len }
    }

    fn slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.offset..self.offset + self.len)
    }
}

/// Schema descriptor for one version of the pool account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountLayout {
    pub version: u8,
    pub discriminator: [u8; 8],
    pub data_size: u64,
    pub pool_bump: FieldSpec,
    pub index: FieldSpec,
    pub creator: FieldSpec,
    pub base_mint: FieldSpec,
    pub quote_mint: FieldSpec,
    pub lp_mint: FieldSpec,
    pub pool_base_token_account: FieldSpec,
    pub pool_quote_token_account: FieldSpec,
    pub lp_supply: FieldSpec,
}

/// Pool account as deployed at program version 1 (211 bytes)
pub const PUMP_AMM_POOL_V1: AccountLayout = AccountLayout {
    version: 1,
    discriminator: [241, 154, 109, 4, 17, 177, 109, 188],
    data_size: 211,
    pool_bump: FieldSpec::new("pool_bump", 8, 1),
    index: FieldSpec::new("index", 9, 2),
    creator: FieldSpec::new("creator", 11, 32),
    base_mint: FieldSpec::new("base_mint", 43, 32),
    quote_mint: FieldSpec::new("quote_mint", 75, 32),
    lp_mint: FieldSpec::new("lp_mint", 107, 32),
    pool_base_token_account: FieldSpec::new("pool_base_token_account", 139, 32),
    pool_quote_token_account: FieldSpec::new("pool_quote_token_account", 171, 32),
    lp_supply: FieldSpec::new("lp_supply", 203, 8),
};

pub const ACTIVE_POOL_LAYOUT: &AccountLayout = &PUMP_AMM_POOL_V1;

impl AccountLayout {
    /// Field matched against the queried mint for a given role
    pub fn mint_field(&self, role: MintRole) -> FieldSpec {
        match role {
            MintRole::Base => self.base_mint,
            MintRole::Quote => self.quote_mint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("Account data is {actual} bytes, layout v{version} expects {expected}")]
    SizeMismatch {
        version: u8,
        expected: u64,
        actual: usize,
    },

    #[error("Account discriminator does not match layout v{version}")]
    Discriminator { version: u8 },

    #[error("Field '{0}' out of bounds")]
    OutOfBounds(&'static str),
}

/// Decoded pool account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAccount {
    pub pool_bump: u8,
    pub index: u16,
    pub creator: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub pool_base_token_account: Pubkey,
    pub pool_quote_token_account: Pubkey,
    pub lp_supply: u64,
}

impl PoolAccount {
    pub fn decode(layout: &AccountLayout, data: &[u8]) -> Result<Self, LayoutError> {
        if data.len() as u64 != layout.data_size {
            return Err(LayoutError::SizeMismatch {
                version: layout.version,
                expected: layout.data_size,
                actual: data.len(),
            });
        }
        if data[..8] != layout.discriminator {
            return Err(LayoutError::Discriminator {
                version: layout.version,
            });
        }

        let pubkey = |field: FieldSpec| -> Result<Pubkey, LayoutError> {
            let bytes: [u8; 32] = field
                .slice(data)
                .and_then(|s| s.try_into().ok())
                .ok_or(LayoutError::OutOfBounds(field.name))?;
            Ok(Pubkey::new_from_array(bytes))
        };
        let bytes = |field: FieldSpec| field.slice(data).ok_or(LayoutError::OutOfBounds(field.name));

        let pool_bump = bytes(layout.pool_bump)?[0];
        let index = u16::from_le_bytes(
            bytes(layout.index)?
                .try_into()
                .map_err(|_| LayoutError::OutOfBounds(layout.index.name))?,
        );
        let lp_supply = u64::from_le_bytes(
            bytes(layout.lp_supply)?
                .try_into()
                .map_err(|_| LayoutError::OutOfBounds(layout.lp_supply.name))?,
        );

        Ok(Self {
            pool_bump,
            index,
            creator: pubkey(layout.creator)?,
            base_mint: pubkey(layout.base_mint)?,
            quote_mint: pubkey(layout.quote_mint)?,
            lp_mint: pubkey(layout.lp_mint)?,
            pool_base_token_account: pubkey(layout.pool_base_token_account)?,
            pool_quote_token_account: pubkey(layout.pool_quote_token_account)?,
            lp_supply,
        })
    }

    /// Serialize back into the layout. Used to build fixtures.
    pub fn encode(&self, layout: &AccountLayout) -> Vec<u8> {
        let mut data = vec![0u8; layout.data_size as usize];
        data[..8].copy_from_slice(&layout.discriminator);

        let mut put = |field: FieldSpec, value: &[u8]| {
            data[field.offset..field.offset + field.len].copy_from_slice(value);
        };
        put(layout.pool_bump, &[self.pool_bump]);
        put(layout.index, &self.index.to_le_bytes());
        put(layout.creator, self.creator.as_ref());
        put(layout.base_mint, self.base_mint.as_ref());
        put(layout.quote_mint, self.quote_mint.as_ref());
        put(layout.lp_mint, self.lp_mint.as_ref());
        put(layout.pool_base_token_account, self.pool_base_token_account.as_ref());
        put(layout.pool_quote_token_account, self.pool_quote_token_account.as_ref());
        put(layout.lp_supply, &self.lp_supply.to_le_bytes());
        data
    }
}
