//! NFT collection minting.
//!
//! Minted tokens form a dense indexed record set. Whitelisted accounts get
//! a number of free mints; everyone else pays the collection price, and
//! only while public minting is open.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mutation::{Action, CallArg, ContractCall, Effect, ValidationError};
use crate::units::format_ether;
use crate::{Address, Record, RecordId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Record)]
#[record(collection = "tokens")]
pub struct Token {
    pub id: RecordId,
    pub token_uri: String,
    pub owner: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenViewer {
    pub owned: bool,
}

/// Collection-wide minting parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub current_supply: u64,
    pub max_supply: u64,
    /// Price of a paid mint in wei.
    pub mint_price: u128,
    pub minting_enabled: bool,
    pub public_mint_enabled: bool,
}

impl CollectionStats {
    pub fn sold_out(&self) -> bool {
        self.current_supply >= self.max_supply
    }

    pub fn price_display(&self) -> String {
        format_ether(self.mint_price)
    }
}

/// Minting facts for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintStats {
    pub minted: u64,
    pub remaining_free_mints: u64,
    pub whitelisted: bool,
    /// Price this account would pay in wei.
    pub mint_price: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NftAction {
    FreeMint { token_uri: String },
    Mint { token_uri: String, price: u128 },
}

impl NftAction {
    fn token_uri(&self) -> &str {
        match self {
            NftAction::FreeMint { token_uri } | NftAction::Mint { token_uri, .. } => token_uri,
        }
    }
}

impl Action for NftAction {
    fn function(&self) -> &'static str {
        match self {
            NftAction::FreeMint { .. } => "freeMint",
            NftAction::Mint { .. } => "mint",
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.token_uri().trim().is_empty() {
            return Err(ValidationError::Empty("token URI"));
        }
        Ok(())
    }

    fn to_call(&self) -> ContractCall {
        let call = ContractCall::new(
            self.function(),
            vec![CallArg::Str(self.token_uri().to_string())],
        );
        match self {
            NftAction::FreeMint { .. } => call,
            NftAction::Mint { price, .. } => call.with_value(*price),
        }
    }

    fn effects(&self) -> Vec<Effect> {
        vec![Effect::NewRecord]
    }
}

/// Why a mint was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintRefusal {
    WalletNotConnected,
    MissingTokenUri,
    /// Collection stats have not been read yet.
    StatsLoading,
    MintingDisabled,
    SoldOut,
    PublicMintDisabled,
    InsufficientBalance { needed: u128, available: u128 },
}

impl fmt::Display for MintRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintRefusal::WalletNotConnected => write!(f, "Please connect your wallet"),
            MintRefusal::MissingTokenUri => write!(f, "Please enter a token URI"),
            MintRefusal::StatsLoading => write!(f, "Loading collection data..."),
            MintRefusal::MintingDisabled => write!(f, "Minting is currently disabled"),
            MintRefusal::SoldOut => write!(f, "Maximum supply reached"),
            MintRefusal::PublicMintDisabled => write!(f, "Public minting is currently disabled"),
            MintRefusal::InsufficientBalance { needed, available } => write!(
                f,
                "Insufficient ETH balance: need {}, have {}",
                format_ether(*needed),
                format_ether(*available)
            ),
        }
    }
}

impl std::error::Error for MintRefusal {}

/// Pick the mint call for the connected account from what the client last read.
///
/// A whitelisted account with free mints left gets `FreeMint`. Everyone else
/// gets a paid `Mint`, which needs public minting unless the account is
/// whitelisted, and enough balance when the balance is known. The result is
/// advisory: the contract checks eligibility again when the call arrives.
pub fn plan_mint(
    viewer: Option<&Address>,
    token_uri: &str,
    stats: Option<&CollectionStats>,
    mint_stats: Option<&MintStats>,
    balance: Option<u128>,
) -> Result<NftAction, MintRefusal> {
    if viewer.is_none() {
        return Err(MintRefusal::WalletNotConnected);
    }
    if token_uri.trim().is_empty() {
        return Err(MintRefusal::MissingTokenUri);
    }
    let stats = stats.ok_or(MintRefusal::StatsLoading)?;
    if !stats.minting_enabled {
        return Err(MintRefusal::MintingDisabled);
    }
    if stats.sold_out() {
        return Err(MintRefusal::SoldOut);
    }

    let whitelisted = mint_stats.is_some_and(|m| m.whitelisted);
    if whitelisted && mint_stats.is_some_and(|m| m.remaining_free_mints > 0) {
        return Ok(NftAction::FreeMint {
            token_uri: token_uri.to_string(),
        });
    }

    if !whitelisted && !stats.public_mint_enabled {
        return Err(MintRefusal::PublicMintDisabled);
    }
    if let Some(available) = balance {
        if available < stats.mint_price {
            return Err(MintRefusal::InsufficientBalance {
                needed: stats.mint_price,
                available,
            });
        }
    }
    Ok(NftAction::Mint {
        token_uri: token_uri.to_string(),
        price: stats.mint_price,
    })
}
