//! Fungible token transfers.
//!
//! Token actions change balances and allowances only; no indexed record is
//! affected, so a successful submit invalidates nothing.

use serde::{Deserialize, Serialize};

use crate::mutation::{Action, CallArg, ContractCall, Effect, ValidationError};
use crate::units::parse_ether;
use crate::Address;

/// Amount granted by a claim, in base units.
pub const CLAIM_AMOUNT: u128 = 100 * 1_000_000_000_000_000_000;

/// An account may claim while its balance is zero or not yet read.
pub fn can_claim(balance: Option<u128>) -> bool {
    balance.map_or(true, |balance| balance == 0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TokenAction {
    Claim,
    Burn { amount: u128 },
    Transfer { to: Address, amount: u128 },
    Approve { spender: Address, amount: u128 },
}

impl TokenAction {
    pub fn burn(amount: &str) -> Result<Self, ValidationError> {
        Ok(TokenAction::Burn {
            amount: parse_ether(amount)?,
        })
    }

    pub fn transfer(to: &str, amount: &str) -> Result<Self, ValidationError> {
        Ok(TokenAction::Transfer {
            to: Address::parse(to)?,
            amount: parse_ether(amount)?,
        })
    }

    pub fn approve(spender: &str, amount: &str) -> Result<Self, ValidationError> {
        Ok(TokenAction::Approve {
            spender: Address::parse(spender)?,
            amount: parse_ether(amount)?,
        })
    }
}

impl Action for TokenAction {
    fn function(&self) -> &'static str {
        match self {
            TokenAction::Claim => "claim",
            TokenAction::Burn { .. } => "burn",
            TokenAction::Transfer { .. } => "transfer",
            TokenAction::Approve { .. } => "approve",
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TokenAction::Claim => Ok(()),
            TokenAction::Burn { amount }
            | TokenAction::Transfer { amount, .. }
            | TokenAction::Approve { amount, .. } => {
                if *amount == 0 {
                    Err(ValidationError::NotPositive("amount"))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn to_call(&self) -> ContractCall {
        let args = match self {
            TokenAction::Claim => vec![],
            TokenAction::Burn { amount } => vec![CallArg::Uint(*amount)],
            TokenAction::Transfer { to, amount } => {
                vec![CallArg::Address(to.clone()), CallArg::Uint(*amount)]
            }
            TokenAction::Approve { spender, amount } => {
                vec![CallArg::Address(spender.clone()), CallArg::Uint(*amount)]
            }
        };
        ContractCall::new(self.function(), args)
    }

    fn effects(&self) -> Vec<Effect> {
        Vec::new()
    }
}
