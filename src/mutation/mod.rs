//! Mutations - typed actions submitted to the external dispatcher.
//!
//! Each supported mutation is a variant of a closed action enum (see
//! `domain`). An action validates its own payload, encodes itself as a
//! `ContractCall`, and declares which cached entries a successful submit
//! makes stale.
//!
//! ## Example
//!
//! ```ignore
//! let vote = PollAction::Vote { poll_id: 0, option_index: 1 };
//! vote.validate()?;
//! let receipt = dispatcher.submit(&vote.to_call()).await?;
//! for effect in vote.effects() { /* invalidate */ }
//! ```

mod dispatcher;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::record::{Address, AddressError, RecordId};
use crate::units::UnitsError;

pub use dispatcher::{CallContext, HandlerDispatcher};

/// A positional argument of a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    Uint(u128),
    Str(String),
    StrList(Vec<String>),
    Address(Address),
}

/// A call as the dispatcher sees it: function name, ordered arguments,
/// attached value in base units, and the sending account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub function: String,
    pub args: Vec<CallArg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
}

impl ContractCall {
    pub fn new(function: impl Into<String>, args: Vec<CallArg>) -> Self {
        ContractCall {
            function: function.into(),
            args,
            value: None,
            from: None,
        }
    }

    /// Attach value to the call (a paid mint, for example).
    pub fn with_value(mut self, value: u128) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }
}

/// Proof that the dispatcher accepted a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub function: String,
}

/// What a successful action makes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// The record's aggregate fields changed (tally, active flag, ...).
    Record(RecordId),
    /// The acting viewer's state for this record changed.
    ViewerState(RecordId),
    /// A new record was appended, so the count changed.
    NewRecord,
}

/// A typed, statically shaped mutation.
pub trait Action: Send + Sync {
    /// Contract function this action calls.
    fn function(&self) -> &'static str;

    /// Client-side payload checks run before anything is submitted.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Encode the action as a contract call.
    fn to_call(&self) -> ContractCall;

    /// Cached entries made stale by a successful submit.
    fn effects(&self) -> Vec<Effect>;
}

/// The external channel that executes contract calls.
#[async_trait]
pub trait MutationDispatcher: Send + Sync {
    async fn submit(&self, call: &ContractCall) -> Result<Receipt, MutationError>;

    /// Function names this dispatcher accepts, sorted. Empty when unknown.
    fn functions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Error type for a rejected or abandoned submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationError {
    /// The dispatcher refused the call (revert, insufficient funds, user cancelled, ...).
    Rejected { reason: String },
    /// No confirmation arrived before the deadline.
    Timeout(Duration),
    /// The dispatcher does not know this function.
    UnknownFunction(String),
}

impl MutationError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        MutationError::Rejected {
            reason: reason.into(),
        }
    }

    /// The human-readable reason, as a wallet would show it.
    pub fn reason(&self) -> String {
        match self {
            MutationError::Rejected { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationError::Rejected { reason } => write!(f, "mutation rejected: {}", reason),
            MutationError::Timeout(after) => {
                write!(f, "mutation timed out after {}ms", after.as_millis())
            }
            MutationError::UnknownFunction(name) => write!(f, "unknown function: {}", name),
        }
    }
}

impl std::error::Error for MutationError {}

/// Error type for client-side payload validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is blank.
    Empty(&'static str),
    TooFewOptions { min: usize, got: usize },
    TooManyOptions { max: usize, got: usize },
    /// An amount or duration that must be above zero is not.
    NotPositive(&'static str),
    Address(AddressError),
    Amount(UnitsError),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Empty(field) => write!(f, "please enter a {}", field),
            ValidationError::TooFewOptions { min, got } => {
                write!(f, "please provide at least {} options (got {})", min, got)
            }
            ValidationError::TooManyOptions { max, got } => {
                write!(f, "maximum {} options allowed (got {})", max, got)
            }
            ValidationError::NotPositive(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::Address(e) => write!(f, "invalid address: {}", e),
            ValidationError::Amount(e) => write!(f, "invalid amount: {}", e),
        }
    }
}

impl std::error::Error for ValidationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ValidationError::Address(e) => Some(e),
            ValidationError::Amount(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AddressError> for ValidationError {
    fn from(err: AddressError) -> Self {
        ValidationError::Address(err)
    }
}

impl From<UnitsError> for ValidationError {
    fn from(err: UnitsError) -> Self {
        ValidationError::Amount(err)
    }
}
