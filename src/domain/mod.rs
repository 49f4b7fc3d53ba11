//! Record types and actions for the supported contracts.
//!
//! Each module pairs the records a contract exposes by sequential ID with a
//! closed action enum covering its state-changing calls.

pub mod nft;
pub mod poll;
pub mod token;
pub mod trivia;
