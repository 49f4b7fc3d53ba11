//! On-chain polls.
//!
//! Polls are created by any account and voted on once per account. The
//! contract keeps the tallies; `has_voted` is the per-viewer state.

use serde::{Deserialize, Serialize};

use crate::mutation::{Action, CallArg, ContractCall, Effect, ValidationError};
use crate::{Record, RecordId};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Record)]
#[record(collection = "polls")]
pub struct Poll {
    pub id: RecordId,
    pub question: String,
    pub options: Vec<String>,
    pub vote_counts: Vec<u64>,
    pub total_votes: u64,
    pub active: bool,
    /// Unix seconds; zero means no deadline.
    pub end_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollViewer {
    pub has_voted: bool,
}

/// Display row for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub option: String,
    pub votes: u64,
    /// Share of all votes with one decimal, `"0"` before the first vote.
    pub percentage: String,
}

impl Poll {
    /// Heading shown for the poll.
    pub fn title(&self) -> String {
        if self.question.is_empty() {
            format!("Poll #{}", self.id)
        } else {
            self.question.clone()
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        !self.active || (self.end_time > 0 && now >= self.end_time)
    }

    pub fn tallies(&self) -> Vec<OptionTally> {
        self.options
            .iter()
            .enumerate()
            .map(|(index, option)| {
                let votes = self.vote_counts.get(index).copied().unwrap_or(0);
                let percentage = if self.total_votes > 0 {
                    format!("{:.1}", votes as f64 / self.total_votes as f64 * 100.0)
                } else {
                    "0".to_string()
                };
                OptionTally {
                    option: option.clone(),
                    votes,
                    percentage,
                }
            })
            .collect()
    }

    /// A connected viewer who has not voted may vote until the poll ends.
    pub fn can_vote(&self, viewer: Option<&PollViewer>, now: u64) -> bool {
        match viewer {
            Some(viewer) => !viewer.has_voted && !self.is_expired(now),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PollAction {
    Create {
        question: String,
        options: Vec<String>,
        duration_days: u64,
    },
    Vote {
        poll_id: RecordId,
        option_index: u64,
    },
}

impl PollAction {
    pub fn create<I, O>(question: impl Into<String>, options: I, duration_days: u64) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<String>,
    {
        PollAction::Create {
            question: question.into(),
            options: options.into_iter().map(Into::into).collect(),
            duration_days,
        }
    }

    pub fn vote(poll_id: RecordId, option_index: u64) -> Self {
        PollAction::Vote {
            poll_id,
            option_index,
        }
    }
}

/// Options with blank entries dropped.
fn filled(options: &[String]) -> Vec<String> {
    options
        .iter()
        .filter(|option| !option.trim().is_empty())
        .cloned()
        .collect()
}

impl Action for PollAction {
    fn function(&self) -> &'static str {
        match self {
            PollAction::Create { .. } => "createPoll",
            PollAction::Vote { .. } => "vote",
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            PollAction::Create {
                question,
                options,
                duration_days,
            } => {
                if question.trim().is_empty() {
                    return Err(ValidationError::Empty("question"));
                }
                let got = filled(options).len();
                if got < MIN_OPTIONS {
                    return Err(ValidationError::TooFewOptions {
                        min: MIN_OPTIONS,
                        got,
                    });
                }
                if got > MAX_OPTIONS {
                    return Err(ValidationError::TooManyOptions {
                        max: MAX_OPTIONS,
                        got,
                    });
                }
                if *duration_days == 0 {
                    return Err(ValidationError::NotPositive("duration"));
                }
                Ok(())
            }
            PollAction::Vote { .. } => Ok(()),
        }
    }

    fn to_call(&self) -> ContractCall {
        match self {
            PollAction::Create {
                question,
                options,
                duration_days,
            } => ContractCall::new(
                self.function(),
                vec![
                    CallArg::Str(question.clone()),
                    CallArg::StrList(filled(options)),
                    CallArg::Uint(u128::from(*duration_days) * u128::from(SECONDS_PER_DAY)),
                ],
            ),
            PollAction::Vote {
                poll_id,
                option_index,
            } => ContractCall::new(
                self.function(),
                vec![
                    CallArg::Uint(u128::from(*poll_id)),
                    CallArg::Uint(u128::from(*option_index)),
                ],
            ),
        }
    }

    fn effects(&self) -> Vec<Effect> {
        match self {
            PollAction::Create { .. } => vec![Effect::NewRecord],
            PollAction::Vote { poll_id, .. } => {
                vec![Effect::Record(*poll_id), Effect::ViewerState(*poll_id)]
            }
        }
    }
}
