//! Trivia questions with token rewards.
//!
//! The owner adds questions with an answer and a reward; anyone may
//! answer each question once. Answers are checked by the contract, so a
//! wrong answer comes back as a rejected mutation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mutation::{Action, CallArg, ContractCall, Effect, MutationError, ValidationError};
use crate::units::{format_ether, parse_ether};
use crate::{Address, Record, RecordId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Record)]
#[record(collection = "questions")]
pub struct Question {
    pub id: RecordId,
    pub text: String,
    /// Reward in base units of the reward token.
    pub reward: u128,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriviaViewer {
    pub has_answered: bool,
}

impl Question {
    pub fn reward_display(&self) -> String {
        format_ether(self.reward)
    }

    pub fn can_answer(&self, viewer: Option<&TriviaViewer>) -> bool {
        self.active && viewer.is_some_and(|viewer| !viewer.has_answered)
    }
}

/// Whether the connected account owns the trivia contract.
pub fn is_owner(viewer: Option<&Address>, owner: &Address) -> bool {
    viewer == Some(owner)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TriviaAction {
    AddQuestion {
        question: String,
        answer: String,
        reward: u128,
    },
    Answer {
        question_id: RecordId,
        answer: String,
    },
}

impl TriviaAction {
    /// Build an `AddQuestion` from form input, with the reward given in whole tokens.
    pub fn add_question(
        question: impl Into<String>,
        answer: impl Into<String>,
        reward: &str,
    ) -> Result<Self, ValidationError> {
        let reward = parse_ether(reward.trim())?;
        Ok(TriviaAction::AddQuestion {
            question: question.into(),
            answer: answer.into(),
            reward,
        })
    }

    pub fn answer(question_id: RecordId, answer: impl Into<String>) -> Self {
        TriviaAction::Answer {
            question_id,
            answer: answer.into(),
        }
    }
}

impl Action for TriviaAction {
    fn function(&self) -> &'static str {
        match self {
            TriviaAction::AddQuestion { .. } => "addQuestion",
            TriviaAction::Answer { .. } => "answerQuestion",
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TriviaAction::AddQuestion {
                question,
                answer,
                reward,
            } => {
                if question.trim().is_empty() {
                    return Err(ValidationError::Empty("question"));
                }
                if answer.trim().is_empty() {
                    return Err(ValidationError::Empty("answer"));
                }
                if *reward == 0 {
                    return Err(ValidationError::NotPositive("reward"));
                }
                Ok(())
            }
            TriviaAction::Answer { answer, .. } => {
                if answer.trim().is_empty() {
                    return Err(ValidationError::Empty("answer"));
                }
                Ok(())
            }
        }
    }

    fn to_call(&self) -> ContractCall {
        match self {
            TriviaAction::AddQuestion {
                question,
                answer,
                reward,
            } => ContractCall::new(
                self.function(),
                vec![
                    CallArg::Str(question.trim().to_string()),
                    CallArg::Str(answer.trim().to_string()),
                    CallArg::Uint(*reward),
                ],
            ),
            TriviaAction::Answer {
                question_id,
                answer,
            } => ContractCall::new(
                self.function(),
                vec![
                    CallArg::Uint(u128::from(*question_id)),
                    CallArg::Str(answer.trim().to_string()),
                ],
            ),
        }
    }

    fn effects(&self) -> Vec<Effect> {
        match self {
            TriviaAction::AddQuestion { .. } => vec![Effect::NewRecord],
            TriviaAction::Answer { question_id, .. } => {
                vec![Effect::Record(*question_id), Effect::ViewerState(*question_id)]
            }
        }
    }
}

/// Known reasons the trivia contract rejects a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriviaRejection {
    WrongAnswer,
    AlreadyAnswered,
    NotOwner,
    Other(String),
}

impl TriviaRejection {
    pub fn classify(error: &MutationError) -> Self {
        let reason = error.reason();
        if reason.contains("Wrong answer") {
            TriviaRejection::WrongAnswer
        } else if reason.contains("Already answered") {
            TriviaRejection::AlreadyAnswered
        } else if reason.contains("Only owner") {
            TriviaRejection::NotOwner
        } else {
            TriviaRejection::Other(reason)
        }
    }

    /// The cached viewer state is behind the contract and should be re-read.
    pub fn needs_refresh(&self) -> bool {
        matches!(self, TriviaRejection::AlreadyAnswered)
    }
}

impl fmt::Display for TriviaRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriviaRejection::WrongAnswer => write!(f, "Wrong answer! Try again."),
            TriviaRejection::AlreadyAnswered => {
                write!(f, "You've already answered this question!")
            }
            TriviaRejection::NotOwner => write!(f, "Only the contract owner can add questions"),
            TriviaRejection::Other(reason) => write!(f, "{}", reason),
        }
    }
}
