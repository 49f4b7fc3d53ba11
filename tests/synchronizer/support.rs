//! Test fixtures: a poll contract simulated over an in-memory source.

use std::time::Duration;

use async_trait::async_trait;
use indexed_sync::domain::poll::{Poll, PollViewer};
use indexed_sync::{
    Address, Aggregator, ContractCall, HandlerDispatcher, InMemoryRecordSource, MutationDispatcher,
    MutationError, Receipt, SourceError, SyncConfig, Synchronizer,
};

pub type PollSource = InMemoryRecordSource<Poll, PollViewer>;
pub type PollContract = HandlerDispatcher<PollSource>;
pub type PollSync = Synchronizer<PollSource, PollContract>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn alice() -> Address {
    Address::parse("0x00000000000000000000000000000000000000a1").unwrap()
}

pub fn bob() -> Address {
    Address::parse("0x00000000000000000000000000000000000000b0").unwrap()
}

pub fn poll(id: u64, question: &str) -> Poll {
    Poll {
        id,
        question: question.to_string(),
        options: vec!["Yes".into(), "No".into()],
        vote_counts: vec![0, 0],
        total_votes: 0,
        active: true,
        end_time: 0,
    }
}

pub fn poll_source(questions: &[&str]) -> PollSource {
    InMemoryRecordSource::with_records(
        questions
            .iter()
            .enumerate()
            .map(|(id, question)| poll(id as u64, question)),
    )
    .unwrap()
}

fn rejected(err: SourceError) -> MutationError {
    MutationError::rejected(err.to_string())
}

/// A poll contract whose writes land in `source`.
pub fn poll_contract(source: PollSource) -> PollContract {
    HandlerDispatcher::new(source)
        .handler("vote", |ctx| {
            let voter = ctx.sender()?.clone();
            let poll_id = ctx.id(0)?;
            let option = ctx.uint(1)? as usize;
            let source = ctx.state();

            let voted = source
                .viewer_state(poll_id, &voter)
                .map_err(rejected)?
                .is_some_and(|v| v.has_voted);
            if voted {
                return Err(MutationError::rejected("Already voted"));
            }
            let poll = source
                .record(poll_id)
                .map_err(rejected)?
                .ok_or_else(|| MutationError::rejected("Poll does not exist"))?;
            if option >= poll.options.len() {
                return Err(MutationError::rejected("Invalid option"));
            }

            source
                .update(poll_id, |poll| {
                    poll.vote_counts[option] += 1;
                    poll.total_votes += 1;
                })
                .map_err(rejected)?;
            source
                .set_viewer_state(poll_id, &voter, PollViewer { has_voted: true })
                .map_err(rejected)
        })
        .handler("createPoll", |ctx| {
            let question = ctx.string(0)?.to_string();
            let options = ctx.strings(1)?.to_vec();
            let source = ctx.state();
            let id = source.len().map_err(rejected)? as u64;
            source
                .append(Poll {
                    id,
                    question,
                    vote_counts: vec![0; options.len()],
                    options,
                    total_votes: 0,
                    active: true,
                    end_time: 0,
                })
                .map(|_| ())
                .map_err(rejected)
        })
}

pub fn config() -> SyncConfig {
    SyncConfig::default()
        .with_fetch_timeout(Duration::from_millis(200))
        .with_background_refresh(false)
}

/// A synchronizer over `questions`, plus a handle on the shared source.
pub fn poll_sync(questions: &[&str]) -> (PollSync, PollSource) {
    let source = poll_source(questions);
    let sync = Synchronizer::new(
        Aggregator::new(source.clone()).with_config(config()),
        poll_contract(source.clone()),
    );
    (sync, source)
}

/// A dispatcher that never answers in time.
pub struct StalledDispatcher {
    pub delay: Duration,
}

#[async_trait]
impl MutationDispatcher for StalledDispatcher {
    async fn submit(&self, call: &ContractCall) -> Result<Receipt, MutationError> {
        tokio::time::sleep(self.delay).await;
        Ok(Receipt {
            tx_hash: "0x0".into(),
            function: call.function.clone(),
        })
    }
}
