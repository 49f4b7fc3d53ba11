use std::collections::HashMap;
use std::sync::Mutex;

use indexed_sync::domain::trivia::{is_owner, Question, TriviaAction, TriviaRejection, TriviaViewer};
use indexed_sync::{
    ActError, Address, Aggregator, HandlerDispatcher, InMemoryRecordSource, MutationError,
    SyncConfig, Synchronizer,
};

use crate::support::{alice, bob, ether, owner, reverted};

type QuestionSource = InMemoryRecordSource<Question, TriviaViewer>;

struct TriviaState {
    owner: Address,
    questions: QuestionSource,
    answers: Mutex<HashMap<u64, String>>,
    rewards: Mutex<HashMap<Address, u128>>,
}

fn trivia_contract(questions: QuestionSource) -> HandlerDispatcher<TriviaState> {
    let state = TriviaState {
        owner: owner(),
        questions,
        answers: Mutex::new(HashMap::new()),
        rewards: Mutex::new(HashMap::new()),
    };
    HandlerDispatcher::new(state)
        .handler("addQuestion", |ctx| {
            if ctx.sender()? != &ctx.state().owner {
                return Err(MutationError::rejected("Only owner can call this"));
            }
            let text = ctx.string(0)?.to_string();
            let answer = ctx.string(1)?.to_string();
            let reward = ctx.uint(2)?;
            let state = ctx.state();
            let id = state.questions.len().map_err(reverted)? as u64;
            state
                .questions
                .append(Question {
                    id,
                    text,
                    reward,
                    active: true,
                })
                .map_err(reverted)?;
            state.answers.lock().unwrap().insert(id, answer.to_lowercase());
            Ok(())
        })
        .handler("answerQuestion", |ctx| {
            let sender = ctx.sender()?.clone();
            let id = ctx.id(0)?;
            let answer = ctx.string(1)?.to_lowercase();
            let state = ctx.state();

            let answered = state
                .questions
                .viewer_state(id, &sender)
                .map_err(reverted)?
                .is_some_and(|v| v.has_answered);
            if answered {
                return Err(MutationError::rejected("Already answered"));
            }
            if state.answers.lock().unwrap().get(&id) != Some(&answer) {
                return Err(MutationError::rejected("Wrong answer"));
            }
            let question = state
                .questions
                .record(id)
                .map_err(reverted)?
                .ok_or_else(|| MutationError::rejected("No such question"))?;

            state
                .questions
                .set_viewer_state(id, &sender, TriviaViewer { has_answered: true })
                .map_err(reverted)?;
            *state.rewards.lock().unwrap().entry(sender).or_insert(0) += question.reward;
            Ok(())
        })
}

fn trivia_sync() -> Synchronizer<QuestionSource, HandlerDispatcher<TriviaState>> {
    let questions = QuestionSource::new();
    Synchronizer::new(
        Aggregator::new(questions.clone())
            .with_config(SyncConfig::default().with_background_refresh(false)),
        trivia_contract(questions),
    )
}

#[tokio::test]
async fn owner_adds_question_and_it_is_listed() {
    let sync = trivia_sync();
    sync.set_viewer(Some(owner())).unwrap();
    assert!(sync.get_snapshot().await.unwrap().is_empty());
    assert!(is_owner(sync.viewer().unwrap().as_ref(), &sync.dispatcher().state().owner));

    let add = TriviaAction::add_question("Capital of France?", "Paris", "5").unwrap();
    sync.act(&add).await.unwrap();
    let snapshot = sync.get_snapshot().await.unwrap();

    let question = &snapshot.get(0).unwrap().record;
    assert_eq!(question.text, "Capital of France?");
    assert_eq!(question.reward, ether(5));
    assert_eq!(question.reward_display(), "5");
}

#[tokio::test]
async fn only_owner_may_add_questions() {
    let sync = trivia_sync();
    sync.set_viewer(Some(alice())).unwrap();

    let add = TriviaAction::add_question("Q", "A", "1").unwrap();
    let err = sync.act(&add).await.unwrap_err();

    let ActError::Mutation(err) = err else {
        panic!("expected a mutation error");
    };
    assert_eq!(TriviaRejection::classify(&err), TriviaRejection::NotOwner);
    assert!(sync.get_snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn answering_flow() {
    let sync = trivia_sync();
    sync.set_viewer(Some(owner())).unwrap();
    let add = TriviaAction::add_question("2 + 2?", "four", "1.5").unwrap();
    sync.act(&add).await.unwrap();

    sync.set_viewer(Some(alice())).unwrap();
    let snapshot = sync.get_snapshot().await.unwrap();
    let entry = snapshot.get(0).unwrap();
    assert!(entry.record.can_answer(entry.viewer_state.as_ref()));

    let wrong = sync.act(&TriviaAction::answer(0, "five")).await.unwrap_err();
    let ActError::Mutation(wrong) = wrong else {
        panic!("expected a mutation error");
    };
    assert_eq!(TriviaRejection::classify(&wrong), TriviaRejection::WrongAnswer);

    sync.act(&TriviaAction::answer(0, "  Four ")).await.unwrap();
    let snapshot = sync.get_snapshot().await.unwrap();
    let entry = snapshot.get(0).unwrap();
    assert_eq!(entry.viewer_state, Some(TriviaViewer { has_answered: true }));
    assert!(!entry.record.can_answer(entry.viewer_state.as_ref()));
    assert_eq!(
        sync.dispatcher().state().rewards.lock().unwrap().get(&alice()),
        Some(&1_500_000_000_000_000_000)
    );

    let again = sync.act(&TriviaAction::answer(0, "four")).await.unwrap_err();
    let ActError::Mutation(again) = again else {
        panic!("expected a mutation error");
    };
    assert!(TriviaRejection::classify(&again).needs_refresh());

    // Bob has not answered yet.
    sync.set_viewer(Some(bob())).unwrap();
    let snapshot = sync.get_snapshot().await.unwrap();
    assert_eq!(
        snapshot.get(0).unwrap().viewer_state,
        Some(TriviaViewer { has_answered: false })
    );
}

#[tokio::test]
async fn blank_answer_is_not_submitted() {
    let sync = trivia_sync();
    sync.set_viewer(Some(alice())).unwrap();

    let err = sync.act(&TriviaAction::answer(0, "  ")).await.unwrap_err();

    assert!(matches!(err, ActError::Invalid(_)));
}
