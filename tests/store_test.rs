use std::sync::Arc;

use taskline::error::Error;
use taskline::model::{State, TaskId};
use taskline::store::{self, MemoryStore, StateStore};

#[tokio::test]
async fn full_lifecycle_moves_forward() {
    let store = MemoryStore::new();
    let id = store.create(5, 42).await.unwrap();

    store.transition(id, State::Processing).await.unwrap();
    let processing = store.get(id).await.unwrap();
    assert_eq!(processing.state, State::Processing);

    store.transition(id, State::Done).await.unwrap();
    let done = store.get(id).await.unwrap();
    assert_eq!(done.state, State::Done);
    assert!(done.last_update_time >= processing.last_update_time);
    assert_eq!(done.creation_time, processing.creation_time);
}

#[tokio::test]
async fn skipping_a_state_is_rejected_and_leaves_record_untouched() {
    let store = MemoryStore::new();
    let id = store.create(1, 1).await.unwrap();
    let before = store.get(id).await.unwrap();

    let err = store.transition(id, State::Done).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: State::Received,
            to: State::Done,
            ..
        }
    ));
    assert_eq!(store.get(id).await.unwrap(), before);
}

#[tokio::test]
async fn done_is_terminal() {
    let store = MemoryStore::new();
    let id = store.create(1, 1).await.unwrap();
    store.transition(id, State::Processing).await.unwrap();
    store.transition(id, State::Done).await.unwrap();
    let done = store.get(id).await.unwrap();

    for to in State::ALL {
        let err = store.transition(id, to).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { from: State::Done, .. }));
    }
    let after = store.get(id).await.unwrap();
    assert_eq!(after.last_update_time, done.last_update_time);
    assert_eq!(after.state, State::Done);
}

#[tokio::test]
async fn backwards_transition_is_rejected() {
    let store = MemoryStore::new();
    let id = store.create(1, 1).await.unwrap();
    store.transition(id, State::Processing).await.unwrap();

    assert!(store.transition(id, State::Received).await.is_err());
    assert!(store.transition(id, State::Processing).await.is_err());
    assert_eq!(store.get(id).await.unwrap().state, State::Processing);
}

#[tokio::test]
async fn racing_transitions_admit_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let id = store.create(0, 0).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.transition(id, State::Processing).await
        }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn list_by_state_filters() {
    let store = MemoryStore::new();
    let a = store.create(1, 1).await.unwrap();
    let b = store.create(2, 2).await.unwrap();
    let c = store.create(3, 3).await.unwrap();
    store.transition(b, State::Processing).await.unwrap();
    store.transition(c, State::Processing).await.unwrap();
    store.transition(c, State::Done).await.unwrap();

    let ids = |tasks: Vec<taskline::model::Task>| tasks.into_iter().map(|t| t.id).collect::<Vec<_>>();
    assert_eq!(ids(store.list_by_state(State::Received).await.unwrap()), vec![a]);
    assert_eq!(ids(store.list_by_state(State::Processing).await.unwrap()), vec![b]);
    assert_eq!(ids(store.list_by_state(State::Done).await.unwrap()), vec![c]);
}

#[tokio::test]
async fn get_missing_task_is_not_found() {
    let store = MemoryStore::new();
    assert!(matches!(
        store.get(TaskId(1)).await,
        Err(Error::NotFound(TaskId(1)))
    ));
}

#[tokio::test]
async fn stranded_lists_unfinished_tasks_past_the_cutoff() {
    let store = MemoryStore::new();
    let received = store.create(1, 1).await.unwrap();
    let processing = store.create(1, 2).await.unwrap();
    let done = store.create(1, 3).await.unwrap();
    store.transition(processing, State::Processing).await.unwrap();
    store.transition(done, State::Processing).await.unwrap();
    store.transition(done, State::Done).await.unwrap();

    let all = store::stranded(&store, chrono::Duration::zero()).await.unwrap();
    let ids: Vec<TaskId> = all.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![received, processing]);

    let recent_only = store::stranded(&store, chrono::Duration::hours(1))
        .await
        .unwrap();
    assert!(recent_only.is_empty());
}

#[tokio::test]
async fn stranded_rejects_a_cutoff_before_the_calendar_starts() {
    let store = MemoryStore::new();
    store.create(1, 1).await.unwrap();

    let result = store::stranded(&store, chrono::Duration::days(365 * 300_000)).await;
    assert!(matches!(result, Err(Error::Config(_))));
}
