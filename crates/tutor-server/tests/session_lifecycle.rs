//! Cross-module flow: a session record in the durable store and a parked
//! tutor adapter in the registry have to agree on what "still resumable"
//! means, since `ws.rs`'s reconnect path reads one and reclaims from the
//! other. `cat` stands in for a tutor backend here, the same fake-subprocess
//! trick `tutor_tutor::registry`'s own unit tests use, since all that
//! matters for this flow is that the child stays alive until `end()`.

use std::path::PathBuf;
use std::sync::Arc;

use tutor_protocol::SessionMode;
use tutor_store::SessionStore;
use tutor_store::StoreOutcome;
use tutor_tutor::TutorAdapter;
use tutor_tutor::TutorRegistry;

#[tokio::test]
async fn parked_adapter_survives_a_reconnect_that_finds_the_session_in_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let registry = TutorRegistry::new();

    let session = store
        .create_new("two-sum".to_string(), SessionMode::Learning)
        .await
        .unwrap();
    let session_id = session.id.clone();

    let adapter = Arc::new(
        TutorAdapter::start(session_id.clone(), PathBuf::from("/tmp"), "cat", &[]).unwrap(),
    );
    registry.park(session_id.clone(), adapter).await;

    // Simulates the disconnect window: the session is still open in the
    // store and the adapter is still parked, so a reconnect should find both.
    match store.get(&session_id).await.unwrap() {
        StoreOutcome::Found(found) => assert!(found.ended_at.is_none()),
        _ => panic!("expected the session to still be in the store"),
    }

    let reclaimed = registry.reclaim(&session_id).await;
    assert!(reclaimed.is_some(), "reconnect should reclaim the parked adapter");
    assert_eq!(registry.len().await, 0, "reclaim must remove the entry, not just read it");

    // A second reclaim attempt (e.g. a racing duplicate reconnect) must not
    // be handed the same adapter twice.
    assert!(registry.reclaim(&session_id).await.is_none());

    reclaimed.unwrap().end().await;
}

#[tokio::test]
async fn ending_a_session_in_the_store_does_not_by_itself_kill_a_parked_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let registry = TutorRegistry::new();

    let session = store
        .create_new("two-sum".to_string(), SessionMode::Learning)
        .await
        .unwrap();
    let session_id = session.id.clone();

    let adapter = Arc::new(
        TutorAdapter::start(session_id.clone(), PathBuf::from("/tmp"), "cat", &[]).unwrap(),
    );
    registry.park(session_id.clone(), adapter).await;

    store.end(&session_id).await.unwrap();

    match store.get(&session_id).await.unwrap() {
        StoreOutcome::Found(found) => assert!(found.ended_at.is_some()),
        _ => panic!("expected the ended session to still be readable"),
    }

    // The store and registry are independent components; ending a session's
    // record doesn't reach into the registry, so the orchestrator's own
    // `end_session` handler is responsible for calling `registry.kill` too.
    assert_eq!(registry.len().await, 1);
    registry.kill(&session_id).await;
    assert_eq!(registry.len().await, 0);
}
