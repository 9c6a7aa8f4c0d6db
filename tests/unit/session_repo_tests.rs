//! Unit tests for `SessionRepo` against an in-memory database.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use netaware::persistence::session_repo::SessionRepo;
use netaware::persistence::{db, SessionStore};
use netaware::AppError;

async fn repo() -> SessionRepo {
    let db = db::connect_memory().await.expect("db");
    SessionRepo::new(Arc::new(db))
}

#[tokio::test]
async fn create_assigns_increasing_ids() {
    let repo = repo().await;
    let started = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

    let first = repo.create(started).await.expect("first");
    let second = repo.create(started).await.expect("second");
    assert!(second > first);

    let latest = repo.load_latest().await.expect("load").expect("session");
    assert_eq!(latest.id, second);
    assert_eq!(latest.started_at, started);
}

#[tokio::test]
async fn empty_store_has_no_latest_session() {
    let repo = repo().await;
    assert!(repo.load_latest().await.expect("load").is_none());
    assert_eq!(repo.count().await.expect("count"), 0);
}

#[tokio::test]
async fn load_previous_walks_back_from_newest() {
    let repo = repo().await;
    let ids = [
        repo.create(Utc::now()).await.expect("a"),
        repo.create(Utc::now()).await.expect("b"),
        repo.create(Utc::now()).await.expect("c"),
    ];

    let previous = repo.load_previous(1).await.expect("load").expect("session");
    assert_eq!(previous.id, ids[1]);
    assert!(repo.load_previous(3).await.expect("load").is_none());
}

#[tokio::test]
async fn get_missing_session_is_not_found() {
    let repo = repo().await;
    let result = repo.get(42).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn trim_keeps_newest_sessions() {
    let repo = repo().await;
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(repo.create(Utc::now()).await.expect("create"));
    }

    assert_eq!(repo.trim(3).await.expect("trim"), 2);
    assert_eq!(repo.count().await.expect("count"), 3);
    assert!(repo.get(ids[1]).await.is_err());
    assert!(repo.get(ids[2]).await.is_ok());
    assert_eq!(repo.trim(3).await.expect("trim again"), 0);
}

#[tokio::test]
async fn store_trait_delegates_to_repo() {
    let repo = repo().await;
    let store: &dyn SessionStore = &repo;

    let id = store.create_session(Utc::now()).await.expect("create");
    let latest = store.load_latest_session().await.expect("load").expect("session");
    assert_eq!(latest.id, id);
    assert_eq!(store.trim_sessions(1).await.expect("trim"), 0);
}

#[tokio::test]
async fn drop_all_empties_the_table() {
    let repo = repo().await;
    repo.create(Utc::now()).await.expect("create");
    repo.create(Utc::now()).await.expect("create");
    assert_eq!(repo.drop_all().await.expect("drop"), 2);
    assert_eq!(repo.count().await.expect("count"), 0);
}

#[tokio::test]
async fn file_database_persists_across_connections() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("nested").join("history.db");

    let id = {
        let db = db::connect(&path).await.expect("connect");
        let repo = SessionRepo::new(Arc::new(db));
        repo.create(Utc::now()).await.expect("create")
    };

    let db = db::connect(&path).await.expect("reconnect");
    let repo = SessionRepo::new(Arc::new(db));
    assert_eq!(repo.get(id).await.expect("get").id, id);
}
