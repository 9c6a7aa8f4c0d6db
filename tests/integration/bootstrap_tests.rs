//! Integration tests for the bootstrap orchestrator over `SQLite` stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use netaware::models::session::Session;
use netaware::network::monitor::CapabilityMonitor;
use netaware::network::{CapabilitySnapshot, StaticCapabilitySource, Transport, CAPABILITY_INTERNET};
use netaware::orchestrator::{BootstrapOrchestrator, BootstrapValue, ReactionMode, Stores};
use netaware::persistence::capabilities_repo::CapabilitiesRepo;
use netaware::persistence::network_state_repo::NetworkStateRepo;
use netaware::persistence::retention::RetentionPolicy;
use netaware::persistence::session_repo::SessionRepo;
use netaware::persistence::{db, SessionStore, StoreFuture};
use netaware::AppError;

/// Session store whose first `fail_creates` creations and first
/// `fail_loads` reloads fail.
struct FlakySessions {
    inner: SessionRepo,
    fail_creates: usize,
    creates: AtomicUsize,
    fail_loads: usize,
    loads: AtomicUsize,
}

impl SessionStore for FlakySessions {
    fn create_session(&self, started_at: DateTime<Utc>) -> StoreFuture<'_, i64> {
        let attempt = self.creates.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_creates {
            return Box::pin(async { Err::<i64, _>(AppError::Db("disk I/O error".into())) });
        }
        self.inner.create_session(started_at)
    }

    fn load_latest_session(&self) -> StoreFuture<'_, Option<Session>> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_loads {
            return Box::pin(async {
                Err::<Option<Session>, _>(AppError::Db("database is locked".into()))
            });
        }
        self.inner.load_latest_session()
    }

    fn trim_sessions(&self, keep: u32) -> StoreFuture<'_, u64> {
        self.inner.trim_sessions(keep)
    }
}

struct Fixture {
    orchestrator: BootstrapOrchestrator,
    sessions: SessionRepo,
    states: NetworkStateRepo,
    capabilities: CapabilitiesRepo,
    flaky: Arc<FlakySessions>,
}

fn wifi() -> CapabilitySnapshot {
    CapabilitySnapshot {
        capabilities: vec![CAPABILITY_INTERNET],
        transports: vec![Transport::Wifi],
        downstream_kbps: 40_000,
        upstream_kbps: 8_000,
        signal_strength: -45,
    }
}

async fn fixture(fail_creates: usize, retention: RetentionPolicy) -> Fixture {
    fixture_with(fail_creates, 0, retention).await
}

async fn fixture_with(fail_creates: usize, fail_loads: usize, retention: RetentionPolicy) -> Fixture {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let sessions = SessionRepo::new(Arc::clone(&db));
    let states = NetworkStateRepo::new(Arc::clone(&db));
    let capabilities = CapabilitiesRepo::new(Arc::clone(&db));
    let flaky = Arc::new(FlakySessions {
        inner: sessions.clone(),
        fail_creates,
        creates: AtomicUsize::new(0),
        fail_loads,
        loads: AtomicUsize::new(0),
    });
    let monitor = Arc::new(CapabilityMonitor::new(Arc::new(StaticCapabilitySource::new(
        Some(wifi()),
    ))));

    let orchestrator = BootstrapOrchestrator::new(
        Stores {
            sessions: Arc::clone(&flaky) as _,
            states: Arc::new(states.clone()),
            capabilities: Arc::new(capabilities.clone()),
        },
        monitor,
        retention,
    );

    Fixture {
        orchestrator,
        sessions,
        states,
        capabilities,
        flaky,
    }
}

// ─── Bootstrap pipeline ───────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_creates_session_and_syncs_history() {
    let f = fixture(0, RetentionPolicy::default()).await;
    assert_eq!(f.orchestrator.mode(), ReactionMode::Queued);

    f.orchestrator.sequencer().start().expect("start");
    let state = f.orchestrator.sequencer().settled().await;
    assert!(state.is_completed, "unexpected state: {state:?}");

    let session = f.orchestrator.session().expect("session");
    assert_eq!(session.started_at.timestamp_millis(), f.orchestrator.started_at().timestamp_millis());
    assert_eq!(f.orchestrator.mode(), ReactionMode::Direct);

    let latest_state = f.states.load_latest().await.expect("load").expect("state");
    assert_eq!(latest_state.session_id, session.id);
    assert!(latest_state.is_connected);
    assert!(!latest_state.has_internet, "reachability not observed yet");
    assert!(latest_state.is_externally_disconnected);
    assert!(latest_state.has_wifi);

    let latest_caps = f.capabilities.load_latest().await.expect("load").expect("caps");
    assert_eq!(latest_caps.session_id, session.id);
    assert_eq!(latest_caps.downstream_kbps, 40_000);
    assert_eq!(
        f.orchestrator.sequencer().last_capture(),
        Some(BootstrapValue::Synced)
    );
}

#[tokio::test]
async fn failed_session_reload_keeps_the_created_session() {
    let f = fixture_with(0, 1, RetentionPolicy::default()).await;
    let sequencer = f.orchestrator.sequencer();

    sequencer.start().expect("start");
    let state = sequencer.settled().await;
    assert!(state.is_completed, "unexpected state: {state:?}");
    assert!(!state.reset_on_resume);
    let session = f.orchestrator.session().expect("session cached after insert");
    assert_eq!(f.orchestrator.mode(), ReactionMode::Direct);

    sequencer.start().expect("rerun");
    assert!(sequencer.settled().await.is_completed);

    assert_eq!(f.sessions.count().await.expect("count"), 1);
    assert_eq!(f.flaky.creates.load(Ordering::SeqCst), 1);
    let stored = f.sessions.load_latest().await.expect("load").expect("session");
    assert_eq!(stored.id, session.id);
}

#[tokio::test]
async fn failed_session_creation_restarts_bootstrap_once() {
    let f = fixture(1, RetentionPolicy::default()).await;
    let sequencer = f.orchestrator.sequencer();

    sequencer.start().expect("start");
    let state = sequencer.settled().await;
    assert!(state.reset_on_resume);
    assert!(f.orchestrator.session().is_none());
    assert_eq!(f.orchestrator.mode(), ReactionMode::Queued);
    assert_eq!(f.states.count().await.expect("count"), 0, "sync must wait for session");

    sequencer.resume().expect("resume");
    let state = sequencer.settled().await;
    assert!(state.is_completed);

    assert_eq!(f.flaky.creates.load(Ordering::SeqCst), 2);
    assert_eq!(f.sessions.count().await.expect("count"), 1);
    let session = f.orchestrator.session().expect("session");
    let latest_state = f.states.load_latest().await.expect("load").expect("state");
    assert_eq!(latest_state.session_id, session.id);
}

#[tokio::test]
async fn rerun_reuses_session_and_skips_synced_rows() {
    let f = fixture(0, RetentionPolicy::default()).await;
    let sequencer = f.orchestrator.sequencer();

    sequencer.start().expect("start");
    sequencer.settled().await;
    sequencer.start().expect("restart");
    sequencer.settled().await;

    assert_eq!(f.sessions.count().await.expect("count"), 1);
    assert_eq!(f.states.count().await.expect("count"), 1);
    assert_eq!(f.capabilities.count().await.expect("count"), 1);
}

#[tokio::test]
async fn bootstrap_trims_old_sessions() {
    let policy = RetentionPolicy {
        sessions: 2,
        network_states: 30,
        network_capabilities: 30,
    };
    let f = fixture(0, policy).await;
    for _ in 0..3 {
        f.sessions.create(Utc::now()).await.expect("seed");
    }

    f.orchestrator.sequencer().start().expect("start");
    f.orchestrator.sequencer().settled().await;

    assert_eq!(f.sessions.count().await.expect("count"), 2);
    let session = f.orchestrator.session().expect("session");
    assert_eq!(
        f.sessions.load_latest().await.expect("load").expect("latest").id,
        session.id
    );
}

// ─── Reactions ────────────────────────────────────────────────────────

#[tokio::test]
async fn queued_reactions_coalesce_and_run_after_sync() {
    let f = fixture(0, RetentionPolicy::default()).await;
    let sequencer = f.orchestrator.sequencer();

    f.orchestrator.react_to_reachability_changed(false).await;
    f.orchestrator.react_to_reachability_changed(true).await;
    f.orchestrator
        .react_to_capabilities_changed(None, Some(wifi()))
        .await;
    let mut slower = wifi();
    slower.downstream_kbps = 1_000;
    f.orchestrator
        .react_to_capabilities_changed(Some(wifi()), Some(slower))
        .await;
    assert_eq!(sequencer.len(), 5, "three bootstrap steps plus one per reaction");

    sequencer.start().expect("start");
    assert!(sequencer.settled().await.is_completed);

    assert_eq!(f.states.count().await.expect("count"), 2);
    let latest_state = f.states.load_latest().await.expect("load").expect("state");
    assert!(latest_state.has_internet);

    assert_eq!(f.capabilities.count().await.expect("count"), 2);
    let latest_caps = f.capabilities.load_latest().await.expect("load").expect("caps");
    assert_eq!(latest_caps.downstream_kbps, 1_000);
}

#[tokio::test]
async fn direct_reactions_write_immediately() {
    let f = fixture(0, RetentionPolicy::default()).await;
    let sequencer = f.orchestrator.sequencer();
    sequencer.start().expect("start");
    sequencer.settled().await;
    let steps = sequencer.len();

    f.orchestrator.react_to_reachability_changed(true).await;
    assert!(f.orchestrator.is_reachable());
    let latest_state = f.states.load_latest().await.expect("load").expect("state");
    assert!(latest_state.has_internet);

    f.orchestrator
        .react_to_capabilities_changed(Some(wifi()), None)
        .await;
    assert_eq!(f.capabilities.count().await.expect("count"), 1);

    f.orchestrator
        .react_to_capabilities_changed(Some(wifi()), Some(wifi()))
        .await;
    assert_eq!(f.capabilities.count().await.expect("count"), 2);
    assert_eq!(sequencer.len(), steps);
}

#[tokio::test]
async fn session_report_is_queued_once() {
    let f = fixture(0, RetentionPolicy::default()).await;
    assert!(f.orchestrator.attach_session_report());
    assert!(!f.orchestrator.attach_session_report());
    assert_eq!(f.orchestrator.sequencer().len(), 4);
}
