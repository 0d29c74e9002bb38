//! Server test utilities.

use depot_bagit::BagValidator;
use depot_core::config::AppConfig;
use depot_core::{DepositId, DepositState};
use depot_server::finalize::spawn_finalizer;
use depot_server::{AppState, create_router};
use depot_storage::{Promoter, PropsStore, StagingArea};
use depot_vcs::Versioning;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub worker: tokio::task::JoinHandle<()>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage roots.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing();
        config.store.temp_root = temp_dir.path().join("staging");
        config.store.deposits_root = temp_dir.path().join("deposits");
        modifier(&mut config);

        let staging = Arc::new(
            StagingArea::new(&config.store.temp_root)
                .await
                .expect("Failed to create staging area"),
        );
        let props = Arc::new(PropsStore::new(
            &config.store.temp_root,
            &config.store.deposits_root,
        ));
        let promoter = Arc::new(
            Promoter::new(&config.store.deposits_root)
                .await
                .expect("Failed to create deposits root"),
        );
        let versioning = Versioning::from_config(&config.vcs);

        let (finalizer, worker) = spawn_finalizer(
            staging.clone(),
            props.clone(),
            promoter,
            BagValidator::new(),
            versioning,
            config.server.queue_capacity,
        );

        let state = AppState::new(config, staging, props, finalizer);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            worker,
            _temp_dir: temp_dir,
        }
    }

    /// Access to the deposit record store.
    pub fn props(&self) -> Arc<PropsStore> {
        self.state.props.clone()
    }

    /// The staging directory of a deposit.
    pub fn staging_dir(&self, id: &DepositId) -> PathBuf {
        self.state.staging.deposit_dir(id)
    }

    /// The permanent storage directory of a deposit.
    pub fn storage_dir(&self, id: &DepositId) -> PathBuf {
        self.state.config.store.deposits_root.join(id.as_str())
    }

    /// Poll the deposit record until it reaches a terminal state.
    pub async fn await_terminal(&self, id: &DepositId) -> DepositState {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Ok(state) = self.props().get_state(id).await {
                if state.is_terminal() {
                    return state;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!("deposit {id} did not reach a terminal state in time");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the deposit has been promoted onto permanent storage.
    ///
    /// `SUBMITTED` is observable from the staging record before the move
    /// completes, so tests that inspect the storage directory wait for the
    /// record to arrive there.
    pub async fn await_promoted(&self, id: &DepositId) -> PathBuf {
        let storage_dir = self.storage_dir(id);
        let record = storage_dir.join("deposit.properties");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !record.exists() {
            if tokio::time::Instant::now() > deadline {
                panic!("deposit {id} was not promoted in time");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        storage_dir
    }
}
