//! The deposit finalization pipeline.
//!
//! A single worker drains a bounded FIFO queue of completed uploads and runs
//! each deposit through reassembly, extraction, bag validation, state
//! recording, optional versioning and promotion. Every failure is caught at
//! the worker boundary and mapped to a terminal state; the worker itself
//! never stops on a single deposit's failure.

use crate::error::ApiError;
use depot_bagit::{BagError, BagValidator, Verdict};
use depot_core::{DepositId, DepositState, PackageType};
use depot_storage::{Promoter, PropsStore, StagingArea, StorageError, unpack};
use depot_vcs::{VcsError, Versioning};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument;

/// One completed upload, queued for finalization.
#[derive(Clone, Debug)]
pub struct FinalizeRequest {
    /// The deposit to finalize.
    pub deposit_id: DepositId,
    /// Content type the payload was received with.
    pub package: PackageType,
}

/// Sending side of the finalization queue.
///
/// `submit` blocks while the queue is full; that is the backpressure between
/// the ingress front and the worker.
#[derive(Clone)]
pub struct FinalizeHandle {
    tx: mpsc::Sender<FinalizeRequest>,
}

impl FinalizeHandle {
    /// Enqueue a deposit for finalization, waiting for queue space.
    pub async fn submit(&self, request: FinalizeRequest) -> Result<(), ApiError> {
        self.tx.send(request).await.map_err(|_| {
            ApiError::Internal("finalization queue is shut down".to_string())
        })
    }
}

/// Classified pipeline failure; decides which terminal state gets written.
#[derive(Debug)]
enum FinalizeError {
    /// The client supplied malformed content.
    Invalid(String),
    /// Operator-side or transient fault.
    Failed(String),
}

impl From<StorageError> for FinalizeError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidSequence(_) => Self::Invalid(e.to_string()),
            other => Self::Failed(other.to_string()),
        }
    }
}

impl From<BagError> for FinalizeError {
    fn from(e: BagError) -> Self {
        Self::Failed(e.to_string())
    }
}

impl From<VcsError> for FinalizeError {
    fn from(e: VcsError) -> Self {
        Self::Failed(e.to_string())
    }
}

/// The pipeline over one set of storage services.
pub struct Finalizer {
    staging: Arc<StagingArea>,
    props: Arc<PropsStore>,
    promoter: Arc<Promoter>,
    validator: BagValidator,
    versioning: Option<Versioning>,
}

/// Spawn the finalization worker.
///
/// Returns the queue handle for the ingress front and the worker's join
/// handle. The worker exits once every `FinalizeHandle` clone is dropped and
/// the queue has drained.
pub fn spawn_finalizer(
    staging: Arc<StagingArea>,
    props: Arc<PropsStore>,
    promoter: Arc<Promoter>,
    validator: BagValidator,
    versioning: Option<Versioning>,
    queue_capacity: usize,
) -> (FinalizeHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let finalizer = Arc::new(Finalizer {
        staging,
        props,
        promoter,
        validator,
        versioning,
    });
    let worker = tokio::spawn(run_worker(finalizer, rx));
    (FinalizeHandle { tx }, worker)
}

async fn run_worker(finalizer: Arc<Finalizer>, mut rx: mpsc::Receiver<FinalizeRequest>) {
    while let Some(request) = rx.recv().await {
        let deposit_id = request.deposit_id.clone();
        let task = {
            let finalizer = finalizer.clone();
            tokio::spawn(async move { finalizer.finalize(request).await })
        };

        // A panicking run must not take the worker down; it is recorded as
        // an unclassified failure like any other.
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                tracing::error!(
                    deposit_id = %deposit_id,
                    error = %join_error,
                    "finalization run aborted"
                );
                Err(FinalizeError::Failed(
                    "Unexpected failure in deposit".to_string(),
                ))
            }
        };

        match outcome {
            Ok(()) => {
                tracing::info!(deposit_id = %deposit_id, "deposit archived");
            }
            Err(error) => {
                finalizer.record_failure(&deposit_id, error).await;
            }
        }
    }
    tracing::info!("finalization queue closed, worker exiting");
}

impl Finalizer {
    /// Run the full pipeline for one deposit.
    #[instrument(skip(self, request), fields(deposit_id = %request.deposit_id))]
    async fn finalize(&self, request: FinalizeRequest) -> Result<(), FinalizeError> {
        let id = &request.deposit_id;
        let staging_dir = self.staging.deposit_dir(id);

        if let Some(vcs) = &self.versioning {
            run_blocking_vcs(vcs.clone(), staging_dir.clone(), |vcs, dir| vcs.init(&dir)).await?;
        }

        self.reassemble(id, request.package, &staging_dir).await?;

        let bag_dir = locate_bag_dir(&staging_dir).await?;

        let verdict = {
            let validator = self.validator.clone();
            let bag_dir = bag_dir.clone();
            tokio::task::spawn_blocking(move || validator.verify(&bag_dir))
                .await
                .map_err(|e| FinalizeError::Failed(format!("validation task failed: {e}")))??
        };
        if let Verdict::Invalid(diagnostic) = verdict {
            return Err(FinalizeError::Invalid(diagnostic));
        }

        // The terminal state is recorded on the staging record before the
        // move so it survives a crash during promotion; after the rename the
        // same record is the storage record.
        self.props
            .set(id, DepositState::Submitted, "deposit is archived", true)
            .await
            .map_err(FinalizeError::from)?;

        if let Some(vcs) = &self.versioning {
            run_blocking_vcs(vcs.clone(), staging_dir.clone(), |vcs, dir| {
                vcs.commit_submitted(&dir)
            })
            .await?;
        }

        self.promoter.promote(id, &staging_dir).await?;
        Ok(())
    }

    /// Reassemble the received parts and extract the archive in place.
    async fn reassemble(
        &self,
        id: &DepositId,
        package: PackageType,
        staging_dir: &Path,
    ) -> Result<(), FinalizeError> {
        let parts = self.staging.parts(id).await?;
        if parts.is_empty() {
            return Err(FinalizeError::Invalid("no payload".to_string()));
        }

        match package {
            PackageType::Single => {
                for part in parts {
                    let meta = fs::metadata(&part).await.map_err(StorageError::Io)?;
                    if !meta.is_file() {
                        return Err(StorageError::InconsistentDataset(format!(
                            "payload part is not a regular file: {}",
                            part.display()
                        ))
                        .into());
                    }
                    unpack(&part, staging_dir).await?;
                    self.staging.remove_part(&part).await?;
                }
            }
            PackageType::Chunked => {
                let ordered = StagingArea::order_chunks(parts)?;
                let merged = self.staging.merge_chunks(id, &ordered).await?;
                unpack(&merged, staging_dir).await?;
                for part in &ordered {
                    self.staging.remove_part(part).await?;
                }
                self.staging.remove_part(&merged).await?;
            }
        }
        Ok(())
    }

    /// Map a pipeline failure onto its terminal state. The staging directory
    /// is retained for operator inspection.
    async fn record_failure(&self, id: &DepositId, error: FinalizeError) {
        let (state, message) = match error {
            FinalizeError::Invalid(message) => (DepositState::Invalid, message),
            FinalizeError::Failed(message) => (DepositState::Failed, message),
        };
        tracing::warn!(
            deposit_id = %id,
            state = %state,
            message = %message,
            "finalization run ended in failure state"
        );
        if let Err(e) = self.props.set(id, state, &message, true).await {
            tracing::error!(
                deposit_id = %id,
                error = %e,
                "failed to record terminal state"
            );
        }
    }
}

async fn run_blocking_vcs<F>(
    vcs: Versioning,
    dir: PathBuf,
    op: F,
) -> Result<(), FinalizeError>
where
    F: FnOnce(&Versioning, PathBuf) -> Result<(), VcsError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&vcs, dir))
        .await
        .map_err(|e| FinalizeError::Failed(format!("versioning task failed: {e}")))?
        .map_err(FinalizeError::from)
}

/// Find the single top-level directory the extracted bag lives in.
async fn locate_bag_dir(staging_dir: &Path) -> Result<PathBuf, FinalizeError> {
    let mut candidates = Vec::new();
    let mut entries = fs::read_dir(staging_dir).await.map_err(StorageError::Io)?;
    while let Some(entry) = entries.next_entry().await.map_err(StorageError::Io)? {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if entry
            .file_type()
            .await
            .map_err(StorageError::Io)?
            .is_dir()
        {
            candidates.push(entry.path());
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        n => Err(FinalizeError::Failed(format!(
            "expected exactly one bag directory after extraction, found {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    struct Harness {
        _tmp: tempfile::TempDir,
        staging: Arc<StagingArea>,
        props: Arc<PropsStore>,
        handle: FinalizeHandle,
        worker: JoinHandle<()>,
    }

    async fn harness() -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Arc::new(
            StagingArea::new(tmp.path().join("staging")).await.unwrap(),
        );
        let props = Arc::new(PropsStore::new(
            tmp.path().join("staging"),
            tmp.path().join("deposits"),
        ));
        let promoter = Arc::new(Promoter::new(tmp.path().join("deposits")).await.unwrap());
        let (handle, worker) = spawn_finalizer(
            staging.clone(),
            props.clone(),
            promoter,
            BagValidator::new(),
            None,
            4,
        );
        Harness {
            _tmp: tmp,
            staging,
            props,
            handle,
            worker,
        }
    }

    async fn await_terminal(props: &PropsStore, id: &DepositId) -> DepositState {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if let Ok(state) = props.get_state(id).await {
                if state.is_terminal() {
                    return state;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!("deposit {id} did not reach a terminal state in time");
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    async fn mark_finalizing(h: &Harness, id: &DepositId) {
        h.props
            .set(id, DepositState::Finalizing, "deposit is being finalized", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_payload_is_invalid() {
        let h = harness().await;
        let id = DepositId::parse("dep-empty").unwrap();
        h.staging.ensure_dir(&id).await.unwrap();
        mark_finalizing(&h, &id).await;

        h.handle
            .submit(FinalizeRequest {
                deposit_id: id.clone(),
                package: PackageType::Single,
            })
            .await
            .unwrap();

        assert_eq!(await_terminal(&h.props, &id).await, DepositState::Invalid);
        let record = h.props.get(&id).await.unwrap();
        assert_eq!(record.description, "no payload");
        // Staging is retained for inspection.
        assert!(h.staging.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn bad_sequence_suffix_is_invalid() {
        let h = harness().await;
        let id = DepositId::parse("dep-badseq").unwrap();
        h.staging
            .write_part(&id, "pkg.zip", Bytes::from_static(b"bytes"))
            .await
            .unwrap();
        mark_finalizing(&h, &id).await;

        h.handle
            .submit(FinalizeRequest {
                deposit_id: id.clone(),
                package: PackageType::Chunked,
            })
            .await
            .unwrap();

        assert_eq!(await_terminal(&h.props, &id).await, DepositState::Invalid);
        let record = h.props.get(&id).await.unwrap();
        assert!(
            record.description.contains("sequence number"),
            "got: {}",
            record.description
        );
    }

    #[tokio::test]
    async fn non_regular_part_is_failed() {
        let h = harness().await;
        let id = DepositId::parse("dep-dirpart").unwrap();
        let dir = h.staging.ensure_dir(&id).await.unwrap();
        fs::create_dir(dir.join("subdir")).await.unwrap();
        mark_finalizing(&h, &id).await;

        h.handle
            .submit(FinalizeRequest {
                deposit_id: id.clone(),
                package: PackageType::Single,
            })
            .await
            .unwrap();

        assert_eq!(await_terminal(&h.props, &id).await, DepositState::Failed);
        let record = h.props.get(&id).await.unwrap();
        assert!(
            record.description.contains("inconsistent dataset"),
            "got: {}",
            record.description
        );
    }

    #[tokio::test]
    async fn corrupt_archive_is_failed() {
        let h = harness().await;
        let id = DepositId::parse("dep-corrupt").unwrap();
        h.staging
            .write_part(&id, "pkg.zip", Bytes::from_static(b"not a zip archive"))
            .await
            .unwrap();
        mark_finalizing(&h, &id).await;

        h.handle
            .submit(FinalizeRequest {
                deposit_id: id.clone(),
                package: PackageType::Single,
            })
            .await
            .unwrap();

        assert_eq!(await_terminal(&h.props, &id).await, DepositState::Failed);
    }

    #[tokio::test]
    async fn worker_survives_failures_and_processes_next_item() {
        let h = harness().await;

        let bad = DepositId::parse("dep-bad").unwrap();
        h.staging.ensure_dir(&bad).await.unwrap();
        mark_finalizing(&h, &bad).await;

        let also_bad = DepositId::parse("dep-bad2").unwrap();
        h.staging
            .write_part(&also_bad, "pkg.nan", Bytes::from_static(b"x"))
            .await
            .unwrap();
        mark_finalizing(&h, &also_bad).await;

        for (id, package) in [
            (bad.clone(), PackageType::Single),
            (also_bad.clone(), PackageType::Chunked),
        ] {
            h.handle
                .submit(FinalizeRequest {
                    deposit_id: id,
                    package,
                })
                .await
                .unwrap();
        }

        assert_eq!(await_terminal(&h.props, &bad).await, DepositState::Invalid);
        assert_eq!(
            await_terminal(&h.props, &also_bad).await,
            DepositState::Invalid
        );

        // Dropping the last handle closes the queue and the worker exits.
        drop(h.handle);
        h.worker.await.unwrap();
    }

    /// A minimal well-formed bag archive with one payload file.
    fn bag_zip_bytes() -> Vec<u8> {
        use std::io::Write as _;
        let payload: &[u8] = b"measurements\n";
        let manifest = format!(
            "{}  data/readme.txt\n",
            depot_core::PayloadDigest::compute(payload).to_hex()
        );

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("bag/bagit.txt", options).unwrap();
        writer
            .write_all(b"BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n")
            .unwrap();
        writer.start_file("bag/manifest-md5.txt", options).unwrap();
        writer.write_all(manifest.as_bytes()).unwrap();
        writer.start_file("bag/data/readme.txt", options).unwrap();
        writer.write_all(payload).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn valid_bag_is_promoted() {
        let h = harness().await;
        let id = DepositId::parse("dep-ok").unwrap();
        h.staging
            .write_part(&id, "bag.zip", Bytes::from(bag_zip_bytes()))
            .await
            .unwrap();
        mark_finalizing(&h, &id).await;

        h.handle
            .submit(FinalizeRequest {
                deposit_id: id.clone(),
                package: PackageType::Single,
            })
            .await
            .unwrap();

        assert_eq!(await_terminal(&h.props, &id).await, DepositState::Submitted);

        // SUBMITTED is observable from the staging record before the move
        // completes; wait for the record to arrive at its storage location.
        let storage_record = h.props.storage_record(&id);
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while !storage_record.exists() {
            if tokio::time::Instant::now() > deadline {
                panic!("deposit was not promoted in time");
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        // Staging is gone; the record and payload live on permanent storage.
        assert!(!h.staging.exists(&id).await.unwrap());
        assert!(
            storage_record
                .parent()
                .unwrap()
                .join("bag/data/readme.txt")
                .exists()
        );
    }

    #[tokio::test]
    async fn existing_storage_dir_fails_promotion() {
        let h = harness().await;
        let id = DepositId::parse("dep-clash").unwrap();
        h.staging
            .write_part(&id, "bag.zip", Bytes::from(bag_zip_bytes()))
            .await
            .unwrap();
        mark_finalizing(&h, &id).await;

        // Occupy the destination before the run.
        let occupied = h.props.storage_record(&id);
        fs::create_dir_all(occupied.parent().unwrap()).await.unwrap();

        h.handle
            .submit(FinalizeRequest {
                deposit_id: id.clone(),
                package: PackageType::Single,
            })
            .await
            .unwrap();

        // SUBMITTED is recorded before promotion and then overwritten by the
        // failure, so poll for FAILED specifically.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if let Ok(DepositState::Failed) = h.props.get_state(&id).await {
                break;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("deposit did not reach FAILED in time");
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        // The staging tree is retained for the operator.
        assert!(h.staging.exists(&id).await.unwrap());
    }

    #[test]
    fn storage_errors_classify_by_fault_owner() {
        let invalid: FinalizeError = StorageError::InvalidSequence("pkg.zip".into()).into();
        assert!(matches!(invalid, FinalizeError::Invalid(_)));

        let failed: FinalizeError = StorageError::AlreadyExists("/d/dep".into()).into();
        assert!(matches!(failed, FinalizeError::Failed(_)));

        let failed: FinalizeError =
            StorageError::InconsistentDataset("part is a directory".into()).into();
        assert!(matches!(failed, FinalizeError::Failed(_)));

        let failed: FinalizeError = StorageError::Archive("bad central directory".into()).into();
        assert!(matches!(failed, FinalizeError::Failed(_)));
    }

    #[tokio::test]
    async fn locate_bag_dir_requires_exactly_one_candidate() {
        let tmp = tempfile::tempdir().unwrap();

        let err = locate_bag_dir(tmp.path()).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Failed(_)));

        fs::create_dir(tmp.path().join("bag-a")).await.unwrap();
        fs::write(tmp.path().join("deposit.properties"), "state=FINALIZING\n")
            .await
            .unwrap();
        fs::create_dir(tmp.path().join(".git")).await.unwrap();
        let found = locate_bag_dir(tmp.path()).await.unwrap();
        assert!(found.ends_with("bag-a"));

        fs::create_dir(tmp.path().join("bag-b")).await.unwrap();
        let err = locate_bag_dir(tmp.path()).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Failed(_)));
    }
}
