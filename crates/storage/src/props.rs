//! The per-deposit state record (`deposit.properties`).
//!
//! The record lives inside the staging directory while the deposit is
//! pre-promotion and inside the storage directory afterwards. Readers consult
//! staging first, then storage. Every write goes through a temp file and a
//! rename, so a concurrent reader sees either the old or the new record,
//! never a partial one.

use crate::error::{StorageError, StorageResult};
use depot_core::{DepositId, DepositState, PROPERTIES_FILE, PackageType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

const KEY_STATE: &str = "state";
const KEY_DESCRIPTION: &str = "state.description";
const KEY_MIME_TYPE: &str = "mime-type";

/// A parsed deposit record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositRecord {
    /// Lifecycle state.
    pub state: DepositState,
    /// Human-readable explanation of the current state.
    pub description: String,
    /// Content type the deposit was received with, once known.
    pub mime_type: Option<PackageType>,
}

/// Disk-backed store for deposit records. No caching; every call hits disk.
pub struct PropsStore {
    temp_root: PathBuf,
    deposits_root: PathBuf,
}

impl PropsStore {
    /// Create a store over the two record locations.
    pub fn new(temp_root: impl Into<PathBuf>, deposits_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
            deposits_root: deposits_root.into(),
        }
    }

    /// Path of the record while the deposit is staged.
    pub fn staging_record(&self, id: &DepositId) -> PathBuf {
        self.temp_root.join(id.as_str()).join(PROPERTIES_FILE)
    }

    /// Path of the record after promotion.
    pub fn storage_record(&self, id: &DepositId) -> PathBuf {
        self.deposits_root.join(id.as_str()).join(PROPERTIES_FILE)
    }

    /// Write state and description for a deposit.
    ///
    /// If `prefer_staging` and a staging record exists, the staging record is
    /// updated; otherwise an existing storage record is updated; if neither
    /// exists, the record is created under staging. Keys other than the state
    /// pair are preserved.
    #[instrument(skip(self, message), fields(deposit_id = %id, state = %state))]
    pub async fn set(
        &self,
        id: &DepositId,
        state: DepositState,
        message: &str,
        prefer_staging: bool,
    ) -> StorageResult<()> {
        let staging = self.staging_record(id);
        let storage = self.storage_record(id);

        let target = if prefer_staging && record_exists(&staging).await? {
            staging
        } else if record_exists(&storage).await? {
            storage
        } else {
            staging
        };

        let mut props = match read_record(&target).await {
            Ok(props) => props,
            Err(StorageError::NotFound(_)) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        props.insert(KEY_STATE.to_string(), state.as_str().to_string());
        props.insert(KEY_DESCRIPTION.to_string(), sanitize_value(message));

        write_record(&target, &props).await
    }

    /// Record the content type on the staging record.
    ///
    /// Fails with `NotFound` if the deposit has no staging record yet; the
    /// ingress front writes the state pair first.
    pub async fn set_mime_type(&self, id: &DepositId, mime: PackageType) -> StorageResult<()> {
        let path = self.staging_record(id);
        let mut props = read_record(&path).await?;
        props.insert(KEY_MIME_TYPE.to_string(), mime.mime_type().to_string());
        write_record(&path, &props).await
    }

    /// Read the record of a deposit, consulting staging first, then storage.
    pub async fn get(&self, id: &DepositId) -> StorageResult<DepositRecord> {
        for path in [self.staging_record(id), self.storage_record(id)] {
            match read_record(&path).await {
                Ok(props) => return parse_record(id, &props),
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::NotFound(format!(
            "no record for deposit {id}"
        )))
    }

    /// Read only the lifecycle state of a deposit.
    pub async fn get_state(&self, id: &DepositId) -> StorageResult<DepositState> {
        Ok(self.get(id).await?.state)
    }
}

async fn record_exists(path: &Path) -> StorageResult<bool> {
    fs::try_exists(path).await.map_err(StorageError::Io)
}

async fn read_record(path: &Path) -> StorageResult<BTreeMap<String, String>> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(StorageError::Io(e)),
    };
    parse_props(&text).map_err(|line| {
        StorageError::Record(format!("{}: bad line: {line}", path.display()))
    })
}

async fn write_record(path: &Path, props: &BTreeMap<String, String>) -> StorageResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::Record(format!("record has no parent: {}", path.display())))?;
    fs::create_dir_all(dir).await?;

    let mut text = String::new();
    for (key, value) in props {
        text.push_str(key);
        text.push('=');
        text.push_str(value);
        text.push('\n');
    }

    let temp_path = dir.join(format!(".{PROPERTIES_FILE}.{}", Uuid::new_v4()));
    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(text.as_bytes()).await?;
        file.sync_all().await?;
    }
    fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Parse `key=value` lines. Returns the offending line on failure.
fn parse_props(text: &str) -> Result<BTreeMap<String, String>, String> {
    let mut props = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| line.to_string())?;
        props.insert(key.trim().to_string(), value.to_string());
    }
    Ok(props)
}

fn parse_record(id: &DepositId, props: &BTreeMap<String, String>) -> StorageResult<DepositRecord> {
    let state = props
        .get(KEY_STATE)
        .ok_or_else(|| StorageError::Record(format!("deposit {id}: missing key {KEY_STATE}")))?;
    let state = DepositState::parse(state)
        .map_err(|e| StorageError::Record(format!("deposit {id}: {e}")))?;
    let description = props.get(KEY_DESCRIPTION).cloned().unwrap_or_default();
    let mime_type = match props.get(KEY_MIME_TYPE) {
        Some(mime) => Some(
            PackageType::from_mime_type(mime)
                .map_err(|e| StorageError::Record(format!("deposit {id}: {e}")))?,
        ),
        None => None,
    };
    Ok(DepositRecord {
        state,
        description,
        mime_type,
    })
}

/// Values live on a single `key=value` line; fold line breaks away.
fn sanitize_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
