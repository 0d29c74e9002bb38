//! Per-deposit staging directories and part handling.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use depot_core::{DepositId, MERGED_ARCHIVE, PROPERTIES_FILE, PayloadDigest};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming digests and concatenation (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// The staging tree: one directory per in-flight deposit under `temp_root`.
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Create a new staging area, creating the root if necessary.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root of the staging tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The staging directory of a deposit. The directory may not exist yet.
    pub fn deposit_dir(&self, id: &DepositId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Create the staging directory of a deposit if it does not exist.
    pub async fn ensure_dir(&self, id: &DepositId) -> StorageResult<PathBuf> {
        let dir = self.deposit_dir(id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Whether the deposit has a staging directory.
    pub async fn exists(&self, id: &DepositId) -> StorageResult<bool> {
        fs::try_exists(&self.deposit_dir(id))
            .await
            .map_err(StorageError::Io)
    }

    /// Validate a client-supplied part filename.
    ///
    /// Part names become direct children of the staging directory; anything
    /// that could alias another path component or a reserved file is refused.
    pub fn validate_part_name(name: &str) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidPartName("empty filename".to_string()));
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(StorageError::InvalidPartName(format!(
                "path components not allowed: {name}"
            )));
        }
        if name.starts_with('.') {
            return Err(StorageError::InvalidPartName(format!(
                "hidden names not allowed: {name}"
            )));
        }
        if name == PROPERTIES_FILE || name == MERGED_ARCHIVE {
            return Err(StorageError::InvalidPartName(format!(
                "reserved name: {name}"
            )));
        }
        if name.bytes().any(|b| b.is_ascii_control()) {
            return Err(StorageError::InvalidPartName(
                "control characters not allowed".to_string(),
            ));
        }
        Ok(())
    }

    /// Write one payload part into the staging directory.
    ///
    /// The part is written to a temp file, fsynced and renamed into place, so
    /// a part either exists completely or not at all.
    #[instrument(skip(self, data), fields(deposit_id = %id, size = data.len()))]
    pub async fn write_part(
        &self,
        id: &DepositId,
        filename: &str,
        data: Bytes,
    ) -> StorageResult<PathBuf> {
        Self::validate_part_name(filename)?;
        let dir = self.ensure_dir(id).await?;
        let path = dir.join(filename);

        let temp_path = dir.join(format!(".part.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(path)
    }

    /// Remove a single part file.
    pub async fn remove_part(&self, path: &Path) -> StorageResult<()> {
        fs::remove_file(path).await?;
        Ok(())
    }

    /// Remove the whole staging directory of a deposit, if present.
    pub async fn remove_dir(&self, id: &DepositId) -> StorageResult<()> {
        let dir = self.deposit_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Remove the staging directory if it holds nothing but leftovers of a
    /// rejected part (used after a checksum mismatch on a fresh deposit).
    pub async fn remove_dir_if_empty(&self, id: &DepositId) -> StorageResult<()> {
        let parts = self.parts(id).await?;
        if parts.is_empty() {
            self.remove_dir(id).await?;
        }
        Ok(())
    }

    /// List the payload part entries of a deposit.
    ///
    /// The state record and hidden entries (temp files, a versioning
    /// repository) are not parts. Entries of any other file type are
    /// returned so callers can classify them.
    pub async fn parts(&self, id: &DepositId) -> StorageResult<Vec<PathBuf>> {
        let dir = self.deposit_dir(id);
        if !fs::try_exists(&dir).await.map_err(StorageError::Io)? {
            return Err(StorageError::NotFound(format!(
                "no staging directory for deposit {id}"
            )));
        }

        let mut parts = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == PROPERTIES_FILE || name.starts_with('.') {
                continue;
            }
            parts.push(entry.path());
        }
        parts.sort();
        Ok(parts)
    }

    /// Order chunked parts ascending by the integer suffix after the last
    /// `.` of their filename.
    ///
    /// A part whose suffix does not parse as a non-negative integer is a
    /// client error. Gaps in the sequence are not an error; parts are
    /// concatenated in sorted order regardless.
    pub fn order_chunks(parts: Vec<PathBuf>) -> StorageResult<Vec<PathBuf>> {
        let mut numbered = Vec::with_capacity(parts.len());
        for path in parts {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let seq = name
                .rsplit_once('.')
                .and_then(|(_, suffix)| suffix.parse::<u64>().ok())
                .ok_or_else(|| StorageError::InvalidSequence(name.clone()))?;
            numbered.push((seq, path));
        }
        numbered.sort_by_key(|(seq, _)| *seq);
        Ok(numbered.into_iter().map(|(_, path)| path).collect())
    }

    /// Concatenate ordered chunk parts into `merged.archive` inside the
    /// staging directory and return its path.
    #[instrument(skip(self, ordered), fields(deposit_id = %id, parts = ordered.len()))]
    pub async fn merge_chunks(
        &self,
        id: &DepositId,
        ordered: &[PathBuf],
    ) -> StorageResult<PathBuf> {
        let dir = self.deposit_dir(id);
        let merged = dir.join(MERGED_ARCHIVE);
        let temp_path = dir.join(format!(".merge.{}", Uuid::new_v4()));

        {
            let mut out = fs::File::create(&temp_path).await?;
            for part in ordered {
                let mut input = fs::File::open(part).await?;
                tokio::io::copy(&mut input, &mut out).await?;
            }
            out.sync_all().await?;
        }
        fs::rename(&temp_path, &merged).await?;

        Ok(merged)
    }
}

/// Compute the MD5 digest of a file by streaming its contents.
pub async fn digest_file(path: &Path) -> StorageResult<PayloadDigest> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = PayloadDigest::hasher();
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
