//! Promotion of a staging directory onto permanent storage.

use crate::error::{StorageError, StorageResult};
use depot_core::DepositId;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;
use uuid::Uuid;

/// Moves accepted deposits from the staging tree into `deposits_root`.
pub struct Promoter {
    deposits_root: PathBuf,
}

impl Promoter {
    /// Create a promoter, creating the storage root if necessary.
    pub async fn new(deposits_root: impl AsRef<Path>) -> StorageResult<Self> {
        let deposits_root = deposits_root.as_ref().to_path_buf();
        fs::create_dir_all(&deposits_root).await?;
        Ok(Self { deposits_root })
    }

    /// The permanent storage directory of a deposit.
    pub fn storage_dir(&self, id: &DepositId) -> PathBuf {
        self.deposits_root.join(id.as_str())
    }

    /// Move `staging_dir` to the permanent location of the deposit.
    ///
    /// On the same filesystem this is a single rename. Across devices the
    /// tree is copied into a hidden sibling under `deposits_root`, fsynced,
    /// and renamed into place, so a partial destination is never observable
    /// under the final name. The destination must not already exist.
    #[instrument(skip(self, staging_dir), fields(deposit_id = %id))]
    pub async fn promote(&self, id: &DepositId, staging_dir: &Path) -> StorageResult<PathBuf> {
        let dest = self.storage_dir(id);
        if fs::try_exists(&dest).await.map_err(StorageError::Io)? {
            return Err(StorageError::AlreadyExists(dest.display().to_string()));
        }

        match fs::rename(staging_dir, &dest).await {
            Ok(()) => Ok(dest),
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                tracing::info!(
                    deposit_id = %id,
                    "staging and storage on different filesystems, copying"
                );
                self.promote_across_devices(id, staging_dir, &dest).await?;
                Ok(dest)
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn promote_across_devices(
        &self,
        id: &DepositId,
        staging_dir: &Path,
        dest: &Path,
    ) -> StorageResult<()> {
        let temp_dest = self
            .deposits_root
            .join(format!(".promote.{}.{}", id.as_str(), Uuid::new_v4()));

        let src = staging_dir.to_path_buf();
        let copy_target = temp_dest.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree_sync(&src, &copy_target))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(format!("copy task failed: {e}"))))?;

        if let Err(e) = copied {
            // Leave nothing behind under the storage root.
            let _ = fs::remove_dir_all(&temp_dest).await;
            return Err(e);
        }

        fs::rename(&temp_dest, dest).await?;
        fs::remove_dir_all(staging_dir).await?;
        Ok(())
    }
}

/// Copy a directory tree, fsyncing every file before returning.
fn copy_tree_sync(src: &Path, dest: &Path) -> StorageResult<()> {
    std::fs::create_dir_all(dest)?;

    let mut stack = vec![(src.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        for entry in std::fs::read_dir(&from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                std::fs::create_dir_all(&target)?;
                stack.push((entry.path(), target));
            } else if file_type.is_file() {
                std::fs::copy(entry.path(), &target)?;
                let file = std::fs::File::open(&target)?;
                file.sync_all()?;
            } else {
                return Err(StorageError::InconsistentDataset(format!(
                    "unexpected entry type during promotion: {}",
                    entry.path().display()
                )));
            }
        }
    }
    Ok(())
}
