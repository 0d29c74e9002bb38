//! Archive extraction into a staging directory.

use crate::error::{StorageError, StorageResult};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::instrument;
use zip::ZipArchive;
use zip::result::ZipError;

/// Unpack a ZIP archive into `dest`, preserving relative paths.
///
/// Entries whose normalized path would escape the destination are rejected.
/// The underlying library is synchronous, so the work runs on the blocking
/// pool.
#[instrument(skip_all, fields(archive = %archive.display()))]
pub async fn unpack(archive: &Path, dest: &Path) -> StorageResult<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || unpack_sync(&archive, &dest))
        .await
        .map_err(|e| StorageError::Archive(format!("extraction task failed: {e}")))?
}

fn unpack_sync(archive: &Path, dest: &Path) -> StorageResult<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(zip_error)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_error)?;

        // enclosed_name normalizes the entry path and refuses anything that
        // points outside the destination (absolute paths, `..` components).
        let Some(relative) = entry.enclosed_name() else {
            return Err(StorageError::PathEscape(entry.name().to_string()));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

fn zip_error(e: ZipError) -> StorageError {
    match e {
        ZipError::Io(io) => StorageError::Io(io),
        other => StorageError::Archive(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn unpack_preserves_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pkg.zip");
        write_zip(
            &archive,
            &[
                ("bag/bagit.txt", b"BagIt-Version: 0.97\n"),
                ("bag/data/a.txt", b"alpha"),
            ],
        );

        let dest = tmp.path().join("out");
        unpack(&archive, &dest).await.unwrap();

        assert_eq!(
            std::fs::read(dest.join("bag/data/a.txt")).unwrap(),
            b"alpha"
        );
        assert!(dest.join("bag/bagit.txt").exists());
    }

    #[tokio::test]
    async fn unpack_rejects_traversal_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"boom")]);

        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();

        let err = unpack(&archive, &dest).await.unwrap_err();
        assert!(matches!(err, StorageError::PathEscape(_)));
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn unpack_classifies_corrupt_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        std::fs::write(&archive, b"this is not a zip file").unwrap();

        let dest = tmp.path().join("out");
        let err = unpack(&archive, &dest).await.unwrap_err();
        assert!(matches!(err, StorageError::Archive(_)));
    }
}
