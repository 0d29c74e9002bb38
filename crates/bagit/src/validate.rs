//! Structural and manifest validation of a bag directory.

use crate::error::{BagError, BagResult};
use depot_core::PayloadDigest;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::instrument;

/// Declaration file every bag must carry.
const BAGIT_TXT: &str = "bagit.txt";
/// Payload directory.
const DATA_DIR: &str = "data";
/// Payload manifest (MD5 is the only algorithm this service accepts).
const MANIFEST_MD5: &str = "manifest-md5.txt";
/// Optional tag manifest.
const TAGMANIFEST_MD5: &str = "tagmanifest-md5.txt";

/// Bag versions this validator understands.
const SUPPORTED_VERSIONS: &[&str] = &["0.97"];

/// Read chunk size for payload checksum verification (64 KiB).
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a bag check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The bag is complete and every checksum matches.
    Valid,
    /// The bag is malformed; the diagnostic names the first defect found.
    Invalid(String),
}

impl Verdict {
    /// Whether the bag passed validation.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Validates directories claimed to contain a BagIt v0.97 package.
///
/// Construct one at startup and share it; validation itself is stateless.
#[derive(Clone, Debug, Default)]
pub struct BagValidator;

impl BagValidator {
    pub fn new() -> Self {
        Self
    }

    /// Verify the bag rooted at `bag_dir`.
    ///
    /// Returns `Ok(Verdict)` for well-executed checks whatever their outcome,
    /// and `Err` only when the check itself failed (unreadable files,
    /// undecodable metadata).
    #[instrument(skip_all, fields(bag_dir = %bag_dir.display()))]
    pub fn verify(&self, bag_dir: &Path) -> BagResult<Verdict> {
        match self.check_declaration(bag_dir)? {
            Verdict::Valid => {}
            invalid => return Ok(invalid),
        }

        let data_dir = bag_dir.join(DATA_DIR);
        if !data_dir.is_dir() {
            return Ok(Verdict::Invalid(format!(
                "payload directory {DATA_DIR}/ is missing"
            )));
        }

        let manifest_path = bag_dir.join(MANIFEST_MD5);
        if !manifest_path.is_file() {
            return Ok(Verdict::Invalid(format!(
                "payload manifest {MANIFEST_MD5} is missing"
            )));
        }

        let manifest = match parse_manifest(&manifest_path)? {
            Ok(entries) => entries,
            Err(diagnostic) => return Ok(Verdict::Invalid(diagnostic)),
        };

        // Every declared file must exist and match its checksum.
        for (relative, expected) in &manifest {
            let path = bag_dir.join(relative);
            if !path.is_file() {
                return Ok(Verdict::Invalid(format!(
                    "missing file listed in manifest: {}",
                    relative.display()
                )));
            }
            let actual = file_md5(&path)?;
            if actual != *expected {
                return Ok(Verdict::Invalid(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    relative.display(),
                    expected.to_hex(),
                    actual.to_hex()
                )));
            }
        }

        // Completeness: every payload file must be declared.
        let declared: BTreeSet<&PathBuf> = manifest.iter().map(|(p, _)| p).collect();
        let mut stack = vec![data_dir];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    stack.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(bag_dir)
                    .map_err(|_| BagError::Metadata("payload outside bag".to_string()))?
                    .to_path_buf();
                if !declared.contains(&relative) {
                    return Ok(Verdict::Invalid(format!(
                        "payload file not listed in manifest: {}",
                        relative.display()
                    )));
                }
            }
        }

        // Tag manifest is optional; verify it when present.
        let tagmanifest_path = bag_dir.join(TAGMANIFEST_MD5);
        if tagmanifest_path.is_file() {
            let tag_entries = match parse_manifest(&tagmanifest_path)? {
                Ok(entries) => entries,
                Err(diagnostic) => return Ok(Verdict::Invalid(diagnostic)),
            };
            for (relative, expected) in &tag_entries {
                let path = bag_dir.join(relative);
                if !path.is_file() {
                    return Ok(Verdict::Invalid(format!(
                        "missing tag file listed in tag manifest: {}",
                        relative.display()
                    )));
                }
                let actual = file_md5(&path)?;
                if actual != *expected {
                    return Ok(Verdict::Invalid(format!(
                        "checksum mismatch for tag file {}",
                        relative.display()
                    )));
                }
            }
        }

        Ok(Verdict::Valid)
    }

    fn check_declaration(&self, bag_dir: &Path) -> BagResult<Verdict> {
        let declaration = bag_dir.join(BAGIT_TXT);
        if !declaration.is_file() {
            return Ok(Verdict::Invalid(format!(
                "required tag file {BAGIT_TXT} is missing"
            )));
        }

        let text = std::fs::read_to_string(&declaration).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                BagError::Metadata(format!("{BAGIT_TXT} is not UTF-8"))
            } else {
                BagError::Io(e)
            }
        })?;

        let version = text.lines().find_map(|line| {
            line.strip_prefix("BagIt-Version:").map(|v| v.trim())
        });
        match version {
            Some(v) if SUPPORTED_VERSIONS.contains(&v) => Ok(Verdict::Valid),
            Some(v) => Ok(Verdict::Invalid(format!("unsupported bag version: {v}"))),
            None => Ok(Verdict::Invalid(format!(
                "{BAGIT_TXT} carries no BagIt-Version declaration"
            ))),
        }
    }
}

/// Parse a manifest file.
///
/// Outer error: the file could not be read or decoded. Inner error: the
/// manifest is readable but malformed (a client problem, reported as a
/// diagnostic string).
fn parse_manifest(path: &Path) -> BagResult<Result<Vec<(PathBuf, PayloadDigest)>, String>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            BagError::Metadata(format!("{} is not UTF-8", path.display()))
        } else {
            BagError::Io(e)
        }
    })?;

    let manifest_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((digest, relative)) = line.split_once(char::is_whitespace) else {
            return Ok(Err(format!("{manifest_name}: malformed line: {line}")));
        };
        let digest = match PayloadDigest::from_hex(digest.trim()) {
            Ok(digest) => digest,
            Err(_) => {
                return Ok(Err(format!(
                    "{manifest_name}: malformed checksum on line: {line}"
                )));
            }
        };
        let relative = PathBuf::from(relative.trim());
        if !is_safe_relative(&relative) {
            return Ok(Err(format!(
                "{manifest_name}: unsafe path: {}",
                relative.display()
            )));
        }
        entries.push((relative, digest));
    }
    Ok(Ok(entries))
}

/// Manifest paths are relative to the bag base and must stay inside it.
fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Streaming MD5 of a file.
fn file_md5(path: &Path) -> BagResult<PayloadDigest> {
    let mut file = File::open(path)?;
    let mut hasher = PayloadDigest::hasher();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
