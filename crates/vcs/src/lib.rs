//! Versioning of accepted deposits.
//!
//! When enabled, every deposit gets a repository initialized on its staging
//! directory before processing, and on acceptance the whole tree is committed
//! and tagged `state=SUBMITTED` so the promoted directory carries a
//! verifiable snapshot of exactly what was archived.
//!
//! All operations are synchronous (libgit2); callers run them on the
//! blocking pool.

pub mod error;

pub use error::{VcsError, VcsResult};

use depot_core::config::VcsConfig;
use git2::{IndexAddOption, Repository, Signature};
use std::path::Path;
use tracing::instrument;

/// Tag applied to the accepted snapshot.
pub const SUBMITTED_TAG: &str = "state=SUBMITTED";

/// Commit message of the accepted snapshot.
const COMMIT_MESSAGE: &str = "initial commit";

/// The versioning adapter. Exists only when versioning is enabled.
#[derive(Clone, Debug)]
pub struct Versioning {
    user: String,
    email: String,
}

impl Versioning {
    /// Build the adapter from configuration; `None` when versioning is
    /// disabled. The identity fields are validated by `VcsConfig::validate`
    /// before this is called.
    pub fn from_config(config: &VcsConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Some(Self {
            user: config.user.clone().unwrap_or_default(),
            email: config.email.clone().unwrap_or_default(),
        })
    }

    /// Initialize a repository rooted at `dir`.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn init(&self, dir: &Path) -> VcsResult<()> {
        Repository::init(dir)?;
        Ok(())
    }

    /// Stage every file under the repository, commit, and tag the commit.
    ///
    /// The repository must have been created by [`Versioning::init`]; this
    /// creates the initial (parentless) commit.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn commit_submitted(&self, dir: &Path) -> VcsResult<()> {
        let repo = Repository::open(dir)?;

        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let sig = Signature::now(&self.user, &self.email)?;
        let commit_id = repo.commit(Some("HEAD"), &sig, &sig, COMMIT_MESSAGE, &tree, &[])?;

        let commit_obj = repo.find_object(commit_id, None)?;
        repo.tag(SUBMITTED_TAG, &commit_obj, &sig, SUBMITTED_TAG, false)?;

        tracing::debug!(commit = %commit_id, "tagged accepted snapshot");
        Ok(())
    }
}
