//! Working-tree cleanliness check, gating the legacy migration.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeState {
  Clean,
  /// Holds the tool's own description of what is dirty.
  Dirty(String),
}

#[derive(Debug, Error)]
pub enum VcsError {
  #[error("failed to run git in {dir}: {source}")]
  Spawn {
    dir: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

pub trait VcsStatus {
  fn tree_state(&self, dir: &Path) -> impl Future<Output = Result<TreeState, VcsError>>;
}

/// `git diff --exit-code` based check. Untracked files are deliberately not
/// considered dirty; only modifications to tracked files block a migration.
#[derive(Debug, Clone, Default)]
pub struct GitStatus;

impl VcsStatus for GitStatus {
  async fn tree_state(&self, dir: &Path) -> Result<TreeState, VcsError> {
    let output = Command::new("git")
      .args(["diff", "--exit-code"])
      .current_dir(dir)
      .output()
      .await
      .map_err(|source| VcsError::Spawn { dir: dir.to_path_buf(), source })?;

    if output.status.success() {
      Ok(TreeState::Clean)
    } else {
      Ok(TreeState::Dirty(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
  }
}
