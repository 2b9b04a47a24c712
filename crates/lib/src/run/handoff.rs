//! Hand-off of verified build trees to the artifact assembler.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::target::Libc;
use crate::types::SearchRoots;

/// Everything the assembler needs to package one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHandoff {
  pub target: String,
  pub triple: String,
  pub libc: Libc,
  /// The target's whole tree (`<work_dir>/<target>`).
  pub tree: PathBuf,
  pub interpreter: String,
  pub interpreter_prefix: PathBuf,
  /// Every node's output roots, in build order.
  pub output_roots: Vec<NodeRoots>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRoots {
  pub node: String,
  pub prefix: PathBuf,
  #[serde(flatten)]
  pub roots: SearchRoots,
}

#[derive(Debug, Error)]
pub enum HandoffError {
  #[error("failed to serialize hand-off: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to remove stale hand-off {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Receives verified build trees. Only targets that built and verified
/// successfully are delivered; cancelled or failed targets never are.
pub trait ArtifactSink: Send + Sync {
  fn deliver(&self, handoff: &ArtifactHandoff) -> Result<(), HandoffError>;

  /// Revoke any earlier delivery for `target` before its tree is rebuilt.
  fn withdraw(&self, _target: &str, _tree: &Path) -> Result<(), HandoffError> {
    Ok(())
  }
}

/// Writes `handoff.json` into the target's tree for an external assembler to
/// pick up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandoffManifestSink;

impl HandoffManifestSink {
  pub const FILE_NAME: &'static str = "handoff.json";

  pub fn manifest_path(tree: &Path) -> PathBuf {
    tree.join(Self::FILE_NAME)
  }
}

impl ArtifactSink for HandoffManifestSink {
  fn deliver(&self, handoff: &ArtifactHandoff) -> Result<(), HandoffError> {
    let path = Self::manifest_path(&handoff.tree);
    let content = serde_json::to_string_pretty(handoff)?;
    std::fs::write(&path, content).map_err(|source| HandoffError::Write {
      path: path.clone(),
      source,
    })?;
    info!(target = %handoff.target, path = ?path, "wrote artifact hand-off");
    Ok(())
  }

  fn withdraw(&self, target: &str, tree: &Path) -> Result<(), HandoffError> {
    let path = Self::manifest_path(tree);
    match std::fs::remove_file(&path) {
      Ok(()) => {
        debug!(target = %target, path = ?path, "withdrew previous hand-off");
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(HandoffError::Remove { path, source }),
    }
  }
}
