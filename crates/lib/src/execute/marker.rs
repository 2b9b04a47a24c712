//! Completion markers for node prefixes.
//!
//! A prefix is complete only if it carries a marker whose input fingerprint
//! matches the step about to run and whose output hash still matches the
//! tree on disk. Anything else is a partial or stale prefix.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::NODE_COMPLETE_MARKER;
use crate::util::hash::{ContentHash, DirHashError, ObjectHash, hash_directory};

const MARKER_VERSION: u32 = 1;

/// Entries skipped when hashing a prefix.
pub const PREFIX_HASH_EXCLUSIONS: &[&str] = &[NODE_COMPLETE_MARKER];

#[derive(Debug, Error)]
pub enum MarkerError {
  #[error(transparent)]
  Hash(#[from] DirHashError),

  #[error("failed to serialize marker: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("failed to write marker {path}: {source}")]
  Write {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMarker {
  pub version: u32,
  pub status: String,
  pub input_hash: ObjectHash,
  pub output_hash: ContentHash,
}

/// Hash the prefix and write its marker.
pub fn write_marker(prefix: &Path, input_hash: &ObjectHash) -> Result<NodeMarker, MarkerError> {
  let output_hash = hash_directory(prefix, PREFIX_HASH_EXCLUSIONS)?;
  let marker = NodeMarker {
    version: MARKER_VERSION,
    status: "complete".to_string(),
    input_hash: input_hash.clone(),
    output_hash,
  };

  let path = prefix.join(NODE_COMPLETE_MARKER);
  let content = serde_json::to_string(&marker)?;
  std::fs::write(&path, content).map_err(|source| MarkerError::Write {
    path: path.display().to_string(),
    source,
  })?;

  Ok(marker)
}

/// Read a prefix's marker. Missing or unparsable markers read as `None`.
pub fn read_marker(prefix: &Path) -> Option<NodeMarker> {
  let path = prefix.join(NODE_COMPLETE_MARKER);
  let content = std::fs::read_to_string(&path).ok()?;
  match serde_json::from_str(&content) {
    Ok(marker) => Some(marker),
    Err(e) => {
      debug!(path = ?path, error = %e, "invalid marker");
      None
    }
  }
}

/// Whether the prefix can be reused for a step with `input_hash`.
pub fn is_reusable(prefix: &Path, input_hash: &ObjectHash) -> bool {
  reusable_marker(prefix, input_hash).is_some()
}

/// The prefix's marker, if the prefix can be reused for a step with
/// `input_hash`.
pub fn reusable_marker(prefix: &Path, input_hash: &ObjectHash) -> Option<NodeMarker> {
  let marker = read_marker(prefix)?;

  if marker.version != MARKER_VERSION || &marker.input_hash != input_hash {
    debug!(path = ?prefix, "marker fingerprint differs");
    return None;
  }

  match hash_directory(prefix, PREFIX_HASH_EXCLUSIONS) {
    Ok(actual) if actual == marker.output_hash => Some(marker),
    Ok(actual) => {
      debug!(
        path = ?prefix,
        expected = %marker.output_hash,
        actual = %actual,
        "prefix contents changed since marker was written"
      );
      None
    }
    Err(e) => {
      debug!(path = ?prefix, error = %e, "failed to hash prefix");
      None
    }
  }
}
