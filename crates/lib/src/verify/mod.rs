//! Capability Verifier.
//!
//! Runs once per target after the whole graph has built. Capability presence
//! depends on the composed environment of every earlier step, so it is
//! checked against the interpreter's configuration record rather than per
//! dependency.

mod record;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::target::TargetVariant;

pub use record::{ConfigRecord, RecordError, RecordFormat};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  #[default]
  Required,
  Advisory,
}

/// A capability the produced interpreter must (or should) have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityRequirement {
  /// Human-readable name, e.g. `AF_NETLINK socket support`.
  pub name: String,
  /// Marker expected in the configuration record, e.g. `HAVE_LINUX_NETLINK_H`.
  pub marker: String,
  /// Default severity; targets may override it per capability.
  #[serde(default)]
  pub severity: Severity,
}

impl CapabilityRequirement {
  pub fn new(name: &str, marker: &str, severity: Severity) -> Self {
    Self {
      name: name.to_string(),
      marker: marker.to_string(),
      severity,
    }
  }

  /// Severity of this capability for one target variant.
  pub fn severity_for(&self, target: &TargetVariant) -> Severity {
    target
      .capability_severity
      .get(&self.name)
      .copied()
      .unwrap_or(self.severity)
  }
}

#[derive(Debug, Error)]
pub enum CapabilityError {
  #[error(
    "target {target}: required capability '{capability}' is missing (marker {marker} not enabled in {})",
    .record.display()
  )]
  MissingRequired {
    target: String,
    capability: String,
    marker: String,
    record: PathBuf,
  },

  #[error("target {target}: node {node} declares no configuration record, cannot verify capabilities")]
  NoRecord { target: String, node: String },

  #[error("target {target}: {source}")]
  Record {
    target: String,
    #[source]
    source: RecordError,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCapability {
  pub name: String,
  pub marker: String,
  pub severity: Severity,
}

/// Outcome of checking one target's record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
  pub target: String,
  pub record: PathBuf,
  pub satisfied: Vec<String>,
  pub missing: Vec<MissingCapability>,
}

impl VerificationReport {
  pub fn missing_required(&self) -> impl Iterator<Item = &MissingCapability> {
    self.missing.iter().filter(|m| m.severity == Severity::Required)
  }

  pub fn missing_advisory(&self) -> impl Iterator<Item = &MissingCapability> {
    self.missing.iter().filter(|m| m.severity == Severity::Advisory)
  }

  pub fn is_satisfied(&self) -> bool {
    self.missing_required().next().is_none()
  }
}

/// Check every requirement against a parsed record.
///
/// Missing advisory capabilities are logged as warnings. The first missing
/// required capability (in declaration order) becomes the error; all of them
/// are logged first.
pub fn verify_record(
  target: &TargetVariant,
  requirements: &[CapabilityRequirement],
  record: &ConfigRecord,
  record_path: &Path,
) -> Result<VerificationReport, CapabilityError> {
  let mut report = VerificationReport {
    target: target.name.clone(),
    record: record_path.to_path_buf(),
    ..Default::default()
  };

  for requirement in requirements {
    let severity = requirement.severity_for(target);

    if record.has(&requirement.marker) {
      debug!(target = %target.name, capability = %requirement.name, "capability present");
      report.satisfied.push(requirement.name.clone());
      continue;
    }

    match severity {
      Severity::Advisory => warn!(
        target = %target.name,
        capability = %requirement.name,
        marker = %requirement.marker,
        "advisory capability missing"
      ),
      Severity::Required => error!(
        target = %target.name,
        capability = %requirement.name,
        marker = %requirement.marker,
        "required capability missing"
      ),
    }

    report.missing.push(MissingCapability {
      name: requirement.name.clone(),
      marker: requirement.marker.clone(),
      severity,
    });
  }

  if let Some(missing) = report.missing_required().next() {
    return Err(CapabilityError::MissingRequired {
      target: target.name.clone(),
      capability: missing.name.clone(),
      marker: missing.marker.clone(),
      record: record_path.to_path_buf(),
    });
  }

  info!(
    target = %target.name,
    satisfied = report.satisfied.len(),
    advisory_missing = report.missing.len(),
    "capabilities verified"
  );

  Ok(report)
}

/// Load the record from disk and verify it.
pub fn verify_capabilities(
  target: &TargetVariant,
  requirements: &[CapabilityRequirement],
  record_path: &Path,
  format: RecordFormat,
) -> Result<VerificationReport, CapabilityError> {
  let record = ConfigRecord::load(record_path, format).map_err(|source| CapabilityError::Record {
    target: target.name.clone(),
    source,
  })?;
  verify_record(target, requirements, &record, record_path)
}
