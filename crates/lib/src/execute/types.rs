//! Types for build step execution.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::execute::marker::MarkerError;
use crate::types::SearchRoots;
use crate::util::hash::{ContentHash, ObjectHash};

/// Number of trailing output lines carried in a failure diagnostic.
pub const OUTPUT_TAIL_LINES: usize = 20;

/// Outcome of one build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum StepStatus {
  Running,
  Built,
  Cached,
  Failed { code: Option<i32> },
}

impl StepStatus {
  pub fn is_success(self) -> bool {
    matches!(self, StepStatus::Built | StepStatus::Cached)
  }
}

impl std::fmt::Display for StepStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StepStatus::Running => f.write_str("running"),
      StepStatus::Built => f.write_str("built"),
      StepStatus::Cached => f.write_str("cached"),
      StepStatus::Failed { code: Some(code) } => write!(f, "failed (exit code {})", code),
      StepStatus::Failed { code: None } => f.write_str("failed (terminated by signal)"),
    }
  }
}

/// Per-node record of a build step.
///
/// Created when the step starts and finalized when the process exits. The
/// output roots are what later steps see through the environment composer.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
  pub node: String,
  #[serde(flatten)]
  pub status: StepStatus,
  pub prefix: PathBuf,
  pub output_roots: SearchRoots,
  pub fingerprint: ObjectHash,
  /// Hash of the finished prefix; dependents fold it into their fingerprint.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_hash: Option<ContentHash>,
  pub log_path: PathBuf,
  /// Captured stdout and stderr, interleaved as written.
  #[serde(skip)]
  pub output: String,
  #[serde(skip)]
  pub duration: Duration,
  #[serde(skip)]
  started: Option<Instant>,
}

impl BuildResult {
  pub fn start(node: &str, prefix: PathBuf, output_roots: SearchRoots, fingerprint: ObjectHash, log_path: PathBuf) -> Self {
    Self {
      node: node.to_string(),
      status: StepStatus::Running,
      prefix,
      output_roots,
      fingerprint,
      output_hash: None,
      log_path,
      output: String::new(),
      duration: Duration::ZERO,
      started: Some(Instant::now()),
    }
  }

  pub fn finish(mut self, status: StepStatus, output: String) -> Self {
    self.status = status;
    self.output = output;
    if let Some(started) = self.started.take() {
      self.duration = started.elapsed();
    }
    self
  }

  pub fn with_output_hash(mut self, output_hash: ContentHash) -> Self {
    self.output_hash = Some(output_hash);
    self
  }

  /// The last `lines` lines of captured output.
  pub fn output_tail(&self, lines: usize) -> String {
    output_tail(&self.output, lines)
  }
}

pub fn output_tail(output: &str, lines: usize) -> String {
  let all: Vec<&str> = output.lines().collect();
  let start = all.len().saturating_sub(lines);
  all[start..].join("\n")
}

/// Errors from running one build step. All are fatal for the target.
#[derive(Debug, Error)]
pub enum BuildStepError {
  #[error(
    "target {target}: node {} {} (log: {})",
    .result.node,
    .result.status,
    .result.log_path.display()
  )]
  ProcedureFailed {
    target: String,
    result: Box<BuildResult>,
    /// Scratch tree kept for inspection, if preservation is enabled.
    preserved: Option<PathBuf>,
  },

  #[error("target {target}: failed to start build procedure for node {node}: {source}")]
  Spawn {
    target: String,
    node: String,
    #[source]
    source: std::io::Error,
  },

  #[error("target {target}: node {node}: {source}")]
  Io {
    target: String,
    node: String,
    #[source]
    source: std::io::Error,
  },

  #[error("target {target}: node {node}: failed to fingerprint inputs: {source}")]
  Fingerprint {
    target: String,
    node: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("target {target}: node {node}: failed to record completion: {source}")]
  Marker {
    target: String,
    node: String,
    #[source]
    source: MarkerError,
  },

  #[error("target {target}: node {node}: build task aborted: {message}")]
  Aborted {
    target: String,
    node: String,
    message: String,
  },

  #[error("target {target}: node {node} cancelled")]
  Cancelled { target: String, node: String },
}

impl BuildStepError {
  pub fn node(&self) -> &str {
    match self {
      BuildStepError::ProcedureFailed { result, .. } => &result.node,
      BuildStepError::Spawn { node, .. }
      | BuildStepError::Io { node, .. }
      | BuildStepError::Fingerprint { node, .. }
      | BuildStepError::Marker { node, .. }
      | BuildStepError::Aborted { node, .. }
      | BuildStepError::Cancelled { node, .. } => node,
    }
  }

  /// Captured output for diagnostics, when the procedure ran at all.
  pub fn output(&self) -> Option<&str> {
    match self {
      BuildStepError::ProcedureFailed { result, .. } => Some(&result.output),
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, BuildStepError::Cancelled { .. })
  }
}

/// Configuration for build step execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Root under which every target gets its own tree.
  pub work_dir: PathBuf,
  /// Explicit tool search path handed to every step as `PATH`.
  pub tool_path: Vec<PathBuf>,
  /// Reuse prefixes whose completion marker matches the step's fingerprint.
  pub reuse: bool,
  /// Keep the scratch tree of a failed step.
  pub keep_failed: bool,
  /// Shell for `script` procedures. Defaults to `/bin/sh`.
  pub shell: Option<String>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      work_dir: PathBuf::from("build"),
      tool_path: vec![PathBuf::from("/usr/bin"), PathBuf::from("/bin")],
      reuse: true,
      keep_failed: true,
      shell: None,
    }
  }
}

/// Directory layout of one target's tree under the work dir.
///
/// ```text
/// <work_dir>/<target>/
///   out/<node>/        node prefixes
///   logs/<node>.log    captured output
///   work/              scratch trees
///   handoff.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
  root: PathBuf,
}

impl TargetLayout {
  pub fn new(work_dir: &Path, target: &str) -> Self {
    Self {
      root: work_dir.join(target),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn prefix(&self, node: &str) -> PathBuf {
    self.root.join("out").join(node)
  }

  pub fn log_path(&self, node: &str) -> PathBuf {
    self.root.join("logs").join(format!("{}.log", node))
  }

  pub fn scratch_root(&self) -> PathBuf {
    self.root.join("work")
  }
}
