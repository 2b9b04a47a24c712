//! Multi-target orchestration.
//!
//! Each selected target goes through resolve -> execute -> verify -> hand-off
//! on its own; targets run in parallel up to `targets_parallel` and share
//! one job semaphore. A failure in one target never affects another.

mod handoff;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::execute::{BuildResult, BuildStepError, CancelToken, ExecuteConfig, TargetLayout, execute_graph};
use crate::graph::{BuildGraph, GraphError};
use crate::node::NodeCatalog;
use crate::target::TargetVariant;
use crate::verify::{CapabilityError, CapabilityRequirement, VerificationReport, verify_capabilities};

pub use handoff::{ArtifactHandoff, ArtifactSink, HandoffError, HandoffManifestSink, NodeRoots};

/// A target-scoped failure. Never downgraded, never retried.
#[derive(Debug, Error)]
pub enum TargetError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  BuildStep(#[from] BuildStepError),

  #[error(transparent)]
  Capability(#[from] CapabilityError),

  #[error("target {target}: artifact hand-off failed: {source}")]
  Handoff {
    target: String,
    #[source]
    source: HandoffError,
  },

  #[error("target {target}: cancelled")]
  Cancelled { target: String },

  #[error("target {target}: build task aborted: {message}")]
  Aborted { target: String, message: String },
}

impl TargetError {
  /// The failing node, when the failure belongs to one.
  pub fn node(&self) -> Option<&str> {
    match self {
      TargetError::BuildStep(e) => Some(e.node()),
      TargetError::Capability(CapabilityError::NoRecord { node, .. }) => Some(node),
      _ => None,
    }
  }

  /// The failing capability, for verification failures.
  pub fn capability(&self) -> Option<&str> {
    match self {
      TargetError::Capability(CapabilityError::MissingRequired { capability, .. }) => Some(capability),
      _ => None,
    }
  }

  /// Captured procedure output, for build step failures.
  pub fn output(&self) -> Option<&str> {
    match self {
      TargetError::BuildStep(e) => e.output(),
      _ => None,
    }
  }
}

fn serialize_error<S: Serializer>(error: &Option<TargetError>, serializer: S) -> Result<S::Ok, S::Error> {
  match error {
    Some(e) => serializer.serialize_some(&e.to_string()),
    None => serializer.serialize_none(),
  }
}

/// Outcome of one target.
#[derive(Debug, Serialize)]
pub struct TargetReport {
  pub target: String,
  /// Results of every node that finished, in build order.
  pub results: Vec<BuildResult>,
  pub skipped: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub verification: Option<VerificationReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub handoff: Option<ArtifactHandoff>,
  #[serde(serialize_with = "serialize_error")]
  pub error: Option<TargetError>,
  #[serde(skip)]
  pub duration: Duration,
}

impl TargetReport {
  fn new(target: &str) -> Self {
    Self {
      target: target.to_string(),
      results: Vec::new(),
      skipped: Vec::new(),
      verification: None,
      handoff: None,
      error: None,
      duration: Duration::ZERO,
    }
  }

  fn failed(mut self, error: TargetError, started: Instant) -> Self {
    self.error = Some(error);
    self.duration = started.elapsed();
    self
  }

  pub fn is_success(&self) -> bool {
    self.error.is_none()
  }
}

/// Outcome of a whole run, targets in declaration order.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
  pub targets: Vec<TargetReport>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.targets.iter().all(TargetReport::is_success)
  }

  pub fn failed(&self) -> impl Iterator<Item = &TargetReport> {
    self.targets.iter().filter(|t| !t.is_success())
  }

  pub fn get(&self, target: &str) -> Option<&TargetReport> {
    self.targets.iter().find(|t| t.target == target)
  }
}

/// Runs targets end to end.
#[derive(Clone)]
pub struct Orchestrator {
  catalog: Arc<NodeCatalog>,
  capabilities: Arc<Vec<CapabilityRequirement>>,
  execute: Arc<ExecuteConfig>,
  jobs: Arc<Semaphore>,
  targets_parallel: usize,
  sink: Arc<dyn ArtifactSink>,
}

impl Orchestrator {
  pub fn new(
    catalog: Arc<NodeCatalog>,
    capabilities: Arc<Vec<CapabilityRequirement>>,
    execute: ExecuteConfig,
    jobs: usize,
    targets_parallel: usize,
  ) -> Self {
    Self {
      catalog,
      capabilities,
      execute: Arc::new(execute),
      jobs: Arc::new(Semaphore::new(jobs.max(1))),
      targets_parallel: targets_parallel.max(1),
      sink: Arc::new(HandoffManifestSink),
    }
  }

  pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
    self.sink = sink;
    self
  }

  pub fn execute_config(&self) -> &ExecuteConfig {
    &self.execute
  }

  /// Build every target. Reports come back in the order given.
  pub async fn run(&self, targets: Vec<Arc<TargetVariant>>, cancel: CancelToken) -> RunReport {
    info!(targets = targets.len(), parallel = self.targets_parallel, "starting run");

    let slots = Arc::new(Semaphore::new(self.targets_parallel));
    let mut join_set = JoinSet::new();
    let mut task_targets = std::collections::HashMap::new();

    for (position, target) in targets.into_iter().enumerate() {
      let this = self.clone();
      let slots = slots.clone();
      let cancel = cancel.clone();
      let name = target.name.clone();

      let handle = join_set.spawn(async move {
        let report = match slots.acquire_owned().await {
          Ok(_slot) => this.build_target(target, cancel).await,
          Err(_) => TargetReport::new(&target.name).failed(
            TargetError::Cancelled {
              target: target.name.clone(),
            },
            Instant::now(),
          ),
        };
        (position, report)
      });
      task_targets.insert(handle.id(), (position, name));
    }

    let mut reports = Vec::new();
    while let Some(joined) = join_set.join_next_with_id().await {
      match joined {
        Ok((_, report)) => reports.push(report),
        Err(e) => {
          let (position, name) = task_targets.get(&e.id()).cloned().unwrap_or((usize::MAX, String::new()));
          error!(target = %name, error = %e, "target task aborted");
          let report = TargetReport::new(&name).failed(
            TargetError::Aborted {
              target: name.clone(),
              message: e.to_string(),
            },
            Instant::now(),
          );
          reports.push((position, report));
        }
      }
    }

    reports.sort_by_key(|(position, _)| *position);
    let report = RunReport {
      targets: reports.into_iter().map(|(_, report)| report).collect(),
    };

    info!(
      succeeded = report.targets.iter().filter(|t| t.is_success()).count(),
      failed = report.failed().count(),
      "run complete"
    );

    report
  }

  /// Resolve, build, verify and hand off a single target.
  pub async fn build_target(&self, target: Arc<TargetVariant>, cancel: CancelToken) -> TargetReport {
    let started = Instant::now();
    let mut report = TargetReport::new(&target.name);

    info!(target = %target.identity(), "building target");

    let tree = TargetLayout::new(&self.execute.work_dir, &target.name);
    if let Err(source) = self.sink.withdraw(&target.name, tree.root()) {
      error!(target = %target.name, error = %source, "failed to withdraw previous hand-off");
      return report.failed(
        TargetError::Handoff {
          target: target.name.clone(),
          source,
        },
        started,
      );
    }

    let graph = match BuildGraph::resolve(&target, &self.catalog) {
      Ok(graph) => graph,
      Err(e) => {
        error!(target = %target.name, error = %e, "failed to resolve build graph");
        return report.failed(e.into(), started);
      }
    };

    let execution = execute_graph(
      target.clone(),
      &graph,
      self.execute.clone(),
      self.jobs.clone(),
      cancel.clone(),
    )
    .await;

    report.results = execution.results_in_order(&graph).cloned().collect();
    report.skipped = execution.skipped.clone();

    if let Some(e) = execution.failed {
      return report.failed(e.into(), started);
    }
    if execution.cancelled || cancel.is_cancelled() {
      warn!(target = %target.name, "target cancelled");
      return report.failed(
        TargetError::Cancelled {
          target: target.name.clone(),
        },
        started,
      );
    }

    match self.verify(&target, &graph, &report.results) {
      Ok(verification) => report.verification = verification,
      Err(e) => return report.failed(e.into(), started),
    }

    let handoff = self.handoff(&target, &graph, &report.results);
    if let Err(source) = self.sink.deliver(&handoff) {
      return report.failed(
        TargetError::Handoff {
          target: target.name.clone(),
          source,
        },
        started,
      );
    }
    report.handoff = Some(handoff);
    report.duration = started.elapsed();

    info!(target = %target.name, duration_ms = report.duration.as_millis() as u64, "target complete");
    report
  }

  /// Check the interpreter's configuration record. Targets with no declared
  /// capabilities are not verified.
  fn verify(
    &self,
    target: &TargetVariant,
    graph: &BuildGraph,
    results: &[BuildResult],
  ) -> Result<Option<VerificationReport>, CapabilityError> {
    if self.capabilities.is_empty() {
      return Ok(None);
    }

    let interpreter = graph.interpreter();
    let record = graph.node(interpreter).and_then(|node| node.record.as_ref());
    let prefix = results.iter().find(|r| r.node == interpreter).map(|r| r.prefix.clone());

    let (Some(record), Some(prefix)) = (record, prefix) else {
      return Err(CapabilityError::NoRecord {
        target: target.name.clone(),
        node: interpreter.to_string(),
      });
    };

    let record_path: PathBuf = prefix.join(&record.path);
    verify_capabilities(target, &self.capabilities, &record_path, record.format).map(Some)
  }

  fn handoff(&self, target: &TargetVariant, graph: &BuildGraph, results: &[BuildResult]) -> ArtifactHandoff {
    let layout = TargetLayout::new(&self.execute.work_dir, &target.name);
    let interpreter = graph.interpreter().to_string();

    ArtifactHandoff {
      target: target.name.clone(),
      triple: target.triple.clone(),
      libc: target.libc,
      tree: layout.root().to_path_buf(),
      interpreter_prefix: layout.prefix(&interpreter),
      interpreter,
      output_roots: results
        .iter()
        .map(|r| NodeRoots {
          node: r.node.clone(),
          prefix: r.prefix.clone(),
          roots: r.output_roots.clone(),
        })
        .collect(),
    }
  }
}
