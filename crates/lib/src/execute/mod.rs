//! Build Step Executor.
//!
//! Runs a target's resolved graph wave by wave. Nodes within a wave have no
//! dependencies on each other and run concurrently, bounded by a semaphore
//! shared across every target of the run. A node is only scheduled once all
//! of its dependencies have a recorded successful result; the first failure
//! stops the target and every later node is recorded as skipped.

pub mod cancel;
pub mod marker;
pub mod step;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::compose::compose_environment;
use crate::graph::BuildGraph;
use crate::target::TargetVariant;

pub use cancel::CancelToken;
pub use step::{StepRequest, execute_step, isolation_vars};
pub use types::{
  BuildResult, BuildStepError, ExecuteConfig, OUTPUT_TAIL_LINES, StepStatus, TargetLayout, output_tail,
};

/// Result of executing one target's graph.
#[derive(Debug)]
pub struct TargetExecution {
  pub target: String,
  /// Successful results keyed by node name.
  pub realized: HashMap<String, BuildResult>,
  /// The first failure, by build order. Later nodes are never started.
  pub failed: Option<BuildStepError>,
  /// Nodes that were never started, in build order.
  pub skipped: Vec<String>,
  pub cancelled: bool,
}

impl TargetExecution {
  fn new(target: &str) -> Self {
    Self {
      target: target.to_string(),
      realized: HashMap::new(),
      failed: None,
      skipped: Vec::new(),
      cancelled: false,
    }
  }

  pub fn is_success(&self) -> bool {
    self.failed.is_none() && !self.cancelled
  }

  /// Realized results in build order.
  pub fn results_in_order<'a>(&'a self, graph: &'a BuildGraph) -> impl Iterator<Item = &'a BuildResult> {
    graph.order().iter().filter_map(|name| self.realized.get(name))
  }
}

/// Execute every node of `graph` for `target`.
///
/// `jobs` bounds concurrently running procedures. On cancellation no new
/// nodes are issued and in-flight procedures are killed and awaited.
pub async fn execute_graph(
  target: Arc<TargetVariant>,
  graph: &BuildGraph,
  config: Arc<ExecuteConfig>,
  jobs: Arc<Semaphore>,
  cancel: CancelToken,
) -> TargetExecution {
  let layout = TargetLayout::new(&config.work_dir, &target.name);
  let waves = graph.waves();
  let mut execution = TargetExecution::new(&target.name);

  info!(target = %target.name, nodes = graph.len(), waves = waves.len(), "executing build graph");

  for (wave_idx, wave) in waves.iter().enumerate() {
    if execution.failed.is_some() || execution.cancelled {
      execution.skipped.extend(wave.iter().cloned());
      continue;
    }

    if cancel.is_cancelled() {
      warn!(target = %target.name, wave = wave_idx, "cancelled before wave started");
      execution.cancelled = true;
      execution.skipped.extend(wave.iter().cloned());
      continue;
    }

    debug!(target = %target.name, wave = wave_idx, nodes = ?wave, "executing wave");

    let mut join_set = JoinSet::new();
    let mut task_nodes = HashMap::new();

    for (position, name) in wave.iter().enumerate() {
      let Some(node) = graph.node(name) else {
        continue;
      };

      let env = compose_environment(&target, graph, name, &execution.realized, &config.tool_path);
      let dependencies: BTreeMap<_, _> = graph
        .closure(name)
        .into_iter()
        .filter_map(|dep| {
          let hash = execution.realized.get(&dep)?.output_hash.clone()?;
          Some((dep, hash))
        })
        .collect();
      let request = StepRequest {
        target: target.clone(),
        node: node.clone(),
        env,
        layout: layout.clone(),
        dependencies,
      };

      let config = config.clone();
      let jobs = jobs.clone();
      let cancel = cancel.clone();

      let handle = join_set.spawn(async move {
        let outcome = match jobs.acquire_owned().await {
          Ok(_permit) => execute_step(&request, &config, &cancel).await,
          Err(_) => Err(BuildStepError::Cancelled {
            target: request.target.name.clone(),
            node: request.node.name.clone(),
          }),
        };
        (position, outcome)
      });
      task_nodes.insert(handle.id(), (position, name.clone()));
    }

    let mut outcomes = Vec::with_capacity(wave.len());
    while let Some(joined) = join_set.join_next_with_id().await {
      match joined {
        Ok((_, outcome)) => outcomes.push(outcome),
        Err(e) => {
          let (position, node) = task_nodes.get(&e.id()).cloned().unwrap_or((usize::MAX, String::new()));
          outcomes.push((
            position,
            Err(BuildStepError::Aborted {
              target: target.name.clone(),
              node,
              message: e.to_string(),
            }),
          ));
        }
      }
    }

    // first failure is chosen by build order, not by completion time
    outcomes.sort_by_key(|(position, _)| *position);

    for (_, outcome) in outcomes {
      match outcome {
        Ok(result) => {
          debug!(target = %target.name, node = %result.node, status = %result.status, "step finished");
          execution.realized.insert(result.node.clone(), result);
        }
        Err(e) if e.is_cancelled() => {
          execution.cancelled = true;
          execution.skipped.push(e.node().to_string());
        }
        Err(e) => {
          if execution.failed.is_none() {
            error!(target = %target.name, node = %e.node(), error = %e, "build step failed");
            execution.failed = Some(e);
          } else {
            error!(target = %target.name, node = %e.node(), error = %e, "additional build step failure");
          }
        }
      }
    }
  }

  info!(
    target = %target.name,
    realized = execution.realized.len(),
    failed = execution.failed.is_some(),
    skipped = execution.skipped.len(),
    cancelled = execution.cancelled,
    "build graph execution complete"
  );

  execution
}
