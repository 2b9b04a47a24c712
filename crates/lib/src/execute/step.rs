//! Running one node's build procedure.
//!
//! Each step runs in an isolated environment:
//! - the process environment is cleared
//! - only the composed environment plus a fixed set of isolation variables
//!   (`PREFIX`, `RTFORGE_NODE`, `TMPDIR`, `HOME`, `LANG`, `LC_ALL`,
//!   `SOURCE_DATE_EPOCH`) is passed
//! - the working directory is a fresh scratch tree under the target's
//!   `work/` directory, removed on success and kept on failure if configured
//! - stdout and stderr go to `<target>/logs/<node>.log`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::compose::BuildEnvironment;
use crate::consts::{HOMELESS_HOME, SOURCE_DATE_EPOCH};
use crate::execute::cancel::CancelToken;
use crate::execute::marker;
use crate::execute::types::{BuildResult, BuildStepError, ExecuteConfig, StepStatus, TargetLayout};
use crate::node::{BuildProcedure, DependencyNode};
use crate::target::{Libc, TargetVariant};
use crate::util::hash::{ContentHash, HashError, Hashable, ObjectHash};

/// Everything needed to run one node for one target.
#[derive(Debug, Clone)]
pub struct StepRequest {
  pub target: Arc<TargetVariant>,
  pub node: Arc<DependencyNode>,
  pub env: BuildEnvironment,
  pub layout: TargetLayout,
  /// Output hashes of every transitive dependency, by node name.
  pub dependencies: BTreeMap<String, ContentHash>,
}

#[derive(Serialize)]
struct StepInputs<'a> {
  target: &'a str,
  triple: &'a str,
  libc: Libc,
  node: &'a DependencyNode,
  env: &'a BuildEnvironment,
  dependencies: &'a BTreeMap<String, ContentHash>,
  shell: Option<&'a str>,
}

impl Hashable for StepInputs<'_> {}

impl StepRequest {
  /// Fingerprint of the step's inputs: the node definition, the composed
  /// environment, the target identity and the contents of every dependency
  /// prefix. A rebuilt dependency invalidates all of its dependents.
  pub fn fingerprint(&self, shell: Option<&str>) -> Result<ObjectHash, HashError> {
    StepInputs {
      target: &self.target.name,
      triple: &self.target.triple,
      libc: self.target.libc,
      node: &self.node,
      env: &self.env,
      dependencies: &self.dependencies,
      shell,
    }
    .compute_hash()
  }
}

/// The fixed variables every build procedure receives on top of the composed
/// environment. These win over composed variables of the same name.
pub fn isolation_vars(prefix: &Path, node: &str, tmp_dir: &Path) -> Vec<(&'static str, String)> {
  vec![
    ("PREFIX", prefix.to_string_lossy().to_string()),
    ("RTFORGE_NODE", node.to_string()),
    ("TMPDIR", tmp_dir.to_string_lossy().to_string()),
    ("HOME", HOMELESS_HOME.to_string()),
    ("LANG", "C".to_string()),
    ("LC_ALL", "C".to_string()),
    ("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH.to_string()),
  ]
}

/// Get the shell command and argument for script procedures.
///
/// Defaults to `/bin/sh` rather than `$SHELL`: interactive shells may source
/// profile files that modify the environment.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  match override_shell {
    Some(shell) => (shell.to_string(), vec!["-c".to_string()]),
    None => ("/bin/sh".to_string(), vec!["-c".to_string()]),
  }
}

fn procedure_command(procedure: &BuildProcedure, shell: Option<&str>) -> Command {
  match procedure {
    BuildProcedure::Exec { program, args } => {
      let mut command = Command::new(program);
      command.args(args);
      command
    }
    BuildProcedure::Script(script) => {
      let (shell_cmd, shell_args) = get_shell(shell);
      let mut command = Command::new(shell_cmd);
      command.args(shell_args).arg(script);
      command
    }
  }
}

/// Run one build step.
///
/// Reuses the prefix when its marker matches the step fingerprint, otherwise
/// clears any partial prefix and runs the procedure. Cancellation kills the
/// process and waits for it before the scratch tree is released.
pub async fn execute_step(
  request: &StepRequest,
  config: &ExecuteConfig,
  cancel: &CancelToken,
) -> Result<BuildResult, BuildStepError> {
  let target = &request.target.name;
  let node = &request.node.name;
  let io_err = |source: std::io::Error| BuildStepError::Io {
    target: target.clone(),
    node: node.clone(),
    source,
  };

  let fingerprint = request
    .fingerprint(config.shell.as_deref())
    .map_err(|source| BuildStepError::Fingerprint {
      target: target.clone(),
      node: node.clone(),
      source,
    })?;

  let prefix = request.layout.prefix(node);
  let log_path = request.layout.log_path(node);
  let output_roots = request.node.outputs.resolve(&prefix);
  let result = BuildResult::start(node, prefix.clone(), output_roots, fingerprint.clone(), log_path.clone());

  if config.reuse
    && let Some(existing) = marker::reusable_marker(&prefix, &fingerprint)
  {
    info!(target = %target, node = %node, "reusing completed prefix");
    return Ok(
      result
        .with_output_hash(existing.output_hash)
        .finish(StepStatus::Cached, String::new()),
    );
  }

  if prefix.exists() {
    debug!(target = %target, node = %node, path = ?prefix, "removing stale prefix");
    tokio::fs::remove_dir_all(&prefix).await.map_err(io_err)?;
  }
  tokio::fs::create_dir_all(&prefix).await.map_err(io_err)?;
  if let Some(logs) = log_path.parent() {
    tokio::fs::create_dir_all(logs).await.map_err(io_err)?;
  }

  let scratch_root = request.layout.scratch_root();
  tokio::fs::create_dir_all(&scratch_root).await.map_err(io_err)?;
  let scratch = tempfile::Builder::new()
    .prefix(&format!("{}-", node))
    .tempdir_in(&scratch_root)
    .map_err(io_err)?;
  let tmp_dir = scratch.path().join("tmp");
  tokio::fs::create_dir_all(&tmp_dir).await.map_err(io_err)?;

  let stdout_log = std::fs::File::create(&log_path).map_err(io_err)?;
  let stderr_log = stdout_log.try_clone().map_err(io_err)?;

  let mut command = procedure_command(&request.node.procedure, config.shell.as_deref());
  command
    .current_dir(scratch.path())
    .env_clear()
    .envs(request.env.vars())
    .envs(isolation_vars(&prefix, node, &tmp_dir))
    .stdin(Stdio::null())
    .stdout(stdout_log)
    .stderr(stderr_log)
    .kill_on_drop(true);

  info!(target = %target, node = %node, "running build procedure");

  let mut child = command.spawn().map_err(|source| BuildStepError::Spawn {
    target: target.clone(),
    node: node.clone(),
    source,
  })?;

  let status = tokio::select! {
    status = child.wait() => status.map_err(io_err)?,
    _ = cancel.cancelled() => {
      warn!(target = %target, node = %node, "cancelling build procedure");
      if let Err(e) = child.kill().await {
        warn!(target = %target, node = %node, error = %e, "failed to kill build procedure");
      }
      drop(scratch);
      return Err(BuildStepError::Cancelled {
        target: target.clone(),
        node: node.clone(),
      });
    }
  };

  let output = tokio::fs::read(&log_path)
    .await
    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    .unwrap_or_default();

  if !status.success() {
    let result = result.finish(StepStatus::Failed { code: status.code() }, output);
    let preserved: Option<PathBuf> = config.keep_failed.then(|| scratch.keep());

    error!(
      target = %target,
      node = %node,
      code = ?status.code(),
      log = ?log_path,
      preserved = ?preserved,
      "build procedure failed"
    );

    return Err(BuildStepError::ProcedureFailed {
      target: target.clone(),
      result: Box::new(result),
      preserved,
    });
  }

  let written = marker::write_marker(&prefix, &fingerprint).map_err(|source| BuildStepError::Marker {
    target: target.clone(),
    node: node.clone(),
    source,
  })?;

  for root in [&result.output_roots.include, &result.output_roots.lib].into_iter().flatten() {
    if !root.exists() {
      warn!(target = %target, node = %node, root = ?root, "declared output root was not created");
    }
  }

  info!(target = %target, node = %node, "build procedure succeeded");

  Ok(
    result
      .with_output_hash(written.output_hash)
      .finish(StepStatus::Built, output),
  )
}
