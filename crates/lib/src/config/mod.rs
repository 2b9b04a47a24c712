//! Configuration loading.
//!
//! A run is described by one file (`rtforge.toml`, or `.json`):
//!
//! ```toml
//! [settings]
//! work_dir = "build"
//! jobs = 8
//! tool_path = ["/opt/cross/bin", "/usr/bin", "/bin"]
//!
//! [[targets]]
//! name = "musl"
//! triple = "x86_64-unknown-linux-musl"
//! libc = "musl"
//! dependencies = ["linux-headers", "musl", "zlib", "cpython"]
//! extra_roots = [{ include = "sysroots/musl/include" }]
//!
//! [nodes.zlib]
//! requires = ["musl"]
//! procedure = { exec = { program = "scripts/zlib.sh" } }
//!
//! [[capabilities]]
//! name = "AF_NETLINK socket support"
//! marker = "HAVE_LINUX_NETLINK_H"
//! ```
//!
//! Relative paths are anchored at the directory holding the file. Dependency
//! names are not checked here; unknown names surface per target as graph
//! errors.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{DEFAULT_CONFIG_FILE, ENV_JOBS, ENV_WORK_DIR};
use crate::execute::ExecuteConfig;
use crate::node::{DependencyNode, NodeCatalog};
use crate::run::Orchestrator;
use crate::target::{TargetStore, TargetVariant};
use crate::verify::CapabilityRequirement;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Toml {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("duplicate target name: {0}")]
  DuplicateTarget(String),

  #[error("{kind} with an empty name")]
  EmptyName { kind: &'static str },

  #[error("target {target}: severity override for undeclared capability '{capability}'")]
  UnknownCapability { target: String, capability: String },

  #[error("duplicate capability name: {0}")]
  DuplicateCapability(String),

  #[error("settings.{field} must be at least 1")]
  ZeroValue { field: &'static str },

  #[error("invalid value for {var}: {value}")]
  InvalidEnv { var: &'static str, value: String },
}

/// File format, picked by extension. Anything but `.json` is TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
  Toml,
  Json,
}

impl ConfigFormat {
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => ConfigFormat::Json,
      _ => ConfigFormat::Toml,
    }
  }
}

fn default_work_dir() -> PathBuf {
  PathBuf::from("build")
}

fn default_jobs() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn default_targets_parallel() -> usize {
  1
}

fn default_tool_path() -> Vec<PathBuf> {
  vec![PathBuf::from("/usr/bin"), PathBuf::from("/bin")]
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
  #[serde(default = "default_work_dir")]
  pub work_dir: PathBuf,
  /// Concurrent build procedures across all targets.
  #[serde(default = "default_jobs")]
  pub jobs: usize,
  /// Targets built at the same time.
  #[serde(default = "default_targets_parallel")]
  pub targets_parallel: usize,
  /// The only `PATH` build procedures see.
  #[serde(default = "default_tool_path")]
  pub tool_path: Vec<PathBuf>,
  #[serde(default = "default_true")]
  pub reuse: bool,
  #[serde(default = "default_true")]
  pub keep_failed: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      work_dir: default_work_dir(),
      jobs: default_jobs(),
      targets_parallel: default_targets_parallel(),
      tool_path: default_tool_path(),
      reuse: true,
      keep_failed: true,
      shell: None,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
  #[serde(default)]
  settings: Settings,
  #[serde(default)]
  targets: Vec<TargetVariant>,
  #[serde(default)]
  nodes: BTreeMap<String, DependencyNode>,
  #[serde(default)]
  capabilities: Vec<CapabilityRequirement>,
}

/// A loaded, validated configuration with every path made absolute.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  pub settings: Settings,
  pub targets: TargetStore,
  pub catalog: Arc<NodeCatalog>,
  pub capabilities: Arc<Vec<CapabilityRequirement>>,
  /// Directory relative paths were resolved against.
  pub base_dir: PathBuf,
}

impl BuildConfig {
  /// The config file to use: the explicit one, or `rtforge.toml` in `cwd`.
  pub fn locate(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    match explicit {
      Some(path) if path.is_absolute() => path.to_path_buf(),
      Some(path) => cwd.join(path),
      None => cwd.join(DEFAULT_CONFIG_FILE),
    }
  }

  /// Load a config file and apply `RTFORGE_WORK_DIR` / `RTFORGE_JOBS`.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let base_dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(|p| dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()))
      .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Self::parse(&content, ConfigFormat::from_path(path), path, &base_dir)?;
    config.apply_env_overrides()?;

    info!(
      path = ?path,
      targets = config.targets.len(),
      nodes = config.catalog.len(),
      capabilities = config.capabilities.len(),
      "loaded configuration"
    );

    Ok(config)
  }

  /// Parse and validate content. `origin` is only used in error messages.
  pub fn parse(content: &str, format: ConfigFormat, origin: &Path, base_dir: &Path) -> Result<Self, ConfigError> {
    let raw: RawConfig = match format {
      ConfigFormat::Toml => toml::from_str(content).map_err(|source| ConfigError::Toml {
        path: origin.to_path_buf(),
        source,
      })?,
      ConfigFormat::Json => serde_json::from_str(content).map_err(|source| ConfigError::Json {
        path: origin.to_path_buf(),
        source,
      })?,
    };

    Self::from_raw(raw, base_dir)
  }

  fn from_raw(raw: RawConfig, base_dir: &Path) -> Result<Self, ConfigError> {
    let RawConfig {
      mut settings,
      targets,
      nodes,
      capabilities,
    } = raw;

    if settings.jobs == 0 {
      return Err(ConfigError::ZeroValue { field: "jobs" });
    }
    if settings.targets_parallel == 0 {
      return Err(ConfigError::ZeroValue {
        field: "targets_parallel",
      });
    }

    let mut capability_names = HashSet::new();
    for capability in &capabilities {
      if capability.name.is_empty() || capability.marker.is_empty() {
        return Err(ConfigError::EmptyName { kind: "capability" });
      }
      if !capability_names.insert(capability.name.as_str()) {
        return Err(ConfigError::DuplicateCapability(capability.name.clone()));
      }
    }

    let mut resolved_targets = Vec::with_capacity(targets.len());
    for mut target in targets {
      if target.name.is_empty() || target.triple.is_empty() {
        return Err(ConfigError::EmptyName { kind: "target" });
      }
      if let Some(capability) = target
        .capability_severity
        .keys()
        .find(|name| !capability_names.contains(name.as_str()))
      {
        return Err(ConfigError::UnknownCapability {
          target: target.name.clone(),
          capability: capability.clone(),
        });
      }
      target.extra_roots = target.extra_roots.iter().map(|roots| roots.resolve(base_dir)).collect();
      resolved_targets.push(target);
    }
    let targets = TargetStore::new(resolved_targets).map_err(ConfigError::DuplicateTarget)?;

    let mut catalog = Vec::with_capacity(nodes.len());
    for (name, mut node) in nodes {
      if name.is_empty() {
        return Err(ConfigError::EmptyName { kind: "node" });
      }
      node.name = name;
      node.procedure = node.procedure.anchored(base_dir);
      catalog.push(node);
    }

    settings.work_dir = base_dir.join(&settings.work_dir);
    settings.tool_path = settings.tool_path.iter().map(|p| base_dir.join(p)).collect();

    debug!(base_dir = ?base_dir, work_dir = ?settings.work_dir, "resolved configuration paths");

    Ok(Self {
      settings,
      targets,
      catalog: Arc::new(NodeCatalog::new(catalog)),
      capabilities: Arc::new(capabilities),
      base_dir: base_dir.to_path_buf(),
    })
  }

  fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
    if let Ok(work_dir) = std::env::var(ENV_WORK_DIR)
      && !work_dir.is_empty()
    {
      debug!(work_dir = %work_dir, "work dir overridden from environment");
      self.settings.work_dir = self.base_dir.join(work_dir);
    }

    if let Ok(jobs) = std::env::var(ENV_JOBS) {
      let parsed = jobs.trim().parse::<usize>().ok().filter(|n| *n > 0);
      let Some(jobs_value) = parsed else {
        return Err(ConfigError::InvalidEnv {
          var: ENV_JOBS,
          value: jobs,
        });
      };
      debug!(jobs = jobs_value, "jobs overridden from environment");
      self.settings.jobs = jobs_value;
    }

    Ok(())
  }

  pub fn execute_config(&self) -> ExecuteConfig {
    ExecuteConfig {
      work_dir: self.settings.work_dir.clone(),
      tool_path: self.settings.tool_path.clone(),
      reuse: self.settings.reuse,
      keep_failed: self.settings.keep_failed,
      shell: self.settings.shell.clone(),
    }
  }

  pub fn orchestrator(&self) -> Orchestrator {
    Orchestrator::new(
      self.catalog.clone(),
      self.capabilities.clone(),
      self.execute_config(),
      self.settings.jobs,
      self.settings.targets_parallel,
    )
  }
}
