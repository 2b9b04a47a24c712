//! Environment Composer.
//!
//! Computes the closed, explicit search-path list and compiler environment a
//! build step sees. Nothing here reads the process environment: the only
//! inputs are the target descriptor, the resolved graph, roots recorded by
//! completed steps, and the configured tool path. Identical inputs produce an
//! identical `BuildEnvironment`.
//!
//! Ordering contract:
//! 1. the target's extra roots, in declaration order;
//! 2. roots contributed by the node's transitive dependencies, most recently
//!    built first, so a later, more specific dependency shadows an earlier,
//!    more generic one under first-match lookup.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::execute::BuildResult;
use crate::graph::BuildGraph;
use crate::target::{CompilerWrapper, TargetVariant};
use crate::types::SearchRoots;
use crate::util::hash::Hashable;

/// `PATH` value used when no tool path is configured; any tool lookup fails
/// fast instead of silently resolving against the host.
pub const UNSET_PATH: &str = "/path-not-set";

/// Read access to the roots a completed node contributed.
pub trait ContributedRoots {
  fn roots_of(&self, node: &str) -> Option<&SearchRoots>;
}

impl ContributedRoots for HashMap<String, BuildResult> {
  fn roots_of(&self, node: &str) -> Option<&SearchRoots> {
    self.get(node).map(|result| &result.output_roots)
  }
}

impl ContributedRoots for HashMap<String, SearchRoots> {
  fn roots_of(&self, node: &str) -> Option<&SearchRoots> {
    self.get(node)
  }
}

impl ContributedRoots for BTreeMap<String, SearchRoots> {
  fn roots_of(&self, node: &str) -> Option<&SearchRoots> {
    self.get(node)
  }
}

/// The frozen environment for one build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildEnvironment {
  include_paths: Vec<PathBuf>,
  lib_paths: Vec<PathBuf>,
  wrapper: CompilerWrapper,
  vars: BTreeMap<String, String>,
}

impl Hashable for BuildEnvironment {}

impl BuildEnvironment {
  pub fn include_paths(&self) -> &[PathBuf] {
    &self.include_paths
  }

  pub fn lib_paths(&self) -> &[PathBuf] {
    &self.lib_paths
  }

  pub fn wrapper(&self) -> &CompilerWrapper {
    &self.wrapper
  }

  /// Environment variables in a stable (sorted) order.
  pub fn vars(&self) -> &BTreeMap<String, String> {
    &self.vars
  }

  pub fn var(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  /// The first include root that provides `header`, as a compiler would pick it.
  pub fn locate_header(&self, header: impl AsRef<Path>) -> Option<PathBuf> {
    first_match(&self.include_paths, header.as_ref())
  }

  /// The first library root that provides `file`.
  pub fn locate_library(&self, file: impl AsRef<Path>) -> Option<PathBuf> {
    first_match(&self.lib_paths, file.as_ref())
  }
}

fn first_match(roots: &[PathBuf], relative: &Path) -> Option<PathBuf> {
  roots.iter().map(|root| root.join(relative)).find(|candidate| candidate.exists())
}

/// Append-only accumulator; `freeze` yields the immutable environment.
#[derive(Debug, Default)]
struct EnvironmentBuilder {
  include_paths: Vec<PathBuf>,
  lib_paths: Vec<PathBuf>,
}

impl EnvironmentBuilder {
  fn push_roots(&mut self, roots: &SearchRoots) {
    if let Some(include) = &roots.include
      && !self.include_paths.contains(include)
    {
      self.include_paths.push(include.clone());
    }
    if let Some(lib) = &roots.lib
      && !self.lib_paths.contains(lib)
    {
      self.lib_paths.push(lib.clone());
    }
  }

  fn freeze(self, target: &TargetVariant, tool_path: &[PathBuf]) -> BuildEnvironment {
    let wrapper = target.wrapper();
    let mut vars = BTreeMap::new();

    vars.insert("CC".to_string(), wrapper.cc.clone());
    vars.insert("CXX".to_string(), wrapper.cxx.clone());
    vars.insert("AR".to_string(), wrapper.ar.clone());

    // Empty search variables are omitted: an empty entry in *_PATH means the
    // current directory to the compiler driver.
    if !self.include_paths.is_empty() {
      let joined = join_paths(&self.include_paths);
      vars.insert("CPPFLAGS".to_string(), flags("-I", &self.include_paths));
      vars.insert("C_INCLUDE_PATH".to_string(), joined.clone());
      vars.insert("CPLUS_INCLUDE_PATH".to_string(), joined);
    }

    if !self.lib_paths.is_empty() {
      let pkgconfig: Vec<PathBuf> = self.lib_paths.iter().map(|lib| lib.join("pkgconfig")).collect();
      vars.insert("LDFLAGS".to_string(), flags("-L", &self.lib_paths));
      vars.insert("LIBRARY_PATH".to_string(), join_paths(&self.lib_paths));
      vars.insert("PKG_CONFIG_LIBDIR".to_string(), join_paths(&pkgconfig));
    }

    let path = if tool_path.is_empty() {
      UNSET_PATH.to_string()
    } else {
      join_paths(tool_path)
    };
    vars.insert("PATH".to_string(), path);

    vars.insert("RTFORGE_TARGET".to_string(), target.name.clone());
    vars.insert("RTFORGE_TRIPLE".to_string(), target.triple.clone());
    vars.insert("RTFORGE_LIBC".to_string(), target.libc.to_string());

    BuildEnvironment {
      include_paths: self.include_paths,
      lib_paths: self.lib_paths,
      wrapper,
      vars,
    }
  }
}

fn join_paths(paths: &[PathBuf]) -> String {
  paths
    .iter()
    .map(|p| p.to_string_lossy())
    .collect::<Vec<_>>()
    .join(":")
}

fn flags(prefix: &str, paths: &[PathBuf]) -> String {
  paths
    .iter()
    .map(|p| format!("{}{}", prefix, p.to_string_lossy()))
    .collect::<Vec<_>>()
    .join(" ")
}

/// Compose the environment for `node` within `graph`.
///
/// Only the node's transitive dependencies contribute, and only those with
/// recorded roots; the executor guarantees all of them have finished before
/// the node is scheduled.
pub fn compose_environment(
  target: &TargetVariant,
  graph: &BuildGraph,
  node: &str,
  completed: &impl ContributedRoots,
  tool_path: &[PathBuf],
) -> BuildEnvironment {
  let mut builder = EnvironmentBuilder::default();

  for roots in &target.extra_roots {
    builder.push_roots(roots);
  }

  for dep in graph.closure(node).iter().rev() {
    match completed.roots_of(dep) {
      Some(roots) => builder.push_roots(roots),
      None => debug!(target = %target.name, node, dependency = %dep, "no recorded roots for dependency"),
    }
  }

  builder.freeze(target, tool_path)
}
