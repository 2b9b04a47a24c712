//! Dependency node definitions.
//!
//! A node is one buildable unit (a library, the C library, kernel headers,
//! the interpreter itself). Nodes are declared once and shared read-only
//! across every target that references them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::SearchRoots;
use crate::util::hash::Hashable;
use crate::verify::RecordFormat;

/// How a node's external build procedure is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildProcedure {
  /// Run an executable directly.
  Exec {
    program: PathBuf,
    #[serde(default)]
    args: Vec<String>,
  },
  /// Run a script through the executor's shell (`/bin/sh -c` by default).
  Script(String),
}

impl BuildProcedure {
  /// Anchor a relative program path (one containing a separator) at `base`.
  /// Bare program names are left for `PATH` lookup.
  pub fn anchored(self, base: &Path) -> Self {
    match self {
      BuildProcedure::Exec { program, args } if program.is_relative() && program.components().count() > 1 => {
        BuildProcedure::Exec {
          program: base.join(program),
          args,
        }
      }
      other => other,
    }
  }
}

/// Where a node's configuration record lives and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordSpec {
  /// Path relative to the node's prefix, e.g. `include/python3.12/pyconfig.h`.
  pub path: PathBuf,
  #[serde(default)]
  pub format: RecordFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyNode {
  /// Filled from the `[nodes.<name>]` key at load time.
  #[serde(default, skip_deserializing)]
  pub name: String,
  #[serde(default)]
  pub requires: Vec<String>,
  pub procedure: BuildProcedure,
  /// Roots relative to the node's prefix that later steps may search.
  #[serde(default = "SearchRoots::prefix_default")]
  pub outputs: SearchRoots,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub record: Option<RecordSpec>,
}

impl Hashable for DependencyNode {}

impl DependencyNode {
  pub fn new(name: &str, requires: &[&str], procedure: BuildProcedure) -> Self {
    Self {
      name: name.to_string(),
      requires: requires.iter().map(|r| r.to_string()).collect(),
      procedure,
      outputs: SearchRoots::prefix_default(),
      record: None,
    }
  }

  pub fn script(name: &str, requires: &[&str], script: &str) -> Self {
    Self::new(name, requires, BuildProcedure::Script(script.to_string()))
  }

  pub fn with_outputs(mut self, outputs: SearchRoots) -> Self {
    self.outputs = outputs;
    self
  }

  pub fn with_record(mut self, path: &str, format: RecordFormat) -> Self {
    self.record = Some(RecordSpec {
      path: PathBuf::from(path),
      format,
    });
    self
  }
}

/// Every declared node, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
  nodes: BTreeMap<String, Arc<DependencyNode>>,
}

impl NodeCatalog {
  pub fn new(nodes: impl IntoIterator<Item = DependencyNode>) -> Self {
    Self {
      nodes: nodes
        .into_iter()
        .map(|node| (node.name.clone(), Arc::new(node)))
        .collect(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&Arc<DependencyNode>> {
    self.nodes.get(name)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.nodes.keys().map(String::as_str)
  }
}
