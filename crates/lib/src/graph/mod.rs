//! Dependency Graph Resolver.
//!
//! Expands a target's declared dependency names into a per-target build graph.
//! Expansion is a depth-first walk in declaration order with three-state
//! visitation; the topological order is the walk's post-order, so nodes with
//! no ordering constraint between them keep the order the target declared
//! them in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use thiserror::Error;
use tracing::debug;

use crate::node::{DependencyNode, NodeCatalog};
use crate::target::TargetVariant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("target {target}: unknown dependency '{name}' (required by {required_by})")]
  UnknownDependency {
    target: String,
    name: String,
    /// The node that required it, or the target itself.
    required_by: String,
  },

  #[error("target {target}: dependency cycle detected: {}", format_cycle(.members))]
  Cycle {
    target: String,
    /// Cycle members in traversal order, starting at the node that closed it.
    members: Vec<String>,
  },

  #[error("target {target}: interpreter node '{name}' is not part of the target's graph")]
  UnknownInterpreter { target: String, name: String },

  #[error("target {target}: declares no dependencies")]
  Empty { target: String },
}

fn format_cycle(members: &[String]) -> String {
  let mut path = members.join(" -> ");
  if let Some(first) = members.first() {
    path.push_str(" -> ");
    path.push_str(first);
  }
  path
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
  InProgress,
  Done,
}

/// A resolved, acyclic, per-target build graph.
#[derive(Debug, Clone)]
pub struct BuildGraph {
  target: String,
  nodes: HashMap<String, Arc<DependencyNode>>,
  order: Vec<String>,
  graph: DiGraph<String, ()>,
  indices: HashMap<String, NodeIndex>,
  interpreter: String,
}

struct Resolver<'a> {
  target: &'a TargetVariant,
  catalog: &'a NodeCatalog,
  state: HashMap<String, Visit>,
  stack: Vec<String>,
  order: Vec<String>,
  nodes: HashMap<String, Arc<DependencyNode>>,
}

impl Resolver<'_> {
  fn visit(&mut self, name: &str, required_by: &str) -> Result<(), GraphError> {
    match self.state.get(name) {
      Some(Visit::Done) => return Ok(()),
      Some(Visit::InProgress) => {
        let start = self.stack.iter().position(|n| n == name).unwrap_or(0);
        return Err(GraphError::Cycle {
          target: self.target.name.clone(),
          members: self.stack[start..].to_vec(),
        });
      }
      None => {}
    }

    let node = self
      .catalog
      .get(name)
      .ok_or_else(|| GraphError::UnknownDependency {
        target: self.target.name.clone(),
        name: name.to_string(),
        required_by: required_by.to_string(),
      })?
      .clone();

    self.state.insert(name.to_string(), Visit::InProgress);
    self.stack.push(name.to_string());

    for dep in &node.requires {
      self.visit(dep, name)?;
    }

    self.stack.pop();
    self.state.insert(name.to_string(), Visit::Done);
    self.order.push(name.to_string());
    self.nodes.insert(name.to_string(), node);

    Ok(())
  }
}

impl BuildGraph {
  /// Resolve a target's graph against the node catalog.
  ///
  /// Fails on unknown names and cycles; no partial graph is returned.
  pub fn resolve(target: &TargetVariant, catalog: &NodeCatalog) -> Result<Self, GraphError> {
    if target.dependencies.is_empty() {
      return Err(GraphError::Empty {
        target: target.name.clone(),
      });
    }

    let mut resolver = Resolver {
      target,
      catalog,
      state: HashMap::new(),
      stack: Vec::new(),
      order: Vec::new(),
      nodes: HashMap::new(),
    };

    let root = format!("target {}", target.name);
    for name in &target.dependencies {
      resolver.visit(name, &root)?;
    }

    let Resolver { order, nodes, .. } = resolver;

    let mut graph = DiGraph::new();
    let mut indices = HashMap::new();
    for name in &order {
      indices.insert(name.clone(), graph.add_node(name.clone()));
    }
    for name in &order {
      let dependent = indices[name];
      for dep in &nodes[name].requires {
        // edge from dependency to dependent
        graph.update_edge(indices[dep], dependent, ());
      }
    }

    let interpreter = match &target.interpreter {
      Some(name) if nodes.contains_key(name) => name.clone(),
      Some(name) => {
        return Err(GraphError::UnknownInterpreter {
          target: target.name.clone(),
          name: name.clone(),
        });
      }
      None => order.last().cloned().unwrap_or_default(),
    };

    debug!(target = %target.name, order = ?order, "resolved build graph");

    Ok(Self {
      target: target.name.clone(),
      nodes,
      order,
      graph,
      indices,
      interpreter,
    })
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  /// Node names in build order: every node after all of its dependencies.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  pub fn node(&self, name: &str) -> Option<&Arc<DependencyNode>> {
    self.nodes.get(name)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// The node whose configuration record is verified.
  pub fn interpreter(&self) -> &str {
    &self.interpreter
  }

  /// Position of a node in the build order.
  pub fn position(&self, name: &str) -> Option<usize> {
    self.order.iter().position(|n| n == name)
  }

  /// Direct dependencies of a node, in build order.
  pub fn dependencies(&self, name: &str) -> Vec<String> {
    let Some(&idx) = self.indices.get(name) else {
      return Vec::new();
    };

    let direct: HashSet<&str> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].as_str())
      .collect();

    self.in_order(|n| direct.contains(n))
  }

  /// Every node a node transitively depends on, in build order.
  pub fn closure(&self, name: &str) -> Vec<String> {
    let Some(&idx) = self.indices.get(name) else {
      return Vec::new();
    };

    let reversed = Reversed(&self.graph);
    let mut dfs = Dfs::new(reversed, idx);
    let mut reachable = HashSet::new();
    while let Some(found) = dfs.next(reversed) {
      if found != idx {
        reachable.insert(self.graph[found].as_str());
      }
    }

    self.in_order(|n| reachable.contains(n))
  }

  /// Group nodes into waves: each node lands one wave after its deepest
  /// dependency, so nodes within a wave never depend on each other.
  pub fn waves(&self) -> Vec<Vec<String>> {
    let mut level: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<String>> = Vec::new();

    for name in &self.order {
      let idx = self.indices[name];
      let depth = self
        .graph
        .neighbors_directed(idx, Direction::Incoming)
        .map(|dep| level[self.graph[dep].as_str()] + 1)
        .max()
        .unwrap_or(0);

      level.insert(name.as_str(), depth);
      if waves.len() <= depth {
        waves.resize(depth + 1, Vec::new());
      }
      waves[depth].push(name.clone());
    }

    waves
  }

  fn in_order(&self, keep: impl Fn(&str) -> bool) -> Vec<String> {
    self.order.iter().filter(|n| keep(n.as_str())).cloned().collect()
  }
}
