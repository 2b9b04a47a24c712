//! Target Descriptor Store.
//!
//! A target variant is one platform triple + libc family combination for
//! which a complete runtime distribution is produced. Variants are declared
//! in the configuration file, frozen behind `Arc` at load time, and looked up
//! by name for the rest of the run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::SearchRoots;
use crate::verify::Severity;

/// The system C library a variant links against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Libc {
  Glibc,
  Musl,
}

impl Libc {
  pub fn as_str(self) -> &'static str {
    match self {
      Libc::Glibc => "glibc",
      Libc::Musl => "musl",
    }
  }
}

impl fmt::Display for Libc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Compiler/linker wrapper identity handed to every build step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerWrapper {
  pub cc: String,
  pub cxx: String,
  pub ar: String,
}

impl CompilerWrapper {
  /// Default cross wrapper for a triple/libc pair.
  ///
  /// glibc variants use the triple-prefixed GNU cross tools; musl variants go
  /// through `musl-clang` so the musl sysroot is the only libc visible.
  pub fn for_target(triple: &str, libc: Libc) -> Self {
    match libc {
      Libc::Glibc => Self {
        cc: format!("{}-gcc", triple),
        cxx: format!("{}-g++", triple),
        ar: format!("{}-ar", triple),
      },
      Libc::Musl => Self {
        cc: "musl-clang".to_string(),
        cxx: "clang++".to_string(),
        ar: "llvm-ar".to_string(),
      },
    }
  }
}

/// A declared target variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetVariant {
  pub name: String,
  pub triple: String,
  pub libc: Libc,
  /// Dependency names in declaration order; this order is the tie-break for
  /// nodes with no ordering constraint between them.
  pub dependencies: Vec<String>,
  /// Variant-specific roots, always searched before any dependency's roots.
  #[serde(default)]
  pub extra_roots: Vec<SearchRoots>,
  /// Node whose configuration record is verified. Defaults to the last node
  /// in topological order.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interpreter: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub toolchain: Option<CompilerWrapper>,
  /// Per-variant severity for capabilities declared globally.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub capability_severity: BTreeMap<String, Severity>,
}

impl TargetVariant {
  pub fn new(name: &str, triple: &str, libc: Libc, dependencies: &[&str]) -> Self {
    Self {
      name: name.to_string(),
      triple: triple.to_string(),
      libc,
      dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
      extra_roots: Vec::new(),
      interpreter: None,
      toolchain: None,
      capability_severity: BTreeMap::new(),
    }
  }

  pub fn with_extra_root(mut self, roots: SearchRoots) -> Self {
    self.extra_roots.push(roots);
    self
  }

  pub fn with_interpreter(mut self, node: &str) -> Self {
    self.interpreter = Some(node.to_string());
    self
  }

  pub fn with_severity(mut self, capability: &str, severity: Severity) -> Self {
    self.capability_severity.insert(capability.to_string(), severity);
    self
  }

  /// The wrapper this variant compiles with.
  pub fn wrapper(&self) -> CompilerWrapper {
    self
      .toolchain
      .clone()
      .unwrap_or_else(|| CompilerWrapper::for_target(&self.triple, self.libc))
  }

  /// Human-readable identity used in diagnostics, e.g. `musl (x86_64-unknown-linux-musl/musl)`.
  pub fn identity(&self) -> String {
    format!("{} ({}/{})", self.name, self.triple, self.libc)
  }
}

/// All declared target variants, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TargetStore {
  targets: Vec<Arc<TargetVariant>>,
  by_name: HashMap<String, usize>,
}

impl TargetStore {
  /// Freeze a list of variants. Returns the first duplicated name on conflict.
  pub fn new(targets: Vec<TargetVariant>) -> Result<Self, String> {
    let mut by_name = HashMap::new();
    let mut frozen = Vec::with_capacity(targets.len());

    for (idx, target) in targets.into_iter().enumerate() {
      if by_name.insert(target.name.clone(), idx).is_some() {
        return Err(target.name);
      }
      frozen.push(Arc::new(target));
    }

    Ok(Self {
      targets: frozen,
      by_name,
    })
  }

  pub fn get(&self, name: &str) -> Option<&Arc<TargetVariant>> {
    self.by_name.get(name).map(|&idx| &self.targets[idx])
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<TargetVariant>> {
    self.targets.iter()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Select targets by name, preserving declaration order. An empty
  /// selection means every target. Returns the first unknown name on failure.
  pub fn select(&self, names: &[String]) -> Result<Vec<Arc<TargetVariant>>, String> {
    if names.is_empty() {
      return Ok(self.targets.clone());
    }

    if let Some(unknown) = names.iter().find(|n| !self.by_name.contains_key(n.as_str())) {
      return Err(unknown.clone());
    }

    Ok(
      self
        .targets
        .iter()
        .filter(|t| names.contains(&t.name))
        .cloned()
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> TargetStore {
    TargetStore::new(vec![
      TargetVariant::new("gnu", "x86_64-unknown-linux-gnu", Libc::Glibc, &["zlib", "cpython"]),
      TargetVariant::new("musl", "x86_64-unknown-linux-musl", Libc::Musl, &["zlib", "cpython"]),
    ])
    .unwrap()
  }

  #[test]
  fn lookup_by_name() {
    let store = store();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("musl").unwrap().libc, Libc::Musl);
    assert!(store.get("armv7").is_none());
  }

  #[test]
  fn duplicate_names_are_rejected() {
    let err = TargetStore::new(vec![
      TargetVariant::new("gnu", "x86_64-unknown-linux-gnu", Libc::Glibc, &[]),
      TargetVariant::new("gnu", "aarch64-unknown-linux-gnu", Libc::Glibc, &[]),
    ])
    .unwrap_err();
    assert_eq!(err, "gnu");
  }

  #[test]
  fn select_keeps_declaration_order() {
    let store = store();
    let selected = store.select(&["musl".to_string(), "gnu".to_string()]).unwrap();
    let names: Vec<_> = selected.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["gnu", "musl"]);

    assert_eq!(store.select(&[]).unwrap().len(), 2);
    assert_eq!(store.select(&["ppc".to_string()]).unwrap_err(), "ppc");
  }

  #[test]
  fn wrapper_defaults_follow_libc() {
    let gnu = TargetVariant::new("gnu", "aarch64-unknown-linux-gnu", Libc::Glibc, &[]);
    assert_eq!(gnu.wrapper().cc, "aarch64-unknown-linux-gnu-gcc");

    let musl = TargetVariant::new("musl", "aarch64-unknown-linux-musl", Libc::Musl, &[]);
    assert_eq!(musl.wrapper().cc, "musl-clang");
  }

  #[test]
  fn toolchain_override_wins() {
    let mut target = TargetVariant::new("gnu", "x86_64-unknown-linux-gnu", Libc::Glibc, &[]);
    target.toolchain = Some(CompilerWrapper {
      cc: "clang".to_string(),
      cxx: "clang++".to_string(),
      ar: "llvm-ar".to_string(),
    });
    assert_eq!(target.wrapper().cc, "clang");
  }

  #[test]
  fn descriptor_schema_deserializes() {
    let target: TargetVariant = toml::from_str(
      r#"
        name = "musl"
        triple = "x86_64-unknown-linux-musl"
        libc = "musl"
        dependencies = ["linux-headers", "musl", "zlib", "cpython"]
        extra_roots = [{ include = "/opt/kheaders/include" }]
      "#,
    )
    .unwrap();

    assert_eq!(target.dependencies.len(), 4);
    assert_eq!(target.extra_roots[0], SearchRoots::include_only("/opt/kheaders/include"));
    assert!(target.interpreter.is_none());
  }
}
