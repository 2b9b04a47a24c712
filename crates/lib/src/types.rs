use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A pair of header/library search roots.
///
/// The same shape describes three things: a variant's extra roots (absolute),
/// the roots a node declares relative to its prefix, and the absolute roots a
/// finished node contributed to later steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchRoots {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub include: Option<PathBuf>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lib: Option<PathBuf>,
}

impl SearchRoots {
  pub fn new(include: impl Into<PathBuf>, lib: impl Into<PathBuf>) -> Self {
    Self {
      include: Some(include.into()),
      lib: Some(lib.into()),
    }
  }

  pub fn include_only(include: impl Into<PathBuf>) -> Self {
    Self {
      include: Some(include.into()),
      lib: None,
    }
  }

  /// The conventional `include`/`lib` layout under an install prefix.
  pub fn prefix_default() -> Self {
    Self::new("include", "lib")
  }

  /// Anchor relative roots at `base`. Absolute roots are kept as-is.
  pub fn resolve(&self, base: &Path) -> Self {
    Self {
      include: self.include.as_ref().map(|p| base.join(p)),
      lib: self.lib.as_ref().map(|p| base.join(p)),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.include.is_none() && self.lib.is_none()
  }
}
