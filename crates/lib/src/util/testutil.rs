//! Shared fixtures for unit tests.

use std::path::Path;

use crate::execute::ExecuteConfig;
use crate::target::{Libc, TargetVariant};

pub fn musl_target(dependencies: &[&str]) -> TargetVariant {
  TargetVariant::new("musl", "x86_64-unknown-linux-musl", Libc::Musl, dependencies)
}

pub fn gnu_target(dependencies: &[&str]) -> TargetVariant {
  TargetVariant::new("gnu", "x86_64-unknown-linux-gnu", Libc::Glibc, dependencies)
}

/// Default execution settings rooted at `work`.
pub fn execute_config(work: &Path) -> ExecuteConfig {
  ExecuteConfig {
    work_dir: work.to_path_buf(),
    ..Default::default()
  }
}

/// A script that installs `header` into `$PREFIX/include` and creates an
/// empty `$PREFIX/lib`.
pub fn install_header(header: &str) -> String {
  format!(
    "mkdir -p \"$PREFIX/include\" \"$PREFIX/lib\" && echo '/* {} */' > \"$PREFIX/include/{}\"",
    header, header
  )
}

/// A script that writes a `pyconfig.h`-style record with the given defines.
pub fn write_pyconfig(defines: &[&str]) -> String {
  let mut script = String::from("mkdir -p \"$PREFIX/include\" && : > \"$PREFIX/include/pyconfig.h\"");
  for define in defines {
    script.push_str(&format!(
      " && echo '#define {} 1' >> \"$PREFIX/include/pyconfig.h\"",
      define
    ));
  }
  script
}
