//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rtforge_lib::config::BuildConfig;
use rtforge_lib::execute::CancelToken;
use rtforge_lib::run::RunReport;
use tempfile::TempDir;

/// A throwaway project directory holding an `rtforge.toml`.
pub struct TestProject {
  dir: TempDir,
}

impl TestProject {
  pub fn new(config: &str) -> Self {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("rtforge.toml"), config).unwrap();
    Self { dir }
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  pub fn write(&self, relative: &str, content: &str) -> PathBuf {
    let path = self.dir.path().join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn load(&self) -> BuildConfig {
    BuildConfig::load(&self.dir.path().join("rtforge.toml")).unwrap()
  }

  /// Build every declared target.
  pub async fn build_all(&self) -> RunReport {
    let config = self.load();
    let targets = config.targets.iter().map(Arc::clone).collect();
    config.orchestrator().run(targets, CancelToken::new()).await
  }

  pub fn work_dir(&self) -> PathBuf {
    dunce::canonicalize(self.dir.path()).unwrap().join("build")
  }
}
