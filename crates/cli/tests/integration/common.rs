//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding `rtforge.toml` and the
/// default `build` work directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file, copied to `rtforge.toml`.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("rtforge.toml");
    std::fs::write(&config_path, fixture_content(name)).unwrap();
    Self { temp, config_path }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// The work directory builds land in.
  pub fn work_dir(&self) -> PathBuf {
    let root = dunce::canonicalize(self.temp.path()).unwrap_or_else(|_| self.temp.path().to_path_buf());
    root.join("build")
  }

  /// Get a pre-configured Command for the rtforge binary.
  ///
  /// Runs inside the temp directory and clears environment overrides that
  /// would redirect the work directory or job count.
  pub fn rtforge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("rtforge");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("RTFORGE_WORK_DIR");
    cmd.env_remove("RTFORGE_JOBS");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
