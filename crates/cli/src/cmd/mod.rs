mod build;
mod env;
mod plan;
mod targets;
mod verify;

pub use build::{BuildOptions, cmd_build};
pub use env::cmd_env;
pub use plan::cmd_plan;
pub use targets::cmd_targets;
pub use verify::cmd_verify;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use rtforge_lib::config::BuildConfig;
use rtforge_lib::target::TargetVariant;

/// Load the explicit config, or `rtforge.toml` from the working directory.
fn load_config(explicit: Option<&Path>) -> Result<BuildConfig> {
  let cwd = std::env::current_dir().context("Failed to determine current directory")?;
  let cwd = dunce::canonicalize(&cwd).unwrap_or(cwd);
  let path = BuildConfig::locate(explicit, &cwd);

  if !path.exists() {
    return Err(anyhow!("Config file not found: {}", path.display()));
  }

  BuildConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

fn find_target(config: &BuildConfig, name: &str) -> Result<Arc<TargetVariant>> {
  config
    .targets
    .get(name)
    .cloned()
    .ok_or_else(|| anyhow!("Unknown target: {}", name))
}
