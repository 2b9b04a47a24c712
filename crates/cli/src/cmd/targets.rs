use std::path::Path;

use anyhow::Result;

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success};

use super::load_config;

pub fn cmd_targets(config: Option<&Path>, format: OutputFormat) -> Result<()> {
  let config = load_config(config)?;

  if format.is_json() {
    let targets: Vec<_> = config.targets.iter().map(|t| t.as_ref()).collect();
    return print_json(&targets);
  }

  if config.targets.is_empty() {
    print_info("No targets declared");
    return Ok(());
  }

  for target in config.targets.iter() {
    print_success(&target.identity());
    print_stat("Dependencies", &target.dependencies.join(", "));
    let wrapper = target.wrapper();
    print_stat("Compiler", &format!("{} / {} / {}", wrapper.cc, wrapper.cxx, wrapper.ar));
  }

  Ok(())
}
