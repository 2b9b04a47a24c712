//! Verify command implementation.
//!
//! Checks an existing configuration record against the declared capabilities
//! using the severities of one target variant.

use std::path::Path;

use anyhow::Result;

use rtforge_lib::verify::{CapabilityError, RecordFormat, verify_capabilities};

use crate::output::{print_error, print_info, print_stat, print_success, print_warning};

use super::{find_target, load_config};

pub fn cmd_verify(config: Option<&Path>, target: &str, record: &Path, format: RecordFormat) -> Result<()> {
  let config = load_config(config)?;
  let target = find_target(&config, target)?;

  if config.capabilities.is_empty() {
    print_info("No capabilities declared");
    return Ok(());
  }

  match verify_capabilities(&target, &config.capabilities, record, format) {
    Ok(report) => {
      print_success(&format!(
        "{}: {} of {} capabilities present",
        target.name,
        report.satisfied.len(),
        config.capabilities.len()
      ));
      for missing in report.missing_advisory() {
        print_warning(&format!("advisory capability '{}' missing ({})", missing.name, missing.marker));
      }
      Ok(())
    }
    Err(e) => {
      print_error(&e.to_string());
      if let CapabilityError::MissingRequired { marker, .. } = &e {
        print_stat("Marker", marker);
      }
      Err(e.into())
    }
  }
}
