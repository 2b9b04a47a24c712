//! Implementation of the `rtforge build` command.
//!
//! Builds every selected target variant, verifies the interpreter's
//! capabilities and hands the trees off. Targets fail independently; the
//! command exits non-zero when any of them did.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tracing::warn;

use rtforge_lib::execute::{BuildStepError, CancelToken, OUTPUT_TAIL_LINES, StepStatus, output_tail};
use rtforge_lib::run::{HandoffManifestSink, RunReport, TargetError, TargetReport};

use crate::output::{
  OutputFormat, format_duration, print_error, print_excerpt, print_info, print_json, print_stat, print_success,
  print_warning, symbols, truncate_hash,
};

use super::load_config;

pub struct BuildOptions {
  pub targets: Vec<String>,
  pub jobs: Option<usize>,
  pub no_reuse: bool,
  pub keep_failed: bool,
  pub format: OutputFormat,
}

pub fn cmd_build(config: Option<&Path>, options: &BuildOptions, verbose: bool) -> Result<()> {
  let mut config = load_config(config)?;

  if let Some(jobs) = options.jobs {
    if jobs == 0 {
      bail!("--jobs must be at least 1");
    }
    config.settings.jobs = jobs;
  }
  if options.no_reuse {
    config.settings.reuse = false;
  }
  if options.keep_failed {
    config.settings.keep_failed = true;
  }

  let targets = config
    .targets
    .select(&options.targets)
    .map_err(|name| anyhow!("Unknown target: {}", name))?;

  if targets.is_empty() {
    print_warning("No targets declared");
    return Ok(());
  }

  if !options.format.is_json() {
    print_info(&format!(
      "Building {} target(s) with {} job(s) in {}",
      targets.len(),
      config.settings.jobs,
      config.settings.work_dir.display()
    ));
  }

  let orchestrator = config.orchestrator();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(async {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling run");
        trigger.cancel();
      }
    });
    orchestrator.run(targets, cancel).await
  });

  if options.format.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report, verbose);
  }

  let failed: Vec<&str> = report.failed().map(|t| t.target.as_str()).collect();
  if !failed.is_empty() {
    bail!("{} target(s) failed: {}", failed.len(), failed.join(", "));
  }

  Ok(())
}

fn print_report(report: &RunReport, verbose: bool) {
  println!();
  for target in &report.targets {
    match &target.error {
      None => print_target_success(target, verbose),
      Some(error) => print_target_failure(target, error, verbose),
    }
  }
}

fn count_status(target: &TargetReport, status: StepStatus) -> usize {
  target.results.iter().filter(|r| r.status == status).count()
}

fn print_results(target: &TargetReport) {
  for result in &target.results {
    println!(
      "    {} {} [{}] {}",
      symbols::INFO,
      result.node,
      result.status,
      truncate_hash(&result.fingerprint.0)
    );
  }
  for node in &target.skipped {
    println!("    {} {} [skipped]", symbols::SKIPPED, node);
  }
}

fn print_target_success(target: &TargetReport, verbose: bool) {
  print_success(&format!(
    "{}: {} built, {} cached ({})",
    target.target,
    count_status(target, StepStatus::Built),
    count_status(target, StepStatus::Cached),
    format_duration(target.duration)
  ));

  if let Some(verification) = &target.verification {
    for missing in verification.missing_advisory() {
      print_warning(&format!(
        "{}: advisory capability '{}' missing ({})",
        target.target, missing.name, missing.marker
      ));
    }
    if verbose {
      print_stat("Capabilities", &verification.satisfied.len().to_string());
    }
  }

  if let Some(handoff) = &target.handoff {
    print_stat(
      "Hand-off",
      &HandoffManifestSink::manifest_path(&handoff.tree).display().to_string(),
    );
  }

  if verbose {
    print_results(target);
  }
}

fn print_target_failure(target: &TargetReport, error: &TargetError, verbose: bool) {
  print_error(&format!("{}: {}", target.target, error));

  if let Some(node) = error.node() {
    print_stat("Node", node);
  }
  if let Some(capability) = error.capability() {
    print_stat("Capability", capability);
  }
  if let TargetError::BuildStep(BuildStepError::ProcedureFailed {
    preserved: Some(path), ..
  }) = error
  {
    print_stat("Scratch kept", &path.display().to_string());
  }
  if let Some(output) = error.output() {
    let tail = output_tail(output, OUTPUT_TAIL_LINES);
    if !tail.is_empty() {
      eprintln!("  last {} line(s) of output:", tail.lines().count());
      print_excerpt(&tail);
    }
  }
  if !target.skipped.is_empty() {
    print_stat("Not started", &target.skipped.join(", "));
  }

  if verbose {
    print_results(target);
  }
}
