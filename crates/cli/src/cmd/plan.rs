//! Plan command implementation.
//!
//! Resolves each selected target's graph without running anything.

use std::path::Path;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

use rtforge_lib::graph::BuildGraph;

use crate::output::{OutputFormat, print_error, print_json, print_stat, print_success, symbols};

use super::load_config;

#[derive(Debug, Serialize)]
struct TargetPlan {
  target: String,
  triple: String,
  libc: String,
  interpreter: Option<String>,
  order: Vec<String>,
  waves: Vec<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
}

pub fn cmd_plan(config: Option<&Path>, targets: &[String], format: OutputFormat) -> Result<()> {
  let config = load_config(config)?;
  let selected = config
    .targets
    .select(targets)
    .map_err(|name| anyhow!("Unknown target: {}", name))?;

  let plans: Vec<TargetPlan> = selected
    .iter()
    .map(|target| {
      let mut plan = TargetPlan {
        target: target.name.clone(),
        triple: target.triple.clone(),
        libc: target.libc.to_string(),
        interpreter: None,
        order: Vec::new(),
        waves: Vec::new(),
        error: None,
      };
      match BuildGraph::resolve(target, &config.catalog) {
        Ok(graph) => {
          plan.interpreter = Some(graph.interpreter().to_string());
          plan.order = graph.order().to_vec();
          plan.waves = graph.waves();
        }
        Err(e) => plan.error = Some(e.to_string()),
      }
      plan
    })
    .collect();

  if format.is_json() {
    print_json(&plans)?;
  } else {
    for plan in &plans {
      print_plan(plan);
    }
  }

  let failed = plans.iter().filter(|p| p.error.is_some()).count();
  if failed > 0 {
    bail!("{} target(s) could not be resolved", failed);
  }

  Ok(())
}

fn print_plan(plan: &TargetPlan) {
  if let Some(error) = &plan.error {
    print_error(&format!("{}: {}", plan.target, error));
    return;
  }

  print_success(&format!("{} ({}/{})", plan.target, plan.triple, plan.libc));
  print_stat("Order", &plan.order.join(format!(" {} ", symbols::ARROW).as_str()));
  if let Some(interpreter) = &plan.interpreter {
    print_stat("Interpreter", interpreter);
  }
  for (idx, wave) in plan.waves.iter().enumerate() {
    print_stat(&format!("Wave {}", idx + 1), &wave.join(", "));
  }
  println!();
}
