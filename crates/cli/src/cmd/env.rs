//! Env command implementation.
//!
//! Prints the environment a node's build procedure receives, assuming every
//! dependency was installed into its usual prefix, so a failing step can be
//! reproduced by hand. A real step gets a fresh scratch directory per run;
//! `TMPDIR` shows its shape with the random suffix left as `XXXXXX`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use rtforge_lib::compose::compose_environment;
use rtforge_lib::execute::{TargetLayout, isolation_vars};
use rtforge_lib::graph::BuildGraph;
use rtforge_lib::types::SearchRoots;

use super::{find_target, load_config};

pub fn cmd_env(config: Option<&Path>, target: &str, node: &str) -> Result<()> {
  let config = load_config(config)?;
  let target = find_target(&config, target)?;

  let graph = BuildGraph::resolve(&target, &config.catalog)
    .with_context(|| format!("Failed to resolve target {}", target.name))?;

  if graph.node(node).is_none() {
    bail!("Node {} is not part of target {}", node, target.name);
  }

  let layout = TargetLayout::new(&config.settings.work_dir, &target.name);
  let installed: BTreeMap<String, SearchRoots> = graph
    .order()
    .iter()
    .filter_map(|name| {
      let dep = graph.node(name)?;
      Some((name.clone(), dep.outputs.resolve(&layout.prefix(name))))
    })
    .collect();

  let env = compose_environment(&target, &graph, node, &installed, &config.settings.tool_path);

  let mut vars: BTreeMap<String, String> = env.vars().clone();
  let scratch = scratch_tmp_dir(&layout, node);
  for (key, value) in isolation_vars(&layout.prefix(node), node, &scratch) {
    vars.insert(key.to_string(), value);
  }

  for (key, value) in &vars {
    println!("{}={}", key, shell_quote(value));
  }

  Ok(())
}

/// Where a step's `TMPDIR` lands: `<target>/work/<node>-XXXXXX/tmp`.
fn scratch_tmp_dir(layout: &TargetLayout, node: &str) -> PathBuf {
  layout.scratch_root().join(format!("{}-XXXXXX", node)).join("tmp")
}

fn shell_quote(value: &str) -> String {
  if !value.is_empty()
    && value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || "/._-:+=,".contains(c))
  {
    value.to_string()
  } else {
    format!("'{}'", value.replace('\'', r"'\''"))
  }
}
