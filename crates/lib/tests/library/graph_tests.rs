//! Graph resolution through a loaded configuration.

use rtforge_lib::graph::{BuildGraph, GraphError};
use rtforge_lib::run::TargetError;

use super::common::TestProject;

const LAYERED: &str = r#"
[[targets]]
name = "musl"
triple = "x86_64-unknown-linux-musl"
libc = "musl"
dependencies = ["cpython", "linux-headers"]

[nodes.linux-headers]
procedure = { script = "true" }
outputs = { include = "include" }

[nodes.musl]
requires = ["linux-headers"]
procedure = { script = "true" }

[nodes.zlib]
requires = ["musl"]
procedure = { script = "true" }

[nodes.openssl]
requires = ["musl"]
procedure = { script = "true" }

[nodes.cpython]
requires = ["zlib", "openssl", "musl"]
procedure = { script = "true" }
"#;

#[test]
fn every_node_follows_its_dependencies() {
  let project = TestProject::new(LAYERED);
  let config = project.load();
  let target = config.targets.get("musl").unwrap();
  let graph = BuildGraph::resolve(target, &config.catalog).unwrap();

  assert_eq!(graph.order(), &["linux-headers", "musl", "zlib", "openssl", "cpython"]);
  for name in graph.order() {
    let position = graph.position(name).unwrap();
    for dep in graph.dependencies(name) {
      assert!(graph.position(&dep).unwrap() < position, "{} must precede {}", dep, name);
    }
  }
  assert_eq!(graph.interpreter(), "cpython");
}

#[tokio::test]
async fn cycle_fails_only_its_target() {
  let config = format!(
    "{}\n{}",
    r#"
[[targets]]
name = "broken"
triple = "x86_64-unknown-linux-gnu"
libc = "glibc"
dependencies = ["a"]

[nodes.a]
requires = ["b"]
procedure = { script = "true" }

[nodes.b]
requires = ["a"]
procedure = { script = "true" }
"#,
    LAYERED
  );
  let project = TestProject::new(&config);
  let report = project.build_all().await;

  match report.get("broken").unwrap().error.as_ref() {
    Some(TargetError::Graph(GraphError::Cycle { members, .. })) => {
      assert!(members.contains(&"a".to_string()));
      assert!(members.contains(&"b".to_string()));
    }
    other => panic!("expected cycle, got {:?}", other),
  }
  assert!(!project.work_dir().join("broken").exists());
  assert!(report.get("musl").unwrap().is_success());
}
