//! End-to-end runs across several targets.

use rtforge_lib::execute::StepStatus;
use rtforge_lib::run::TargetError;

use super::common::TestProject;

const TWO_TARGETS: &str = r#"
[settings]
jobs = 4
targets_parallel = 2

[[targets]]
name = "gnu"
triple = "x86_64-unknown-linux-gnu"
libc = "glibc"
dependencies = ["openssl", "cpython"]

[[targets]]
name = "musl"
triple = "x86_64-unknown-linux-musl"
libc = "musl"
dependencies = ["zlib", "cpython"]

[nodes.zlib]
procedure = { script = '''mkdir -p "$PREFIX/include" "$PREFIX/lib" && echo zlib > "$PREFIX/include/zlib.h"''' }

[nodes.openssl]
procedure = { script = '''echo "Configure: unsupported target $RTFORGE_TRIPLE" >&2; exit 1''' }

[nodes.cpython]
requires = ["zlib"]
procedure = { script = '''mkdir -p "$PREFIX/bin" && echo "$RTFORGE_TARGET" > "$PREFIX/bin/python3"''' }
"#;

#[tokio::test]
async fn one_target_failing_leaves_the_other_intact() {
  let project = TestProject::new(TWO_TARGETS);
  let report = project.build_all().await;

  assert!(!report.is_success());
  assert_eq!(report.targets.len(), 2);

  let gnu = report.get("gnu").unwrap();
  let error = gnu.error.as_ref().unwrap();
  assert!(matches!(error, TargetError::BuildStep(_)));
  assert_eq!(error.node(), Some("openssl"));
  assert!(error.output().unwrap().contains("unsupported target x86_64-unknown-linux-gnu"));
  assert!(gnu.handoff.is_none());

  let musl = report.get("musl").unwrap();
  assert!(musl.is_success(), "{:?}", musl.error);
  let python = project.work_dir().join("musl/out/cpython/bin/python3");
  assert_eq!(std::fs::read_to_string(python).unwrap().trim(), "musl");
  assert!(project.work_dir().join("musl/handoff.json").exists());
  assert!(!project.work_dir().join("gnu/handoff.json").exists());
}

#[tokio::test]
async fn targets_never_share_prefixes() {
  let config = TWO_TARGETS.replace("dependencies = [\"openssl\", \"cpython\"]", "dependencies = [\"cpython\"]");
  let project = TestProject::new(&config);
  let report = project.build_all().await;

  assert!(report.is_success());
  for target in ["gnu", "musl"] {
    let python = project.work_dir().join(target).join("out/cpython/bin/python3");
    assert_eq!(std::fs::read_to_string(python).unwrap().trim(), target);
  }
}

#[tokio::test]
async fn rerun_with_unchanged_inputs_reuses_everything() {
  let project = TestProject::new(TWO_TARGETS);

  let first = project.build_all().await;
  let second = project.build_all().await;

  let first_musl = first.get("musl").unwrap();
  let second_musl = second.get("musl").unwrap();

  assert!(second_musl.is_success());
  assert!(second_musl.results.iter().all(|r| r.status == StepStatus::Cached));

  let roots = |report: &rtforge_lib::run::TargetReport| {
    report
      .results
      .iter()
      .map(|r| (r.node.clone(), r.output_roots.clone()))
      .collect::<Vec<_>>()
  };
  assert_eq!(roots(first_musl), roots(second_musl));
  assert_eq!(first_musl.handoff, second_musl.handoff);
}

#[tokio::test]
async fn json_report_names_failing_node() {
  let project = TestProject::new(TWO_TARGETS);
  let report = project.build_all().await;

  let json = serde_json::to_value(&report).unwrap();
  let gnu = &json["targets"][0];
  assert_eq!(gnu["target"], "gnu");
  assert!(gnu["error"].as_str().unwrap().contains("node openssl"));
  assert_eq!(json["targets"][1]["error"], serde_json::Value::Null);
}

fn headers_project(netlink_version: &str, cpython_exit: u8) -> String {
  format!(
    r#"
[[targets]]
name = "musl"
triple = "x86_64-unknown-linux-musl"
libc = "musl"
dependencies = ["linux-headers", "cpython"]

[nodes.linux-headers]
procedure = {{ script = '''mkdir -p "$PREFIX/include/linux" && echo {version} > "$PREFIX/include/linux/netlink.h"''' }}

[nodes.cpython]
requires = ["linux-headers"]
procedure = {{ script = '''mkdir -p "$PREFIX/include" && cp "$C_INCLUDE_PATH/linux/netlink.h" "$PREFIX/include/netlink-seen.h"; exit {code}''' }}
"#,
    version = netlink_version,
    code = cpython_exit
  )
}

#[tokio::test]
async fn rebuilt_dependency_is_not_masked_by_cached_dependents() {
  let project = TestProject::new(&headers_project("v1", 0));
  assert!(project.build_all().await.is_success());

  project.write("rtforge.toml", &headers_project("v2", 0));
  let report = project.build_all().await;
  let musl = report.get("musl").unwrap();

  assert!(musl.is_success(), "{:?}", musl.error);
  assert!(musl.results.iter().all(|r| r.status == StepStatus::Built));

  let seen = project.work_dir().join("musl/out/cpython/include/netlink-seen.h");
  assert_eq!(std::fs::read_to_string(seen).unwrap().trim(), "v2");
}

#[tokio::test]
async fn failed_rerun_leaves_no_stale_handoff() {
  let project = TestProject::new(&headers_project("v1", 0));
  assert!(project.build_all().await.is_success());
  let manifest = project.work_dir().join("musl/handoff.json");
  assert!(manifest.exists());

  project.write("rtforge.toml", &headers_project("v1", 1));
  let report = project.build_all().await;

  assert!(!report.is_success());
  assert!(!manifest.exists());
}
