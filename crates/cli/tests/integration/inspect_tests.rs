//! Plan, env and targets integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn plan_shows_order_and_waves() {
  let env = TestEnv::from_fixture("two_targets.toml");

  env
    .rtforge_cmd()
    .args(["plan", "-t", "gnu"])
    .assert()
    .success()
    .stdout(predicate::str::contains("zlib → openssl → cpython"))
    .stdout(predicate::str::contains("Wave 3"));

  assert!(!env.work_dir().exists());
}

#[test]
fn plan_json() {
  let env = TestEnv::from_fixture("two_targets.toml");

  let output = env
    .rtforge_cmd()
    .args(["plan", "--format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let plans: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(plans[0]["target"], "musl");
  assert_eq!(plans[1]["order"], serde_json::json!(["zlib", "openssl", "cpython"]));
  assert_eq!(plans[1]["interpreter"], "cpython");
}

#[test]
fn plan_reports_cycle() {
  let env = TestEnv::from_fixture("cycle.toml");

  env
    .rtforge_cmd()
    .arg("plan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle detected"));
}

#[test]
fn env_prints_composed_environment() {
  let env = TestEnv::from_fixture("single_target.toml");
  let zlib_include = env.work_dir().join("musl/out/zlib/include");
  let step_tmp = env.work_dir().join("musl/work/cpython-XXXXXX/tmp");

  env
    .rtforge_cmd()
    .args(["env", "-t", "musl", "-n", "cpython"])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("C_INCLUDE_PATH={}", zlib_include.display())))
    .stdout(predicate::str::contains("CC=musl-clang"))
    .stdout(predicate::str::contains("HOME=/homeless-shelter"))
    .stdout(predicate::str::contains(format!("TMPDIR={}", step_tmp.display())))
    .stdout(predicate::str::contains("RTFORGE_TARGET=musl"));
}

#[test]
fn env_rejects_node_outside_target() {
  let env = TestEnv::from_fixture("two_targets.toml");

  env
    .rtforge_cmd()
    .args(["env", "-t", "musl", "-n", "openssl"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("not part of target musl"));
}

#[test]
fn targets_lists_variants() {
  let env = TestEnv::from_fixture("two_targets.toml");

  env
    .rtforge_cmd()
    .arg("targets")
    .assert()
    .success()
    .stdout(predicate::str::contains("musl (x86_64-unknown-linux-musl/musl)"))
    .stdout(predicate::str::contains("gnu (x86_64-unknown-linux-gnu/glibc)"));
}
