//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_single_target() {
  let env = TestEnv::from_fixture("single_target.toml");

  env
    .rtforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("musl: 2 built, 0 cached"));

  let tree = env.work_dir().join("musl");
  assert!(tree.join("out/zlib/include/zlib.h").exists());
  assert!(tree.join("out/cpython/include/pyconfig.h").exists());
  assert!(tree.join("handoff.json").exists());
}

#[test]
fn build_is_reused_on_rerun() {
  let env = TestEnv::from_fixture("single_target.toml");

  env.rtforge_cmd().arg("build").assert().success();

  env
    .rtforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("musl: 0 built, 2 cached"));
}

#[test]
fn build_no_reuse_rebuilds_everything() {
  let env = TestEnv::from_fixture("single_target.toml");

  env.rtforge_cmd().arg("build").assert().success();

  env
    .rtforge_cmd()
    .args(["build", "--no-reuse"])
    .assert()
    .success()
    .stdout(predicate::str::contains("musl: 2 built, 0 cached"));
}

#[test]
fn build_json_report() {
  let env = TestEnv::from_fixture("single_target.toml");

  let output = env
    .rtforge_cmd()
    .args(["build", "--format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let target = &report["targets"][0];
  assert_eq!(target["target"], "musl");
  assert!(target["error"].is_null());

  let nodes: Vec<_> = target["results"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["node"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(nodes, vec!["zlib", "cpython"]);
  assert_eq!(target["results"][0]["status"], "built");
  assert_eq!(target["verification"]["satisfied"][0], "zlib compression");
}

#[test]
fn failing_target_does_not_stop_others() {
  let env = TestEnv::from_fixture("two_targets.toml");

  env
    .rtforge_cmd()
    .arg("build")
    .assert()
    .failure()
    .stdout(predicate::str::contains("musl: 1 built"))
    .stderr(predicate::str::contains("gnu: target gnu: node openssl failed (exit code 3)"))
    .stderr(predicate::str::contains("cannot find perl"))
    .stderr(predicate::str::contains("1 target(s) failed: gnu"));

  assert!(env.work_dir().join("musl/handoff.json").exists());
  assert!(!env.work_dir().join("gnu/handoff.json").exists());
  assert!(!env.work_dir().join("gnu/out/cpython").exists());
}

#[test]
fn target_selection_limits_the_run() {
  let env = TestEnv::from_fixture("two_targets.toml");

  env
    .rtforge_cmd()
    .args(["build", "-t", "musl"])
    .assert()
    .success();

  assert!(!env.work_dir().join("gnu").exists());
}

#[test]
fn unknown_target_fails() {
  let env = TestEnv::from_fixture("two_targets.toml");

  env
    .rtforge_cmd()
    .args(["build", "-t", "riscv"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown target: riscv"));
}

#[test]
fn missing_required_capability_fails_target() {
  let env = TestEnv::from_fixture("missing_capability.toml");
  env.write_file("sysroot/include/linux/netlink.h", "/* netlink */\n");

  env
    .rtforge_cmd()
    .arg("build")
    .assert()
    .failure()
    .stdout(predicate::str::contains("musl: 1 built"))
    .stderr(predicate::str::contains("required capability 'AF_NETLINK socket support' is missing"))
    .stderr(predicate::str::contains("1 target(s) failed: gnu"));
}

#[test]
fn keep_failed_preserves_scratch() {
  let env = TestEnv::from_fixture("two_targets.toml");

  env
    .rtforge_cmd()
    .args(["build", "-t", "gnu", "--keep-failed"])
    .assert()
    .failure()
    .stdout(predicate::str::contains("Scratch kept"));
}

#[test]
fn jobs_override_is_validated() {
  let env = TestEnv::from_fixture("single_target.toml");

  env
    .rtforge_cmd()
    .args(["build", "-j", "0"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--jobs must be at least 1"));
}

#[test]
fn work_dir_env_override() {
  let env = TestEnv::from_fixture("single_target.toml");

  env
    .rtforge_cmd()
    .arg("build")
    .env("RTFORGE_WORK_DIR", "elsewhere")
    .assert()
    .success();

  assert!(env.temp.path().join("elsewhere/musl/handoff.json").exists());
  assert!(!env.work_dir().exists());
}
