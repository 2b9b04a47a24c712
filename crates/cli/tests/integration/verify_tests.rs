//! Verify command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn verify_header_record() {
  let env = TestEnv::from_fixture("missing_capability.toml");
  env.write_file("pyconfig.h", "#define HAVE_LINUX_NETLINK_H 1\n");

  env
    .rtforge_cmd()
    .args(["verify", "-t", "gnu", "--record", "pyconfig.h"])
    .assert()
    .success()
    .stdout(predicate::str::contains("gnu: 1 of 1 capabilities present"));
}

#[test]
fn verify_missing_marker_fails() {
  let env = TestEnv::from_fixture("missing_capability.toml");
  env.write_file("pyconfig.h", "/* #undef HAVE_LINUX_NETLINK_H */\n");

  env
    .rtforge_cmd()
    .args(["verify", "-t", "gnu", "--record", "pyconfig.h"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("AF_NETLINK socket support"));
}

#[test]
fn verify_env_record() {
  let env = TestEnv::from_fixture("missing_capability.toml");
  env.write_file("config.env", "HAVE_LINUX_NETLINK_H=1\n");

  env
    .rtforge_cmd()
    .args(["verify", "-t", "musl", "--record", "config.env", "--format", "env"])
    .assert()
    .success();
}

#[test]
fn verify_rejects_unknown_format() {
  let env = TestEnv::from_fixture("missing_capability.toml");

  env
    .rtforge_cmd()
    .args(["verify", "-t", "musl", "--record", "x", "--format", "yaml"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown record format"));
}
