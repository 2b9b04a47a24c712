//! Capability verification driven by variant-specific header roots.
//!
//! The interpreter "configure" step below checks for `linux/netlink.h` the way
//! a compiler would: first match along `C_INCLUDE_PATH`. Only the sanitized
//! header shipped as a musl extra root makes that check succeed.

use rtforge_lib::run::TargetError;
use rtforge_lib::verify::CapabilityError;

use super::common::TestProject;

const CONFIG: &str = r#"
[[targets]]
name = "gnu"
triple = "x86_64-unknown-linux-gnu"
libc = "glibc"
dependencies = ["linux-headers", "cpython"]

[[targets]]
name = "musl"
triple = "x86_64-unknown-linux-musl"
libc = "musl"
dependencies = ["linux-headers", "cpython"]
extra_roots = [{ include = "sysroots/musl/include" }]

[nodes.linux-headers]
procedure = { script = '''mkdir -p "$PREFIX/include/linux" && echo 'upstream, needs glibc types' > "$PREFIX/include/linux/netlink.h"''' }
outputs = { include = "include" }

[nodes.cpython]
requires = ["linux-headers"]
record = { path = "include/pyconfig.h" }

[nodes.cpython.procedure]
script = '''
mkdir -p "$PREFIX/include"
out="$PREFIX/include/pyconfig.h"
echo '/* generated */' > "$out"
for dir in $(echo "$C_INCLUDE_PATH" | tr ':' ' '); do
  if [ -f "$dir/linux/netlink.h" ]; then
    if grep -q usable "$dir/linux/netlink.h"; then
      echo '#define HAVE_LINUX_NETLINK_H 1' >> "$out"
    else
      echo '/* #undef HAVE_LINUX_NETLINK_H */' >> "$out"
    fi
    break
  fi
done
'''

[[capabilities]]
name = "AF_NETLINK socket support"
marker = "HAVE_LINUX_NETLINK_H"
"#;

fn project(config: &str) -> TestProject {
  let project = TestProject::new(config);
  project.write("sysroots/musl/include/linux/netlink.h", "/* sanitized, usable with musl */\n");
  project
}

#[tokio::test]
async fn variant_root_enables_capability_and_missing_one_fails() {
  let project = project(CONFIG);
  let report = project.build_all().await;

  let musl = report.get("musl").unwrap();
  assert!(musl.is_success(), "{:?}", musl.error);
  let verification = musl.verification.as_ref().unwrap();
  assert_eq!(verification.satisfied, vec!["AF_NETLINK socket support"]);

  let gnu = report.get("gnu").unwrap();
  match gnu.error.as_ref() {
    Some(TargetError::Capability(CapabilityError::MissingRequired { target, capability, marker, .. })) => {
      assert_eq!(target, "gnu");
      assert_eq!(capability, "AF_NETLINK socket support");
      assert_eq!(marker, "HAVE_LINUX_NETLINK_H");
    }
    other => panic!("expected missing capability, got {:?}", other),
  }
  assert!(gnu.handoff.is_none());
}

#[tokio::test]
async fn advisory_override_downgrades_to_warning() {
  let config = CONFIG.replace(
    "libc = \"glibc\"\n",
    "libc = \"glibc\"\ncapability_severity = { \"AF_NETLINK socket support\" = \"advisory\" }\n",
  );
  let project = project(&config);
  let report = project.build_all().await;

  assert!(report.is_success());
  let gnu = report.get("gnu").unwrap();
  assert_eq!(gnu.verification.as_ref().unwrap().missing_advisory().count(), 1);
}
