use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const BASE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/base.yaml");
const STRICT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/strict.yaml");

#[test]
fn help_lists_command_groups() {
    Command::cargo_bin("psk")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("config-hash"))
        .stdout(predicate::str::contains("order"));
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    Command::cargo_bin("psk")
        .unwrap()
        .args(["config-hash", BASE, STRICT])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains("\"require_approval\":true"));
}

#[test]
fn config_hash_strict_rejects_unknown_keys() -> anyhow::Result<()> {
    let mut f = tempfile::NamedTempFile::new()?;
    writeln!(f, "order:\n  require_aproval: true")?;
    let path = f.path().to_string_lossy().to_string();

    Command::cargo_bin("psk")?
        .args(["config-hash", "--strict", BASE, path.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));

    // Without --strict the stray key is reported, not fatal.
    Command::cargo_bin("psk")?
        .args(["config-hash", BASE, path.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("unused_key=/order/require_aproval"));
    Ok(())
}
