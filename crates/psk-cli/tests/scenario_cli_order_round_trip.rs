use assert_cmd::Command;
use predicates::prelude::*;

/// Add a pet, order it, cancel the order, then see the pet available again.
///
/// This test is DB-backed and is skipped if PSK_DATABASE_URL is not set.
#[test]
fn cli_place_then_cancel_restores_pet() -> anyhow::Result<()> {
    if std::env::var(psk_db::ENV_DB_URL).is_err() {
        eprintln!("SKIP: PSK_DATABASE_URL not set");
        return Ok(());
    }

    Command::cargo_bin("psk")?
        .args(["db", "migrate"])
        .assert()
        .success();

    let name = format!("cli-pet-{}", std::process::id());
    let out = Command::cargo_bin("psk")?
        .args(["--as-user", "1", "--role", "store_owner", "pet", "add"])
        .args(["--name", name.as_str()])
        .output()?;
    assert!(out.status.success());
    let pet: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(pet["status"], "available");
    let pet_id = pet["id"].as_i64().unwrap().to_string();

    let out = Command::cargo_bin("psk")?
        .args(["--as-user", "42", "order", "place", "--pet-id", pet_id.as_str()])
        .output()?;
    assert!(out.status.success());
    let order: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(order["status"], "placed");
    let order_id = order["id"].as_i64().unwrap().to_string();

    // A second buyer loses.
    Command::cargo_bin("psk")?
        .args(["--as-user", "43", "order", "place", "--pet-id", pet_id.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("code=PET_UNAVAILABLE"));

    let out = Command::cargo_bin("psk")?
        .args(["--as-user", "42", "order", "cancel", "--id", order_id.as_str()])
        .output()?;
    assert!(out.status.success());
    let cancelled: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(cancelled["order"]["id"].as_i64(), order["id"].as_i64());
    assert_eq!(cancelled["pet"]["status"], "available");

    Command::cargo_bin("psk")?
        .args(["pet", "get", "--id", pet_id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"available\""));
    Ok(())
}
