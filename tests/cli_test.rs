mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::write_commissions_csv;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_cli_payouts_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("commissions.csv");
    write_commissions_csv(
        &input,
        &[
            (1, 10, 7, "40"),
            (2, 11, 7, "10"),
            (3, 12, 8, "25"),
            (4, 13, 9, "-3"),
        ],
    )?;

    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg("payouts")
        .arg(&input)
        .arg("--platform-balance")
        .arg("60");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "payout,seller,amount,status,transfer,failure_reason",
        ))
        // Seller 7's two commissions are paid together.
        .stdout(predicate::str::is_match(r"1,7,50,completed,tr_\d+,\n")?)
        // Only 10 left on the platform balance for seller 8.
        .stdout(predicate::str::contains(
            "2,8,25,failed,,Driver returned null - transfer creation failed",
        ))
        // The negative commission row is rejected and seller 9 gets nothing.
        .stdout(predicate::str::contains(",9,").not());

    Ok(())
}

#[test]
fn test_cli_sync_groups_prints_batches() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.args(["sync-groups", "--users", "2500", "--chunk-size", "1000"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("batch,name,jobs"))
        .stdout(predicate::str::is_match(r"Sync User Groups \(Chunk 1\),1000\n")?)
        .stdout(predicate::str::is_match(r"Sync User Groups \(Chunk 2\),1000\n")?)
        .stdout(predicate::str::is_match(r"Sync User Groups \(Chunk 3\),500\n")?);

    Ok(())
}

#[test]
fn test_cli_rejects_zero_chunk_size() {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.args(["sync-groups", "--users", "10", "--chunk-size", "0"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Chunk size must be at least 1"));
}

#[test]
fn test_cli_malformed_config_is_reported() {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.args(["sync-groups", "--users", "1"])
        .env("PAYFLOW_WEBHOOK_TRIES", "lots");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("PAYFLOW_WEBHOOK_TRIES"));
}
