#![cfg(feature = "storage-rocksdb")]

mod common;

use assert_cmd::cargo_bin;
use common::write_commissions_csv;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: one payout that cannot be funded
    let csv1 = dir.path().join("first.csv");
    write_commissions_csv(&csv1, &[(1, 1, 7, "100")]).unwrap();

    let output1 = Command::new(cargo_bin!("payflow"))
        .arg("payouts")
        .arg(&csv1)
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("1,7,100,failed"));

    // 2. Second run against the same database with funds available
    let csv2 = dir.path().join("second.csv");
    write_commissions_csv(&csv2, &[(2, 2, 8, "50")]).unwrap();

    let output2 = Command::new(cargo_bin!("payflow"))
        .arg("payouts")
        .arg(&csv2)
        .arg("--platform-balance")
        .arg("50")
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    // The failed payout from the first run is still on record and ids continue
    assert!(stdout2.contains("1,7,100,failed"));
    assert!(stdout2.contains("2,8,50,completed"));
}
