mod common;

use common::{daylens, json_output};
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn entry_add_list_edit_delete() {
    let tmp = tempdir().expect("tempdir");

    let added = json_output(daylens(tmp.path()).args([
        "entry",
        "add",
        "Took Elvanse 30mg, felt focused",
        "--date",
        "2026-01-05",
        "--time",
        "9:05",
    ]));
    let id = added["data"]["id"].as_str().expect("id").to_string();
    assert_eq!(added["data"]["entry_time"], "09:05");
    assert_eq!(added["data"]["source"], "manual");

    json_output(daylens(tmp.path()).args(["entry", "add", "Evening run", "--date", "2026-01-04"]));

    let listed = json_output(daylens(tmp.path()).args(["entry", "list"]));
    let dates: Vec<&str> = listed["data"]
        .as_array()
        .expect("entries")
        .iter()
        .map(|e| e["entry_date"].as_str().expect("date"))
        .collect();
    assert_eq!(dates, ["2026-01-04", "2026-01-05"]);

    let edited = json_output(daylens(tmp.path()).args([
        "entry",
        "edit",
        id.as_str(),
        "--text",
        "Took Elvanse 20mg",
        "--clear-time",
    ]));
    assert_eq!(edited["data"]["text"], "Took Elvanse 20mg");
    assert!(edited["data"]["entry_time"].is_null());

    daylens(tmp.path())
        .args(["entry", "delete", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted"));

    let listed = json_output(daylens(tmp.path()).args(["entry", "list", "--date", "2026-01-05"]));
    assert_eq!(listed["data"].as_array().expect("entries").len(), 0);
}

#[test]
fn invalid_dates_and_unknown_ids_fail() {
    let tmp = tempdir().expect("tempdir");

    daylens(tmp.path())
        .args(["entry", "add", "text", "--date", "05/01/2026"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected YYYY-MM-DD"));

    daylens(tmp.path())
        .args(["entry", "delete", "missing-id"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found"));
}
