use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const EXPORT: &str = "1/2/24, 3:04 PM - Alice: hello\ncontinued line\n1/2/24, 3:05 PM - Bob: hi Alice\n";

fn chatctx(home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chatctx");
    cmd.current_dir(home)
        .env("CHATCTX_HOME", home)
        .env_remove("CHATCTX_CONFIG_PATH")
        .env_remove("CHATCTX_TIME_ZONE")
        .env_remove("CHATCTX_LOG");
    cmd
}

#[test]
fn parse_reports_recovered_messages() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("chat.txt");
    fs::write(&export, EXPORT).expect("write export");

    chatctx(tmp.path())
        .arg("parse")
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("parse: ok"))
        .stdout(predicate::str::contains("messages=2"))
        .stdout(predicate::str::contains("ambiguous_dates=2"));
}

#[test]
fn parse_json_carries_messages() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("chat.txt");
    fs::write(&export, EXPORT).expect("write export");

    let out = chatctx(tmp.path())
        .args(["--json", "parse"])
        .arg(&export)
        .output()
        .expect("run");
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json report");
    assert_eq!(report["ok"], true);
    assert_eq!(report["data"]["messages"].as_array().map(Vec::len), Some(2));
}

#[test]
fn noise_only_export_fails_with_no_messages_found() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("noise.txt");
    fs::write(&export, "just some text\nwithout any header\n").expect("write export");

    chatctx(tmp.path())
        .arg("parse")
        .arg(&export)
        .assert()
        .failure()
        .stdout(predicate::str::contains("E002_NO_MESSAGES_FOUND"))
        .stdout(predicate::str::contains("just some text"));
}

#[test]
fn invalid_utf8_fails_with_undecodable_input() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("binary.txt");
    fs::write(&export, b"1/2/24, 3:04 PM - A: ok\n\xff\xfe").expect("write export");

    chatctx(tmp.path())
        .arg("parse")
        .arg(&export)
        .assert()
        .failure()
        .stdout(predicate::str::contains("E001_UNDECODABLE_INPUT"));
}

#[test]
fn format_prints_date_grouped_context() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("chat.txt");
    fs::write(&export, EXPORT).expect("write export");

    chatctx(tmp.path())
        .arg("format")
        .arg(&export)
        .assert()
        .success()
        .stdout(
            "## 2024-01-02 (Tuesday)\n[15:04] Alice: hello / continued line\n[15:05] Bob: hi Alice\n",
        )
        .stderr(predicate::str::contains("format: ok"))
        .stderr(predicate::str::contains("ambiguous_dates=2"));
}

#[test]
fn format_rejects_unknown_time_zone() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("chat.txt");
    fs::write(&export, EXPORT).expect("write export");

    chatctx(tmp.path())
        .args(["format", "--tz", "Mars/Olympus"])
        .arg(&export)
        .assert()
        .failure()
        .stdout(predicate::str::contains("E003_CONFIG_INVALID"));
}

#[test]
fn format_reads_feed_file_with_labels() {
    let tmp = tempdir().expect("tempdir");
    let feed = tmp.path().join("feed.json");
    fs::write(
        &feed,
        r#"[
            {"Time":"2024-01-02T15:05:00Z","IsFromMe":false,"Content":"hey"},
            {"Time":"2024-01-02T15:04:00Z","IsFromMe":true,"Content":"morning"},
            {"Time":"2024-01-02T15:06:00Z","IsFromMe":true,"Content":"  "}
        ]"#,
    )
    .expect("write feed");

    chatctx(tmp.path())
        .arg("format")
        .arg("--feed")
        .arg(&feed)
        .assert()
        .success()
        .stdout("## 2024-01-02 (Tuesday)\n[15:04] Me: morning\n[15:05] Contact: hey\n");
}

#[test]
fn chunk_prints_bounded_chunks() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("chat.txt");
    fs::write(&export, EXPORT).expect("write export");

    chatctx(tmp.path())
        .args(["chunk", "--budget", "1", "--print"])
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("--- chunk 0 ---"))
        .stdout(predicate::str::contains("--- chunk 1 ---"))
        .stderr(predicate::str::contains("chunks=2"));
}

#[test]
fn zero_budget_is_rejected_as_invalid_config() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("chat.txt");
    fs::write(&export, EXPORT).expect("write export");

    chatctx(tmp.path())
        .args(["chunk", "--budget", "0"])
        .arg(&export)
        .assert()
        .failure()
        .stdout(predicate::str::contains("E003_CONFIG_INVALID"))
        .stdout(predicate::str::contains("--budget must be >= 1"));
}

#[test]
fn source_flags_are_mutually_exclusive() {
    let tmp = tempdir().expect("tempdir");
    chatctx(tmp.path())
        .args(["format", "chat.txt", "--chat-id", "123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn invalid_config_file_fails_with_config_code() {
    let tmp = tempdir().expect("tempdir");
    let export = tmp.path().join("chat.txt");
    fs::write(&export, EXPORT).expect("write export");
    fs::write(tmp.path().join("config.toml"), "[chunking]\nbudget_units = 0\n").expect("write config");

    chatctx(tmp.path())
        .arg("parse")
        .arg(&export)
        .assert()
        .failure()
        .stdout(predicate::str::contains("E003_CONFIG_INVALID"));
}
