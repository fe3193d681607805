//! Integration tests for argument parsing and pre-network failure modes.
//!
//! Every command validates its credentials and inputs before touching the
//! network, so these run offline.

use std::{
  io::{Read, Write},
  net::TcpListener,
};

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;

/// A command with every credential variable cleared.
fn paperflow() -> Command {
  let mut cmd = Command::cargo_bin("paperflow").unwrap();
  cmd
    .env_remove("ZOTERO_USER_ID")
    .env_remove("ZOTERO_API_KEY")
    .env_remove("ZOTERO_API_BASE")
    .env_remove("NOTION_API_KEY")
    .env_remove("NOTION_DATABASE_ID")
    .env_remove("ARK_API_KEY")
    .env_remove("DASHSCOPE_API_KEY")
    .env_remove("AI_PROVIDER");
  cmd
}

/// Minimal Zotero stand-in: item listings succeed, every other request
/// (notably `/children`) returns a 500. Returns the base URL to point
/// `ZOTERO_API_BASE` at.
fn spawn_failing_children_server() -> String {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let base = format!("http://{}", listener.local_addr().unwrap());
  std::thread::spawn(move || {
    for stream in listener.incoming() {
      let Ok(mut stream) = stream else { continue };
      let mut buf = [0u8; 4096];
      let read = stream.read(&mut buf).unwrap_or(0);
      let request = String::from_utf8_lossy(&buf[..read]);
      let (status, body) = if request.contains("/items/top") {
        let items = r#"[
          {"key":"AAAA1111","version":1,"data":{"itemType":"journalArticle","title":"One","DOI":"10.1/x"}},
          {"key":"BBBB2222","version":1,"data":{"itemType":"journalArticle","title":"Two","DOI":"10.1/x"}}
        ]"#;
        ("200 OK", items)
      } else {
        ("500 Internal Server Error", "boom")
      };
      let _ = write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
      );
    }
  });
  base
}

#[test]
#[serial]
fn help_lists_every_subcommand() {
  paperflow().arg("--help").assert().success().stdout(
    predicate::str::contains("merge")
      .and(predicate::str::contains("watch"))
      .and(predicate::str::contains("enrich"))
      .and(predicate::str::contains("summarize"))
      .and(predicate::str::contains("sync")),
  );
}

#[test]
#[serial]
fn subcommand_help_documents_the_flags() {
  for (command, flag) in [
    ("merge", "--group-by"),
    ("watch", "--min-score"),
    ("enrich", "--use-pdf"),
    ("summarize", "--note-tag"),
    ("sync", "--tag-file"),
  ] {
    paperflow()
      .args([command, "--help"])
      .assert()
      .success()
      .stdout(predicate::str::contains(flag).and(predicate::str::contains("--dry-run")));
  }
}

#[test]
#[serial]
fn merge_requires_zotero_credentials() {
  paperflow()
    .args(["merge", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("ZOTERO_USER_ID"));
}

#[test]
#[serial]
fn enrich_requires_zotero_credentials() {
  paperflow()
    .args(["enrich", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("ZOTERO_USER_ID"));
}

#[test]
#[serial]
fn merge_skips_records_whose_children_cannot_be_fetched() {
  let base = spawn_failing_children_server();
  paperflow()
    .env("ZOTERO_USER_ID", "12345")
    .env("ZOTERO_API_KEY", "test-key")
    .env("ZOTERO_API_BASE", base)
    .args(["merge", "--dry-run"])
    .assert()
    .success()
    .stdout(
      predicate::str::contains("2 records skipped on fetch errors")
        .and(predicate::str::contains("No duplicate groups found")),
    );
}

#[test]
#[serial]
fn merge_rejects_an_unknown_group_by_mode() {
  paperflow()
    .args(["merge", "--group-by", "isbn"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("group-by"));
}

#[test]
#[serial]
fn watch_reports_a_missing_tag_file() {
  let dir = tempfile::tempdir().unwrap();
  paperflow()
    .current_dir(dir.path())
    .args(["watch", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("tag file"));
}

#[test]
#[serial]
fn watch_requires_zotero_credentials_once_the_tag_file_loads() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("tag.json"),
    r#"{ "rl": { "label": "Reinforcement Learning", "sample_keywords": ["reinforcement"] } }"#,
  )
  .unwrap();
  paperflow()
    .current_dir(dir.path())
    .args(["watch", "--dry-run", "--no-hf-papers"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("ZOTERO_USER_ID"));
}

#[test]
#[serial]
fn summarize_requires_a_model_key() {
  paperflow()
    .env("ZOTERO_USER_ID", "12345")
    .env("ZOTERO_API_KEY", "test-key")
    .args(["summarize", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("ARK_API_KEY"));
}

#[test]
#[serial]
fn summarize_rejects_an_unknown_locale() {
  paperflow()
    .args(["summarize", "--locale", "fr"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("locale"));
}

#[test]
#[serial]
fn sync_requires_notion_credentials() {
  paperflow()
    .env("ZOTERO_USER_ID", "12345")
    .env("ZOTERO_API_KEY", "test-key")
    .args(["sync", "--dry-run"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("NOTION_API_KEY"));
}
