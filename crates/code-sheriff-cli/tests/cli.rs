use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const LLM_VARS: &[&str] = &[
    "LLM_PROVIDER",
    "LLM_API_KEY",
    "LLM_API_URL",
    "LLM_MODEL",
    "LLM_TIMEOUT",
    "LLM_MAX_RETRIES",
    "MAX_CONCURRENT_REQUESTS",
    "MALICIOUS_THRESHOLD",
    "SUSPICIOUS_THRESHOLD",
    "MAX_FILE_SIZE",
    "SUPPORTED_EXTENSIONS",
];

/// Binary command with a scrubbed scanner environment.
fn sheriff() -> Command {
    let mut cmd = Command::cargo_bin("code-sheriff").unwrap();
    for var in LLM_VARS {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn project_fixture() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("app.py"), "print('hello')\n").unwrap();
    fs::write(temp.path().join("image.bin"), [0u8, 159, 146, 150]).unwrap();
    fs::create_dir_all(temp.path().join("lib")).unwrap();
    fs::write(temp.path().join("lib/util.js"), "module.exports = 1;\n").unwrap();
    temp
}

fn stdout_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout should be a JSON report")
}

#[test]
fn project_scan_with_noop_provider_prints_json() {
    let temp = project_fixture();
    let assert = sheriff()
        .args(["project", temp.path().to_str().unwrap(), "--provider", "noop"])
        .assert()
        .success();

    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["summary"]["total_files"], 2);
    assert_eq!(report["summary"]["clean_files"], 1);
    assert_eq!(report["summary"]["error_files"], 1);
    assert_eq!(
        report["error_files"][0]["error"],
        "Unsupported file extension: .bin"
    );
    assert!(report["malicious_files"].as_array().unwrap().is_empty());
}

#[test]
fn recursive_flag_descends_into_subdirectories() {
    let temp = project_fixture();
    let assert = sheriff()
        .args(["project", temp.path().to_str().unwrap(), "-r", "--provider", "noop"])
        .assert()
        .success();

    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["summary"]["total_files"], 3);
    assert_eq!(report["summary"]["clean_files"], 2);
}

#[test]
fn output_flag_writes_report_file() {
    let temp = project_fixture();
    let out = temp.path().join("report.json");
    sheriff()
        .args([
            "project",
            temp.path().join("app.py").to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--provider",
            "noop",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Results written to"))
        .stderr(predicate::str::contains("CLEAN"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report["summary"]["total_files"], 1);
    assert_eq!(report["summary"]["clean_files"], 1);
}

#[test]
fn human_format_prints_summary() {
    let temp = project_fixture();
    sheriff()
        .args([
            "project",
            temp.path().to_str().unwrap(),
            "--format",
            "human",
            "--provider",
            "noop",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scanned 2 file(s)"))
        .stdout(predicate::str::contains("Overall verdict: Clean"));
}

#[test]
fn config_file_selects_provider() {
    let temp = project_fixture();
    let config_dir = tempfile::tempdir().unwrap();
    let config = config_dir.path().join("sheriff.toml");
    fs::write(&config, "llm_provider = \"noop\"\nsupported_extensions = \".py,.bin\"\n").unwrap();
    let assert = sheriff()
        .args([
            "--config",
            config.to_str().unwrap(),
            "project",
            temp.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    let report = stdout_json(&assert.get_output().stdout);
    // image.bin is not UTF-8 text, so it still lands in the error bucket.
    assert_eq!(report["summary"]["error_files"], 1);
    assert_eq!(report["error_files"][0]["error"], "File is not valid UTF-8");
}

#[test]
fn missing_path_is_a_setup_error() {
    let temp = tempfile::tempdir().unwrap();
    sheriff()
        .args([
            "project",
            temp.path().join("nope").to_str().unwrap(),
            "--provider",
            "noop",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("path not found"));
}

#[test]
fn hosted_provider_without_key_fails_before_scanning() {
    let temp = project_fixture();
    sheriff()
        .args(["project", temp.path().to_str().unwrap(), "--provider", "openai"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("LLM_API_KEY"));
}

#[test]
fn unknown_provider_is_rejected() {
    let temp = project_fixture();
    sheriff()
        .args(["project", temp.path().to_str().unwrap(), "--provider", "oracle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown LLM provider"));
}

#[test]
fn gitlab_mode_rejects_non_repository() {
    let temp = tempfile::tempdir().unwrap();
    sheriff()
        .args([
            "gitlab",
            temp.path().to_str().unwrap(),
            "feature",
            "main",
            "--provider",
            "noop",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn git(repo: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["-c", "user.email=ci@example.com", "-c", "user.name=CI"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {args:?} failed: {output:?}");
}

#[test]
fn gitlab_mode_scans_changed_files() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let repo = temp.path();
    git(repo, &["init", "-q"]);
    fs::write(repo.join("base.py"), "print('base')\n").unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-q", "-m", "base"]);
    git(repo, &["branch", "target"]);
    git(repo, &["checkout", "-q", "-b", "feature"]);
    fs::write(repo.join("added.sh"), "echo hi\n").unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-q", "-m", "feature"]);

    let assert = sheriff()
        .args([
            "gitlab",
            repo.to_str().unwrap(),
            "feature",
            "target",
            "--provider",
            "noop",
        ])
        .assert()
        .success();
    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["summary"]["total_files"], 1);
    assert!(report["clean_files"][0]["file_path"]
        .as_str()
        .unwrap()
        .ends_with("added.sh"));

    let assert = sheriff()
        .args([
            "gitlab",
            repo.to_str().unwrap(),
            "target",
            "target",
            "--provider",
            "noop",
        ])
        .assert()
        .success();
    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["summary"]["total_files"], 0);
    assert_eq!(report["message"], "No files changed in this merge request");
}

#[test]
fn gitlab_mode_deletion_only_is_not_reported_as_unchanged() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let repo = temp.path();
    git(repo, &["init", "-q"]);
    fs::write(repo.join("old.py"), "print('old')\n").unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-q", "-m", "base"]);
    git(repo, &["branch", "target"]);
    git(repo, &["checkout", "-q", "-b", "feature"]);
    fs::remove_file(repo.join("old.py")).unwrap();
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-q", "-m", "drop"]);

    let assert = sheriff()
        .args([
            "gitlab",
            repo.to_str().unwrap(),
            "feature",
            "target",
            "--provider",
            "noop",
        ])
        .assert()
        .success();
    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["summary"]["total_files"], 0);
    assert!(report.get("message").is_none());
    assert!(report.get("incomplete").is_none());
}
