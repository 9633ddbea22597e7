use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn signum_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("signum");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let course_dir = root.join("frontend/src/courses/data-structures");
    fs::create_dir_all(&course_dir).unwrap();
    fs::write(
        course_dir.join("Stacks.jsx"),
        r#"<ModuleLayout courseId="data-structures" moduleId="stacks">
  <h1>Stacks</h1>
  <p>A stack is a last in, first out collection. Push adds to the top and pop removes from it.</p>
</ModuleLayout>"#,
    )
    .unwrap();
    fs::write(
        course_dir.join("queues.md"),
        "# Queues\n\nA queue is first in, first out.\n",
    )
    .unwrap();
    fs::write(root.join("README.md"), "# Signum\n\nLearning platform overview.\n").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[rag]
persist_dir = "{root}/data/rag_storage"

[index]
repo_root = "{root}"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("signum.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_signum(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = signum_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run signum binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_index_dry_run_counts_files() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_signum(&config_path, &["index", "--dry-run"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("files found: 3"));
    assert!(stdout.contains("estimated chunks: 3"));
    assert!(!tmp.path().join("data/rag_storage").exists());
}

#[test]
fn test_scope_keyword_admits_without_index() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_signum(&config_path, &["scope", "what is a quiz"]);
    assert!(success, "scope failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("admitted: true"));
    assert!(stdout.contains("reason: keyword_match"));
}

#[test]
fn test_scope_fails_closed_without_index() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_signum(&config_path, &["scope", "recommend a good movie"]);
    assert!(success);
    assert!(stdout.contains("admitted: false"));
    assert!(stdout.contains("reason: no_index_or_results"));
}

#[test]
fn test_retrieve_without_index_is_empty() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_signum(&config_path, &["retrieve", "what is a stack"]);
    assert!(success);
    assert!(stdout.contains("No course material found."));
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[rag]\ntop_k = 0\n").unwrap();

    let (_, stderr, success) = run_signum(&config_path, &["scope", "quiz"]);
    assert!(!success);
    assert!(stderr.contains("top_k"));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("absent.toml");

    let (stdout, stderr, success) = run_signum(&config_path, &["scope", "show my progress"]);
    assert!(success, "stderr={}", stderr);
    assert!(stdout.contains("admitted: true"));
}
