//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Run saltyvault, feeding `stdin` (passphrase line first) to the process
fn run_saltyvault(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_saltyvault"))
        .arg("--passphrase-stdin")
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn saltyvault");

    {
        let child_stdin = child.stdin.as_mut().expect("failed to open stdin");
        // Ignore BrokenPipe errors - the command may exit before reading stdin
        // if it encounters an error (e.g., file not found)
        let _ = child_stdin.write_all(stdin.as_bytes());
    }

    child.wait_with_output().expect("failed to wait for saltyvault")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{what} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init(container: &Path, passphrase: &str) {
    let output = run_saltyvault(&["init", path_str(container)], &format!("{passphrase}\n"));
    assert_success(&output, "init");
}

fn ls(container: &Path, passphrase: &str) -> Vec<String> {
    let output = run_saltyvault(&["ls", path_str(container)], &format!("{passphrase}\n"));
    assert_success(&output, "ls");
    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Extracts the working tree path the mount command reports.
fn reported_mount_path(stdout: &str) -> PathBuf {
    let line = stdout
        .lines()
        .find_map(|line| line.strip_prefix("Container mounted at: "))
        .expect("mount path not reported");
    PathBuf::from(line)
}

#[test]
fn test_init_and_list_empty() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");

    init(&container, "pw");
    assert!(container.exists());
    assert!(ls(&container, "pw").is_empty());
}

#[test]
fn test_init_refuses_existing() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");
    init(&container, "pw");
    let before = fs::read(&container).unwrap();

    let output = run_saltyvault(&["init", path_str(&container)], "other\n");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
    assert_eq!(fs::read(&container).unwrap(), before);
}

#[test]
fn test_add_and_list() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");
    let file = temp_dir.path().join("notes.txt");
    fs::write(&file, "hello").unwrap();
    init(&container, "pw");

    let output = run_saltyvault(&["add", path_str(&container), path_str(&file)], "pw\n");
    assert_success(&output, "add");
    assert!(String::from_utf8_lossy(&output.stdout).contains("File added to container: notes.txt"));

    let output = run_saltyvault(
        &[
            "add",
            path_str(&container),
            path_str(&file),
            "--target",
            "docs/copy.txt",
        ],
        "pw\n",
    );
    assert_success(&output, "add --target");

    assert_eq!(ls(&container, "pw"), vec!["docs/copy.txt", "notes.txt"]);
}

#[test]
fn test_add_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");
    init(&container, "pw");
    let before = fs::read(&container).unwrap();

    let missing = temp_dir.path().join("missing.txt");
    let output = run_saltyvault(&["add", path_str(&container), path_str(&missing)], "pw\n");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("file not found"));
    assert_eq!(fs::read(&container).unwrap(), before);
}

#[test]
fn test_missing_container_fails() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("nonexistent.vault");

    for command in ["mount", "ls"] {
        let output = run_saltyvault(&[command, path_str(&container)], "pw\n");
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("container not found"));
    }
}

#[test]
fn test_wrong_passphrase_fails() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");
    init(&container, "correct");

    let output = run_saltyvault(&["mount", path_str(&container)], "wrong\nexit\n");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("wrong passphrase or corrupt container"),
        "unexpected error: {stderr}"
    );
}

#[test]
fn test_mount_exit_discards_and_cleans_up() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");
    let file = temp_dir.path().join("notes.txt");
    fs::write(&file, "hello").unwrap();
    init(&container, "pw");
    assert_success(
        &run_saltyvault(&["add", path_str(&container), path_str(&file)], "pw\n"),
        "add",
    );
    let before = fs::read(&container).unwrap();

    let output = run_saltyvault(&["mount", path_str(&container)], "pw\nls\nexit\n");
    assert_success(&output, "mount");

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("  notes.txt"));
    assert!(stdout.contains("Exiting without saving changes"));
    assert!(!reported_mount_path(&stdout).exists());
    assert_eq!(fs::read(&container).unwrap(), before);
}

#[test]
fn test_mount_eof_discards() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");
    init(&container, "pw");
    let before = fs::read(&container).unwrap();

    let output = run_saltyvault(&["mount", path_str(&container)], "pw\n");
    assert_success(&output, "mount");

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("(empty)"));
    assert!(!reported_mount_path(&stdout).exists());
    assert_eq!(fs::read(&container).unwrap(), before);
}

#[test]
fn test_mount_save_keeps_contents() {
    let temp_dir = TempDir::new().unwrap();
    let container = temp_dir.path().join("c.vault");
    let file = temp_dir.path().join("notes.txt");
    fs::write(&file, "hello").unwrap();
    init(&container, "pw");
    assert_success(
        &run_saltyvault(&["add", path_str(&container), path_str(&file)], "pw\n"),
        "add",
    );

    let output = run_saltyvault(&["mount", path_str(&container)], "pw\nsave\n");
    assert_success(&output, "mount");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Changes saved to container"));
    assert!(!reported_mount_path(&stdout).exists());

    assert_eq!(ls(&container, "pw"), vec!["notes.txt"]);
}
