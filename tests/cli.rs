//! CLI integration tests: spawn the compiled `docq` binary and assert the
//! startup precondition behavior. Everything here fails fast before any
//! network or model work.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docq_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docq");
    path
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("docq.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

fn run_docq(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docq_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GEMINI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docq binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn missing_config_file_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("absent.toml");
    let (_, stderr, success) = run_docq(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn invalid_chunk_overlap_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(
        tmp.path(),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n",
    );
    let (_, stderr, success) = run_docq(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn missing_ssl_ca_is_fatal_at_startup() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(
        tmp.path(),
        r#"
[store]
backend = "mysql"

[database]
host = "gateway01.example.com"
user = "app.root"
database = "test"
ssl_ca = "/nonexistent/isrgrootx1.pem"
"#,
    );
    // The CA check fires before any connection attempt.
    let (_, stderr, success) = run_docq(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("SSL CA file not found"), "stderr: {}", stderr);
}

#[test]
fn ask_without_api_key_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "");
    let pdf_path = tmp.path().join("doc.pdf");
    fs::write(&pdf_path, b"%PDF-1.4\n%%EOF\n").unwrap();

    let (_, stderr, success) = run_docq(
        &config_path,
        &["ask", pdf_path.to_str().unwrap(), "refund window"],
    );
    assert!(!success);
    assert!(stderr.contains("GEMINI_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn init_on_memory_store_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "");
    let (stdout, stderr, success) = run_docq(&config_path, &["init"]);
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("no initialization"), "stdout: {}", stdout);
}

#[test]
fn unknown_backend_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "[pipeline]\nbackend = \"audio\"\n");
    let (_, stderr, success) = run_docq(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown pipeline backend"), "stderr: {}", stderr);
}
