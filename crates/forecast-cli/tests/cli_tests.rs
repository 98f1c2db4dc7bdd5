//! CLI integration tests

use std::process::Command;

fn wxf(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "forecast-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = wxf(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("next-hour temperature forecaster"),
        "Should show app description"
    );
    for command in ["fetch", "engineer", "validate", "train", "evaluate", "collect", "predict", "inspect"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = wxf(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("wxf"), "Should show binary name");
}

/// Test train subcommand help
#[test]
fn test_train_help() {
    let output = wxf(&["train", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Train help should succeed");
    assert!(stdout.contains("--algorithm"), "Should show algorithm option");
    assert!(stdout.contains("--cv-folds"), "Should show cv-folds option");
    assert!(stdout.contains("--test-fraction"), "Should show test-fraction option");
}

/// Test that a missing artifact fails with a non-zero exit code
#[test]
fn test_inspect_missing_model_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let model = dir.path().join("absent.json");
    let output = wxf(&["inspect", "--model", model.to_str().unwrap()]);

    assert!(!output.status.success(), "Inspect should fail without an artifact");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.json"), "Should name the missing file");
}
