// CLI integration tests
// These run the compiled binary against an empty home directory

use std::process::{Command, Stdio};

const CLI_BINARY: &str = env!("CARGO_BIN_EXE_ecobee");

fn cli(home: &tempfile::TempDir) -> Command {
    let mut command = Command::new(CLI_BINARY);
    command
        .env("HOME", home.path())
        .env("ECOBEE_CONFIG", home.path().join("ecobee.yml"))
        .env_remove("ECOBEE_API_KEY")
        .env_remove("ECOBEE_API_URL")
        .stdin(Stdio::null());
    command
}

#[tokio::test]
async fn test_cli_help_command() {
    let output = Command::new(CLI_BINARY)
        .arg("--help")
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("A CLI for controlling ecobee thermostats"));
    for command in [
        "login",
        "authorize",
        "logout",
        "thermostats",
        "sensors",
        "mode",
        "hold",
        "climate",
        "resume",
        "watch",
    ] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[tokio::test]
async fn test_cli_version_command() {
    let output = Command::new(CLI_BINARY)
        .arg("--version")
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ecobee"));
}

#[tokio::test]
async fn test_cli_invalid_command() {
    let output = Command::new(CLI_BINARY)
        .arg("invalid-command")
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:") || stderr.contains("unrecognized"));
}

#[tokio::test]
async fn test_cli_thermostats_without_api_key() {
    let home = tempfile::tempdir().unwrap();
    let output = cli(&home)
        .arg("thermostats")
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("API key"));
}

#[tokio::test]
async fn test_cli_thermostats_before_login() {
    let home = tempfile::tempdir().unwrap();
    let output = cli(&home)
        .args(["--api-key", "test-key", "thermostats"])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Authorization required"));
}

#[tokio::test]
async fn test_cli_rejects_unknown_mode() {
    let home = tempfile::tempdir().unwrap();
    let output = cli(&home)
        .args(["--api-key", "test-key", "mode", "turbo"])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("turbo"));
}

#[tokio::test]
async fn test_cli_hold_command_help() {
    let output = Command::new(CLI_BINARY)
        .args(["hold", "--help"])
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--cool"));
    assert!(stdout.contains("--heat"));
    assert!(stdout.contains("--indefinite"));
    assert!(stdout.contains("--thermostat"));
}

#[tokio::test]
async fn test_cli_logout_command() {
    // Works whether or not anything is stored
    let home = tempfile::tempdir().unwrap();
    let output = cli(&home)
        .arg("logout")
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Logged out"));
}

#[tokio::test]
async fn test_cli_recovers_from_unreadable_credentials_file() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("ecobee.yml"), "api_key: [unterminated").unwrap();

    let output = cli(&home)
        .args(["--api-key", "test-key", "thermostats"])
        .output()
        .expect("Failed to execute CLI");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Authorization required"));

    let output = cli(&home)
        .arg("logout")
        .output()
        .expect("Failed to execute CLI");
    assert!(output.status.success());
    assert!(!home.path().join("ecobee.yml").exists());
}
