use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `vip` isolated from the caller's environment, config and dotenv files.
fn vip(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vip").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("VIP_TOKEN")
        .env_remove("VIP_API_URL")
        .env_remove("VIP_APP")
        .env_remove("VIP_ENV")
        .env_remove("VIP_ENV_FILE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    vip(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("Follow SQL and media imports"));
}

#[test]
fn sql_status_requires_an_app() {
    let home = TempDir::new().unwrap();
    vip(&home)
        .args(["import", "sql", "status", "--env", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--app is required"));
}

#[test]
fn sql_status_requires_a_token() {
    let home = TempDir::new().unwrap();
    vip(&home)
        .args(["import", "sql", "status", "--app", "1", "--env", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API token found"));
}

#[test]
fn media_status_rejects_a_zero_interval() {
    let home = TempDir::new().unwrap();
    vip(&home)
        .args(["import", "media", "status", "--interval", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("positive number of seconds"));
}

#[test]
fn saved_defaults_supply_the_ids() {
    let home = TempDir::new().unwrap();
    let local = home.path().join(".vip");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::write(local.join("config.json"), r#"{"app": 5, "env": "6"}"#).unwrap();
    vip(&home)
        .args(["import", "sql", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API token found"));
}

#[test]
fn saved_ids_must_be_numeric() {
    let home = TempDir::new().unwrap();
    let global = home.path().join("config").join("vip");
    std::fs::create_dir_all(&global).unwrap();
    std::fs::write(global.join("config.json"), r#"{"app": "my-site", "env": 6}"#).unwrap();
    vip(&home)
        .args(["import", "media", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be a numeric id"));
}

#[test]
fn env_file_supplies_the_app_id() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".env"), "VIP_APP=5\nVIP_ENV=6\n").unwrap();
    vip(&home)
        .args(["import", "sql", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API token found"));
}
