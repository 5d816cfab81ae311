//! Runs the `harmony` binary against temporary config files

use harmony_core::auth::{ClaimsVerifier, Hs256Verifier};
use harmony_core::clock::SystemClock;
use harmony_core::config::{Config, StoreBackend};
use harmony_core::Harmony;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

fn harmony(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_harmony"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run harmony")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn sqlite_config(dir: &Path) -> (Config, String) {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.database_path = dir.join("harmony.db");
    config.auth.token_secret = "cli-test-secret-0123456789".into();
    let path = dir.join("harmony.toml");
    config.save_to_file(&path).unwrap();
    (config, path.display().to_string())
}

#[test]
fn test_config_init_then_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harmony.toml");
    let path = path.to_str().unwrap();

    let output = harmony(&["config", "init", path]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(Config::from_file(path).unwrap(), Config::default());

    // Refuses to clobber without --force
    assert!(!harmony(&["config", "init", path]).status.success());
    assert!(harmony(&["config", "init", path, "--force"]).status.success());

    let output = harmony(&["config", "check", path]);
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("is valid"));
}

#[test]
fn test_config_check_rejects_bad_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[store]\npool_size = 0\n").unwrap();

    let output = harmony(&["config", "check", path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_token_mirrors_memberships() {
    let dir = tempfile::tempdir().unwrap();
    let (config, config_path) = sqlite_config(dir.path());

    let (alice, community) = {
        let harmony = Harmony::from_config(config.clone()).unwrap();
        let alice = harmony.identity.register("alice", "alice@example.com").await.unwrap();
        let community = harmony
            .registry
            .create_community("Test", &alice.handle, None)
            .await
            .unwrap();
        (alice, community)
    };

    let handle = alice.handle.to_string();
    let output = harmony(&["token", "--config", &config_path, "--account", &handle, "--ttl", "10m"]);
    assert!(output.status.success(), "{:?}", output);

    let verifier = Hs256Verifier::new(config.auth.token_secret.as_bytes().to_vec(), Arc::new(SystemClock));
    let claims = verifier.verify(&stdout(&output)).unwrap();
    assert_eq!(claims.subject, handle);
    assert_eq!(claims.role_in(&community.handle), Some(harmony_core::Role::Owner));
    assert_eq!(claims.exp - claims.iat, 600);
}

#[test]
fn test_token_for_unknown_account_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, config_path) = sqlite_config(dir.path());

    let output = harmony(&["token", "--config", &config_path, "--account", "ghost:0001"]);
    assert!(!output.status.success());

    let output = harmony(&["token", "--config", &config_path, "--account", "not a handle"]);
    assert!(!output.status.success());
}

#[test]
fn test_reconcile_with_empty_journal() {
    let dir = tempfile::tempdir().unwrap();
    let (_, config_path) = sqlite_config(dir.path());

    let output = harmony(&["reconcile", "--config", &config_path]);
    assert!(output.status.success(), "{:?}", output);
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["examined"], 0);
    assert_eq!(report["remaining"], 0);
}
