//! Command tests against file targets in a temporary directory.

use std::path::{Path, PathBuf};

use idsync_cli::commands::apply::{self, ApplyArgs};
use idsync_cli::commands::plan::{self, PlanArgs};
use idsync_cli::commands::validate::{self, ValidateArgs};
use idsync_cli::commands::Workspace;
use idsync_cli::error::CliError;
use serde_json::{json, Value};
use tempfile::TempDir;

const CONFIG: &str = r#"
source:
  path: desired.json
targets:
  - name: staging
    kind: file
    path: staging.json
    sync:
      identity_key: id
      mapping: {id: userId, email: mail}
      group_field: groups
  - name: archive
    kind: file
    path: nested/archive.json
    sync:
      identity_key: id
      mapping: {id: uid, email: email}
"#;

fn setup(desired: Value) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("idsync.yaml");
    std::fs::write(&config, CONFIG).unwrap();
    std::fs::write(dir.path().join("desired.json"), desired.to_string()).unwrap();
    (dir, config)
}

fn read(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn apply_args(target: Option<&str>) -> ApplyArgs {
    ApplyArgs {
        target: target.map(str::to_string),
        yes: true,
        verbose: false,
        json: true,
    }
}

fn desired() -> Value {
    json!([
        {"id": "u1", "email": "a@x.io", "groups": ["admins"]},
        {"id": "u2", "email": "b@x.io", "groups": []}
    ])
}

#[tokio::test]
async fn test_apply_writes_every_target() {
    let (dir, config) = setup(desired());

    apply::execute(apply_args(None), &config).await.unwrap();

    let staging = read(&dir.path().join("staging.json"));
    assert_eq!(staging["users"][0], json!({"userId": "u1", "mail": "a@x.io"}));
    assert_eq!(staging["memberships"]["u1"], json!(["admins"]));

    let archive = read(&dir.path().join("nested/archive.json"));
    assert_eq!(archive["users"][1], json!({"uid": "u2", "email": "b@x.io"}));
    assert_eq!(archive["memberships"]["u2"], json!([]));
}

#[tokio::test]
async fn test_apply_single_target() {
    let (dir, config) = setup(desired());

    apply::execute(apply_args(Some("archive")), &config)
        .await
        .unwrap();

    assert!(!dir.path().join("staging.json").exists());
    assert!(dir.path().join("nested/archive.json").exists());
}

#[tokio::test]
async fn test_plan_after_apply() {
    let (_dir, config) = setup(desired());
    apply::execute(apply_args(None), &config).await.unwrap();

    plan::execute(
        PlanArgs {
            target: None,
            verbose: true,
            json: false,
        },
        &config,
    )
    .await
    .unwrap();

    let workspace = Workspace::load(&config).unwrap();
    for target in &workspace.config.targets {
        let orchestrator = idsync_cli::commands::orchestrator(target).unwrap();
        let plan = orchestrator
            .plan(&workspace.desired_for(target))
            .await
            .unwrap();
        assert!(plan.is_noop(), "{} still has changes", target.name);
    }
}

#[tokio::test]
async fn test_unknown_target() {
    let (_dir, config) = setup(desired());

    let err = apply::execute(apply_args(Some("prod")), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, CliError::Validation(_)));
}

#[tokio::test]
async fn test_corrupt_target_store_fails_that_target() {
    let (dir, config) = setup(desired());
    std::fs::write(dir.path().join("staging.json"), "{broken").unwrap();

    let err = apply::execute(apply_args(None), &config).await.unwrap_err();

    match err {
        CliError::TargetsFailed { failed, total, .. } => {
            assert_eq!((failed, total), (1, 2));
        }
        other => panic!("Expected TargetsFailed, got {other:?}"),
    }
    // The other target is still synced.
    assert!(dir.path().join("nested/archive.json").exists());
}

#[tokio::test]
async fn test_validate_reports_bad_records() {
    let (_dir, config) = setup(json!([
        {"id": "u1", "email": "a@x.io", "groups": []},
        {"email": "missing-id@x.io", "groups": []}
    ]));

    let err = validate::execute(ValidateArgs { check_targets: false }, &config)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_validate_checks_targets() {
    let (_dir, config) = setup(desired());

    validate::execute(ValidateArgs { check_targets: true }, &config)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_config() {
    let dir = TempDir::new().unwrap();

    let err = validate::execute(
        ValidateArgs {
            check_targets: false,
        },
        &dir.path().join("absent.yaml"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CliError::Config(_)));
}

#[tokio::test]
async fn test_invalid_source_population() {
    let (_dir, config) = setup(json!([{"id": "u1", "email": {"nested": true}}]));

    let err = Workspace::load(&config).err().unwrap();

    assert!(matches!(err, CliError::Validation(_)));
}
