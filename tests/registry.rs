// tests/registry.rs

use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::tempdir;

use cutover::context::DeployContext;
use cutover::errors::DeployError;
use cutover::registry::{ActiveDeployment, BuildRegistry, RegistryState, build_name, program_name};
use cutover::remote::LocalExecutor;
use cutover_test_utils::builders::test_context;
use cutover_test_utils::fake_executor::FakeExecutor;
use cutover_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const REGISTRY: &str = "/srv/ctx/build_info.json";

#[test]
fn build_and_program_names_are_formatted() {
    assert_eq!(build_name("ctx", 2, "abc"), "ctx_00002_abc");
    assert_eq!(build_name("ctx", 123456, "f00"), "ctx_123456_f00");
    assert_eq!(program_name("ctx_00002_abc", "web"), "ctx_00002_abc_web");
}

#[tokio::test]
async fn missing_file_loads_defaults() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("h1"));
    let registry = BuildRegistry::load(exec.clone(), &test_context("ctx")).await?;

    assert_eq!(registry.state(), &RegistryState::default());
    assert_eq!(registry.path(), REGISTRY);
    assert!(exec.puts().is_empty(), "loading must not write");
    Ok(())
}

#[tokio::test]
async fn malformed_file_is_fatal() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("h1"));
    exec.add_file(REGISTRY, "{ not json");

    let err = BuildRegistry::load(exec, &test_context("ctx"))
        .await
        .expect_err("malformed registry must fail");
    assert!(
        matches!(err, DeployError::RegistryCorrupt { ref path, .. } if path == REGISTRY),
        "unexpected error: {err:?}"
    );
    Ok(())
}

#[tokio::test]
async fn next_build_name_persists_before_returning() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("h1"));
    exec.add_file(REGISTRY, r#"{"number": 7, "last": "ctx_00006_aaa", "active": {}}"#);

    let mut registry = BuildRegistry::load(exec.clone(), &test_context("ctx")).await?;
    let name = registry.next_build_name("beef\n").await?;
    assert_eq!(name, "ctx_00008_beef");

    let saved: RegistryState = serde_json::from_str(&exec.file(REGISTRY).ok_or("registry not written")?)?;
    assert_eq!(saved.number, 8);
    assert_eq!(saved.last.as_deref(), Some("ctx_00006_aaa"), "last is untouched");
    assert!(!exec.has_file(&format!("{REGISTRY}.tmp")), "temp file renamed away");
    Ok(())
}

#[tokio::test]
async fn active_is_a_live_view_saved_on_demand() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("h1"));
    let mut registry = BuildRegistry::load(exec.clone(), &test_context("ctx")).await?;

    assert_eq!(*registry.active("web"), ActiveDeployment::default());
    registry.active("web").build = Some("ctx_00001_abc".to_string());
    registry.active("web").port = 9001;
    assert!(exec.file(REGISTRY).is_none(), "not persisted until save");

    registry.save().await?;
    let reloaded = BuildRegistry::load(exec.clone(), &test_context("ctx")).await?;
    assert_eq!(
        reloaded.active_of("web"),
        ActiveDeployment {
            build: Some("ctx_00001_abc".to_string()),
            port: 9001
        }
    );
    assert_eq!(reloaded.active_of("api"), ActiveDeployment::default());
    Ok(())
}

#[tokio::test]
async fn mark_last_good_survives_reload() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("h1"));
    let mut registry = BuildRegistry::load(exec.clone(), &test_context("ctx")).await?;
    registry.mark_last_good("ctx_00003_abc").await?;

    let reloaded = BuildRegistry::load(exec, &test_context("ctx")).await?;
    assert_eq!(reloaded.last(), Some("ctx_00003_abc"));
    assert_eq!(reloaded.number(), 0);
    Ok(())
}

#[tokio::test]
async fn registry_round_trips_on_disk_with_local_executor() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let ctx = DeployContext {
        deploy_root: dir.path().to_string_lossy().into_owned(),
        ..test_context("disk")
    };
    let exec = Arc::new(LocalExecutor::new());

    let mut registry = BuildRegistry::load(exec.clone(), &ctx).await?;
    let first = registry.next_build_name("abc").await?;
    registry.mark_last_good(&first).await?;

    let on_disk = std::fs::read_to_string(dir.path().join("disk").join("build_info.json"))?;
    let value: serde_json::Value = serde_json::from_str(&on_disk)?;
    assert_eq!(value["number"], 1);
    assert_eq!(value["last"], "disk_00001_abc");
    assert!(value["active"].as_object().is_some_and(|m| m.is_empty()));

    let reloaded = BuildRegistry::load(exec, &ctx).await?;
    assert_eq!(reloaded.last(), Some("disk_00001_abc"));
    Ok(())
}

proptest! {
    #[test]
    fn n_increments_raise_number_by_n_with_distinct_names(
        start in 0u64..100_000,
        commits in proptest::collection::vec("[0-9a-f]{7}", 1..20),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let exec = Arc::new(FakeExecutor::new("h1"));
            exec.add_file(REGISTRY, &format!(r#"{{"number": {start}, "last": null, "active": {{}}}}"#));

            let mut registry = BuildRegistry::load(exec.clone(), &test_context("ctx")).await.unwrap();
            let mut names = HashSet::new();
            for commit in &commits {
                names.insert(registry.next_build_name(commit).await.unwrap());
            }

            prop_assert_eq!(names.len(), commits.len());
            let reloaded = BuildRegistry::load(exec, &test_context("ctx")).await.unwrap();
            prop_assert_eq!(reloaded.number(), start + commits.len() as u64);
            Ok(())
        })?;
    }
}
