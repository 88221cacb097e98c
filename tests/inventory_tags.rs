// tests/inventory_tags.rs

use std::error::Error;
use std::sync::Arc;

use tempfile::tempdir;

use cutover::commands::Deployment;
use cutover::context::DeployContext;
use cutover::errors::DeployError;
use cutover::fs::{MockFileSystem, RealFileSystem};
use cutover::inventory::{InstanceDirectory, StaticDirectory};
use cutover::tools::ToolRegistry;
use cutover_test_utils::builders::{ConfigFileBuilder, activation_spec};
use cutover_test_utils::fake_executor::{FakeConnector, FakeExecutor};
use cutover_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const TAGS: &str = "/ops/.cutover/tags.json";

fn hosts() -> Vec<cutover::inventory::Host> {
    ConfigFileBuilder::new("shop")
        .with_role("web", "deploy")
        .with_role("worker", "deploy")
        .with_host("web-1", "web")
        .with_host("worker-1", "worker")
        .with_host("web-2", "web")
        .build()
        .hosts
}

#[test]
fn hosts_are_listed_by_role_in_declaration_order() -> TestResult {
    let dir = StaticDirectory::new(hosts(), TAGS, Arc::new(MockFileSystem::new()));

    let web: Vec<_> = dir.hosts_in_role("web").into_iter().map(|h| h.name).collect();
    assert_eq!(web, ["web-1", "web-2"]);
    assert_eq!(dir.first_host_in_role("worker")?.name, "worker-1");
    assert!(dir.hosts_in_role("db").is_empty());
    Ok(())
}

#[test]
fn empty_role_has_no_first_host() {
    let dir = StaticDirectory::new(hosts(), TAGS, Arc::new(MockFileSystem::new()));

    let err = dir.first_host_in_role("db").expect_err("no db hosts");
    assert!(matches!(err, DeployError::NoHostInRole(ref role) if role == "db"));
}

#[test]
fn tags_accumulate_per_host() -> TestResult {
    let fs = MockFileSystem::new();
    let dir = StaticDirectory::new(hosts(), TAGS, Arc::new(fs.clone()));
    let web1 = dir.first_host_in_role("web")?;
    let worker = dir.first_host_in_role("worker")?;

    assert!(dir.tags(&web1)?.is_empty(), "no tag file yet");

    dir.tag(&web1, "last_good_build", "shop_00001_abc")?;
    dir.tag(&web1, "active_build", "shop_00001_abc")?;
    dir.tag(&worker, "last_good_build", "shop_00001_abc")?;
    dir.tag(&web1, "active_build", "shop_00002_def")?;

    let tags = dir.tags(&web1)?;
    assert_eq!(tags.len(), 2);
    assert_eq!(tags["last_good_build"], "shop_00001_abc");
    assert_eq!(tags["active_build"], "shop_00002_def");
    assert_eq!(dir.tags(&worker)?.len(), 1);

    let raw: serde_json::Value = serde_json::from_str(&fs.contents(TAGS).ok_or("tag file")?)?;
    assert_eq!(raw["worker-1"]["last_good_build"], "shop_00001_abc");
    Ok(())
}

#[test]
fn untag_drops_the_key_and_empty_hosts() -> TestResult {
    let fs = MockFileSystem::new();
    let dir = StaticDirectory::new(hosts(), TAGS, Arc::new(fs.clone()));
    let web1 = dir.first_host_in_role("web")?;
    let worker = dir.first_host_in_role("worker")?;

    dir.untag(&web1, "active_build")?;
    assert!(fs.contents(TAGS).is_none(), "nothing to remove, nothing written");

    dir.tag(&web1, "last_good_build", "shop_00001_abc")?;
    dir.tag(&web1, "active_build", "shop_00001_abc")?;
    dir.tag(&worker, "active_build", "shop_00001_abc")?;

    dir.untag(&web1, "active_build")?;
    assert!(!dir.tags(&web1)?.contains_key("active_build"));
    assert_eq!(dir.tags(&web1)?.len(), 1);

    dir.untag(&worker, "active_build")?;
    let raw: serde_json::Value = serde_json::from_str(&fs.contents(TAGS).ok_or("tag file")?)?;
    assert!(raw.get("worker-1").is_none(), "hosts without tags are dropped");
    Ok(())
}

#[tokio::test]
async fn deactivation_removes_the_active_tag() -> TestResult {
    init_tracing();
    let cfg = ConfigFileBuilder::new("shop")
        .with_role("web", "deploy")
        .with_host("web-1", "web")
        .with_activation("web", activation_spec("web"))
        .build();
    let ctx = DeployContext::from_section(&cfg.context);
    let tools = ToolRegistry::from_config(&cfg.tools);
    let dir = StaticDirectory::new(cfg.hosts.clone(), TAGS, Arc::new(MockFileSystem::new()));
    let connector = FakeConnector::new();
    let deployment = Deployment {
        config: &cfg,
        ctx: &ctx,
        directory: &dir,
        connector: &connector,
        tools: &tools,
    };

    let host = dir.first_host_in_role("web")?;
    dir.tag(&host, "last_good_build", "shop_00001_abc")?;
    dir.tag(&host, "active_build", "shop_00001_abc")?;
    let exec = Arc::new(FakeExecutor::new("web-1"));
    exec.add_file(
        "/srv/shop/build_info.json",
        r#"{"number": 1, "last": "shop_00001_abc", "active": {"web": {"build": "shop_00001_abc", "port": 9001}}}"#,
    );

    let previous = deployment.deactivate(&host, cfg.role("web")?, exec).await?;

    assert_eq!(previous.as_deref(), Some("shop_00001_abc"));
    let tags = dir.tags(&host)?;
    assert!(!tags.contains_key("active_build"), "tags: {tags:?}");
    assert_eq!(tags["last_good_build"], "shop_00001_abc");
    Ok(())
}

#[test]
fn corrupt_tag_file_is_an_error() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file(TAGS, "not json");
    let dir = StaticDirectory::new(hosts(), TAGS, Arc::new(fs));

    let host = dir.first_host_in_role("web")?;
    assert!(dir.tags(&host).is_err());
    assert!(dir.tag(&host, "active_build", "x").is_err());
    Ok(())
}

#[test]
fn tags_persist_on_disk() -> TestResult {
    let tmp = tempdir()?;
    let path = tmp.path().join(".cutover/tags.json");
    let dir = StaticDirectory::new(hosts(), &path, Arc::new(RealFileSystem));
    let host = dir.first_host_in_role("web")?;

    dir.tag(&host, "last_good_build", "shop_00003_f00")?;

    let reopened = StaticDirectory::new(hosts(), &path, Arc::new(RealFileSystem));
    assert_eq!(reopened.tags(&host)?["last_good_build"], "shop_00003_f00");
    assert!(path.exists());
    Ok(())
}
