//! 模块获取集成测试
//!
//! 使用内存传输提供目录文档和 zip 安装包，使用预设决策回答提示。

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sdk_frame::catalog::{CatalogMerger, SnapshotStore, Transport};
use sdk_frame::{
    AcquisitionEngine, CatalogModule, CoreError, ModuleStore, OriginDocument, Result,
    ScriptedDecisions,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ============================================================================
// 测试辅助
// ============================================================================

const ORIGIN: &str = "https://main.example/map.json";
const MIRROR: &str = "https://mirror.example/map.json";

/// 内存传输：URL -> 目录文档 / 安装包字节
#[derive(Default)]
struct MemoryTransport {
    catalogs: HashMap<String, OriginDocument>,
    blobs: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch_catalog(&self, url: &str) -> Result<OriginDocument> {
        self.catalogs
            .get(url)
            .cloned()
            .ok_or_else(|| CoreError::transport(url, "404 Not Found"))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let bytes = self
            .blobs
            .get(url)
            .ok_or_else(|| CoreError::transport(url, "404 Not Found"))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }
}

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn entry(version: &str, deps: &[&str], path: &str) -> CatalogModule {
    CatalogModule {
        version: version.to_string(),
        author: "alice".to_string(),
        description: String::new(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        optional_dependencies: vec![],
        path: path.to_string(),
    }
}

fn descriptor(name: &str, version: &str, deps: &[&str]) -> String {
    format!(
        "name: {}\nversion: '{}'\ndependencies: [{}]\n",
        name,
        version,
        deps.join(", ")
    )
}

/// main 源：http 1.0（依赖 m_log）、log 0.1（包内目录名不带前缀）
fn main_origin(transport: &mut MemoryTransport) {
    let mut modules = std::collections::BTreeMap::new();
    modules.insert("http".to_string(), entry("1.0", &["m_log"], "/m_http.zip"));
    modules.insert("log".to_string(), entry("0.1", &[], "/log.zip"));
    transport.catalogs.insert(
        ORIGIN.to_string(),
        OriginDocument {
            name: "main".to_string(),
            base: "https://main.example".to_string(),
            modules,
        },
    );
    transport.blobs.insert(
        "https://main.example/m_http.zip".to_string(),
        zip_bytes(&[
            ("m_http/module.yaml", &descriptor("http", "1.0", &["m_log"])),
            ("m_http/src/main.txt", "http v1.0"),
        ]),
    );
    transport.blobs.insert(
        "https://main.example/log.zip".to_string(),
        zip_bytes(&[("log/module.yaml", &descriptor("log", "0.1", &[]))]),
    );
}

/// mirror 源：http 1.1，无依赖
fn mirror_origin(transport: &mut MemoryTransport) {
    let mut modules = std::collections::BTreeMap::new();
    modules.insert("http".to_string(), entry("1.1", &[], "/m_http.zip"));
    transport.catalogs.insert(
        MIRROR.to_string(),
        OriginDocument {
            name: "mirror".to_string(),
            base: "https://mirror.example".to_string(),
            modules,
        },
    );
    transport.blobs.insert(
        "https://mirror.example/m_http.zip".to_string(),
        zip_bytes(&[("m_http/module.yaml", &descriptor("http", "1.1", &[]))]),
    );
}

struct Fixture {
    dir: TempDir,
    root: PathBuf,
    store: ModuleStore,
    decisions: Arc<ScriptedDecisions>,
    engine: AcquisitionEngine,
}

async fn fixture(transport: MemoryTransport, origins: &[&str], decisions: ScriptedDecisions) -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("modules");
    let store = ModuleStore::new(&root, "m_");
    let snapshots = SnapshotStore::new(dir.path().join("module.json"));
    for origin in origins {
        snapshots.add_origin(origin).await.unwrap();
    }

    let merger = CatalogMerger::new(Arc::new(transport), snapshots);
    merger.refresh().await.unwrap();

    let decisions = Arc::new(decisions);
    let engine = AcquisitionEngine::new(store.clone(), merger, decisions.clone());
    Fixture {
        dir,
        root,
        store,
        decisions,
        engine,
    }
}

async fn install_existing(store: &ModuleStore, key: &str, yaml: &str) {
    let dir = store.module_path(key);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("module.yaml"), yaml).await.unwrap();
}

/// 存储根目录下的全部条目名（包括隐藏项）
fn root_entries(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// 安装
// ============================================================================

#[tokio::test]
async fn test_install_with_cascade() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new().confirm(true)).await;

    let report = f.engine.install("http").await.unwrap();

    let keys: Vec<&str> = report.installed.iter().map(|p| p.package_key.as_str()).collect();
    assert_eq!(keys, vec!["m_http", "m_log"]);
    assert!(report.missing_dependencies.is_empty());
    assert_eq!(f.decisions.prompts(), vec!["cascade:m_http"]);

    assert_eq!(f.store.list_keys().await.unwrap(), vec!["m_http", "m_log"]);
    assert_eq!(root_entries(&f.root), vec!["m_http", "m_log"]);
    assert_eq!(
        std::fs::read_to_string(f.store.module_path("m_http").join("src/main.txt")).unwrap(),
        "http v1.0"
    );
}

#[tokio::test]
async fn test_cascade_declined_reports_missing() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new().confirm(false)).await;

    let report = f.engine.install("http@main").await.unwrap();

    assert_eq!(report.installed.len(), 1);
    assert_eq!(report.missing_dependencies, vec!["m_log"]);
    assert_eq!(f.store.list_keys().await.unwrap(), vec!["m_http"]);
}

#[tokio::test]
async fn test_top_level_name_is_prefixed() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new()).await;

    let report = f.engine.install("log").await.unwrap();

    assert_eq!(report.installed[0].package_key, "m_log");
    assert!(f.store.contains("m_log").await);
    assert!(!f.store.root().join("log").exists());
}

#[tokio::test]
async fn test_no_match() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new()).await;

    assert!(matches!(
        f.engine.install("database").await,
        Err(CoreError::NoMatch(ref q)) if q == "database"
    ));
    assert!(f.store.list_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ambiguous_query_uses_selection() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    mirror_origin(&mut transport);
    let f = fixture(
        transport,
        &[ORIGIN, MIRROR],
        ScriptedDecisions::new().select("http@mirror"),
    )
    .await;

    let report = f.engine.install("HTTP").await.unwrap();

    assert_eq!(report.installed[0].version, "1.1");
    assert_eq!(
        report.installed[0].source.as_ref().map(|k| k.to_string()).as_deref(),
        Some("http@mirror")
    );
    assert_eq!(f.decisions.prompts(), vec!["select:HTTP"]);
}

#[tokio::test]
async fn test_invalid_selection_aborts() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    mirror_origin(&mut transport);
    let f = fixture(
        transport,
        &[ORIGIN, MIRROR],
        ScriptedDecisions::new().select("http@elsewhere"),
    )
    .await;

    assert!(matches!(
        f.engine.install("http").await,
        Err(CoreError::InvalidSelection(_))
    ));
    assert!(f.store.list_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_package_leaves_store_unchanged() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    transport.blobs.insert(
        "https://main.example/log.zip".to_string(),
        zip_bytes(&[
            ("log/module.yaml", &descriptor("log", "0.1", &[])),
            ("extra/readme.txt", "oops"),
        ]),
    );
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new()).await;
    install_existing(&f.store, "m_keep", &descriptor("keep", "1.0", &[])).await;

    let err = f.engine.install("log").await.unwrap_err();

    assert!(matches!(err, CoreError::MalformedPackage(_)));
    assert_eq!(root_entries(&f.root), vec!["m_keep"]);
}

#[tokio::test]
async fn test_transport_failure_leaves_store_unchanged() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    transport.blobs.remove("https://main.example/log.zip");
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new()).await;

    let err = f.engine.install("log").await.unwrap_err();

    assert!(matches!(err, CoreError::TransportFailure { .. }));
    assert!(root_entries(&f.root).is_empty());
}

/// 依赖下载失败时，已提交的上层模块保留，错误中列出其包键
#[tokio::test]
async fn test_cascade_failure_reports_committed_packages() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    transport.blobs.remove("https://main.example/log.zip");
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new().confirm(true)).await;

    let err = f.engine.install("http").await.unwrap_err();

    match err {
        CoreError::CascadeFailed { installed, source } => {
            assert_eq!(installed, vec!["m_http"]);
            assert!(matches!(*source, CoreError::TransportFailure { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(f.decisions.prompts(), vec!["cascade:m_http"]);
    assert_eq!(root_entries(&f.root), vec!["m_http"]);
}

// ============================================================================
// 覆盖已安装模块
// ============================================================================

#[tokio::test]
async fn test_declined_overwrite_is_byte_identical() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new().confirm(false)).await;

    let old_yaml = descriptor("http", "0.5", &[]);
    install_existing(&f.store, "m_http", &old_yaml).await;
    tokio::fs::write(f.store.module_path("m_http").join("data.bin"), [0u8, 1, 2])
        .await
        .unwrap();
    f.store.set_enabled("m_http", false).await.unwrap();
    let state_before = tokio::fs::read(f.store.module_path("m_http").join(".module-state.json"))
        .await
        .unwrap();

    let err = f.engine.install("http").await.unwrap_err();

    assert!(matches!(err, CoreError::StoreCollision(ref key) if key == "m_http"));
    assert_eq!(f.decisions.prompts(), vec!["overwrite:m_http"]);

    let dir = f.store.module_path("m_http");
    assert_eq!(std::fs::read_to_string(dir.join("module.yaml")).unwrap(), old_yaml);
    assert_eq!(std::fs::read(dir.join("data.bin")).unwrap(), vec![0u8, 1, 2]);
    assert_eq!(std::fs::read(dir.join(".module-state.json")).unwrap(), state_before);
    assert!(!f.store.is_enabled("m_http").await.unwrap());
    assert_eq!(root_entries(&f.root), vec!["m_http"]);
}

#[tokio::test]
async fn test_accepted_overwrite_replaces_and_enables() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(
        transport,
        &[ORIGIN],
        ScriptedDecisions::new().confirm(true).confirm(false),
    )
    .await;

    install_existing(&f.store, "m_http", &descriptor("http", "0.5", &[])).await;
    tokio::fs::write(f.store.module_path("m_http").join("stale.txt"), "old")
        .await
        .unwrap();
    f.store.set_enabled("m_http", false).await.unwrap();

    let report = f.engine.install("http@main").await.unwrap();

    assert!(report.installed[0].replaced);
    assert_eq!(f.decisions.prompts(), vec!["overwrite:m_http", "cascade:m_http"]);

    let dir = f.store.module_path("m_http");
    assert!(!dir.join("stale.txt").exists());
    assert!(dir.join("src/main.txt").exists());
    assert!(f.store.is_enabled("m_http").await.unwrap());
    assert_eq!(root_entries(&f.root), vec!["m_http"]);
}

// ============================================================================
// 本地安装包
// ============================================================================

#[tokio::test]
async fn test_install_archive_reports_dependencies() {
    let f = fixture(MemoryTransport::default(), &[], ScriptedDecisions::new()).await;

    let archive = f.dir.path().join("web.zip");
    std::fs::write(
        &archive,
        zip_bytes(&[("web/module.yaml", &descriptor("web", "2.0", &["m_http"]))]),
    )
    .unwrap();

    let report = f.engine.install_archive(&archive).await.unwrap();

    assert_eq!(report.installed[0].package_key, "m_web");
    assert!(report.installed[0].source.is_none());
    assert_eq!(report.missing_dependencies, vec!["m_http"]);
    assert!(f.decisions.prompts().is_empty());
    assert_eq!(f.store.list_keys().await.unwrap(), vec!["m_web"]);
}

#[tokio::test]
async fn test_install_archive_missing_file() {
    let f = fixture(MemoryTransport::default(), &[], ScriptedDecisions::new()).await;
    let missing = f.dir.path().join("absent.zip");
    assert!(matches!(
        f.engine.install_archive(&missing).await,
        Err(CoreError::Io(_))
    ));
}

// ============================================================================
// 升级
// ============================================================================

#[tokio::test]
async fn test_check_upgrade_applies_plan() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new().confirm(true)).await;

    install_existing(&f.store, "m_http", &descriptor("http", "0.9", &["m_log"])).await;
    install_existing(&f.store, "m_log", &descriptor("log", "0.1", &[])).await;

    let report = f.engine.check_upgrade().await.unwrap();

    assert_eq!(report.plan.len(), 1);
    assert_eq!(report.plan[0].package_key, "m_http");
    assert_eq!(report.plan[0].installed_version, "0.9");
    assert_eq!(report.plan[0].candidate_version, "1.0");
    assert_eq!(report.upgraded, vec!["m_http"]);
    assert_eq!(f.decisions.prompts(), vec!["upgrade:1"]);

    let yaml = std::fs::read_to_string(f.store.module_path("m_http").join("module.yaml")).unwrap();
    assert!(yaml.contains("1.0"));
}

#[tokio::test]
async fn test_check_upgrade_declined() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new().confirm(false)).await;

    let old_yaml = descriptor("http", "0.9", &[]);
    install_existing(&f.store, "m_http", &old_yaml).await;

    let report = f.engine.check_upgrade().await.unwrap();

    assert_eq!(report.plan.len(), 1);
    assert!(report.upgraded.is_empty());
    assert_eq!(
        std::fs::read_to_string(f.store.module_path("m_http").join("module.yaml")).unwrap(),
        old_yaml
    );
}

#[tokio::test]
async fn test_check_upgrade_selects_provider() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    mirror_origin(&mut transport);
    let f = fixture(
        transport,
        &[ORIGIN, MIRROR],
        ScriptedDecisions::new().select("http@mirror").confirm(true),
    )
    .await;

    install_existing(&f.store, "m_http", &descriptor("http", "1.0", &[])).await;

    let report = f.engine.check_upgrade().await.unwrap();

    assert_eq!(f.decisions.prompts(), vec!["provider:m_http", "upgrade:1"]);
    assert_eq!(report.plan[0].candidate_version, "1.1");
    assert_eq!(report.upgraded, vec!["m_http"]);
}

#[tokio::test]
async fn test_check_upgrade_skips_disabled_and_current() {
    let mut transport = MemoryTransport::default();
    main_origin(&mut transport);
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new()).await;

    install_existing(&f.store, "m_http", &descriptor("http", "0.9", &[])).await;
    f.store.set_enabled("m_http", false).await.unwrap();
    install_existing(&f.store, "m_log", &descriptor("log", "0.1.0", &[])).await;

    let report = f.engine.check_upgrade().await.unwrap();

    assert!(report.plan.is_empty());
    assert!(f.decisions.prompts().is_empty());
}

/// 新版本安装包的目录名与已安装包键不同：仍替换原有包，不产生第二个模块
#[tokio::test]
async fn test_check_upgrade_keeps_installed_key_for_renamed_archive() {
    let mut transport = MemoryTransport::default();
    let mut modules = std::collections::BTreeMap::new();
    modules.insert("http".to_string(), entry("2.0", &[], "/httpx.zip"));
    transport.catalogs.insert(
        ORIGIN.to_string(),
        OriginDocument {
            name: "main".to_string(),
            base: "https://main.example".to_string(),
            modules,
        },
    );
    transport.blobs.insert(
        "https://main.example/httpx.zip".to_string(),
        zip_bytes(&[
            ("httpx/module.yaml", &descriptor("http", "2.0", &[])),
            ("httpx/src/main.txt", "http v2.0"),
        ]),
    );
    let f = fixture(transport, &[ORIGIN], ScriptedDecisions::new().confirm(true)).await;

    install_existing(&f.store, "m_http", &descriptor("http", "1.0", &[])).await;

    let report = f.engine.check_upgrade().await.unwrap();

    assert_eq!(report.plan.len(), 1);
    assert_eq!(report.upgraded, vec!["m_http"]);
    assert_eq!(root_entries(&f.root), vec!["m_http"]);
    assert!(!f.store.module_path("m_httpx").exists());

    let dir = f.store.module_path("m_http");
    assert!(std::fs::read_to_string(dir.join("module.yaml")).unwrap().contains("2.0"));
    assert_eq!(std::fs::read_to_string(dir.join("src/main.txt")).unwrap(), "http v2.0");
}
