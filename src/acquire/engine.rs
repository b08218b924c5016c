//! 模块获取引擎
//!
//! 从远程源安装、从本地安装包安装、检查并执行升级。
//!
//! 安装按以下阶段推进，每个阶段都以 `stage` 字段记录日志：
//!
//! ```text
//! SEARCH -> DISAMBIGUATE -> FETCH -> EXTRACT -> NORMALIZE
//!        -> COLLISION-CHECK -> COMMIT -> CASCADE -> DONE
//! ```
//!
//! 升级在 DISAMBIGUATE 之后多一个 CONFIRM 阶段。DISAMBIGUATE、CONFIRM、
//! COLLISION-CHECK 都可能以 ABORT 结束。临时目录位于存储根目录内，
//! 无论成功与否都会在离开作用域时删除。

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::archive;
use super::decision::{CandidateView, OperatorDecision, UpgradePlanItem};
use crate::catalog::{CatalogKey, CatalogMerger, RegistrySnapshot};
use crate::module::metadata::{ModuleDescriptor, OptionalDependency};
use crate::module::{version, ModuleParser, ModuleRegistry, ModuleStore};
use crate::utils::{CoreError, Result};

/// 下载的安装包在临时目录中的文件名
const ARCHIVE_NAME: &str = "package.zip";

/// 解压目录名
const UNPACK_DIR: &str = "unpacked";

/// 获取流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStage {
    Search,
    Disambiguate,
    Confirm,
    Fetch,
    Extract,
    Normalize,
    CollisionCheck,
    Commit,
    Cascade,
    Done,
    Abort,
}

impl fmt::Display for AcquisitionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcquisitionStage::Search => "SEARCH",
            AcquisitionStage::Disambiguate => "DISAMBIGUATE",
            AcquisitionStage::Confirm => "CONFIRM",
            AcquisitionStage::Fetch => "FETCH",
            AcquisitionStage::Extract => "EXTRACT",
            AcquisitionStage::Normalize => "NORMALIZE",
            AcquisitionStage::CollisionCheck => "COLLISION-CHECK",
            AcquisitionStage::Commit => "COMMIT",
            AcquisitionStage::Cascade => "CASCADE",
            AcquisitionStage::Done => "DONE",
            AcquisitionStage::Abort => "ABORT",
        };
        f.write_str(s)
    }
}

/// 已写入存储的模块
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledPackage {
    pub package_key: String,
    pub name: String,
    pub version: String,
    /// 来源；本地安装包为 None
    pub source: Option<CatalogKey>,
    /// 是否替换了已有版本
    pub replaced: bool,
}

/// 一次安装请求的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallReport {
    /// 按提交顺序
    pub installed: Vec<InstalledPackage>,
    /// 仍未安装的必需依赖
    pub missing_dependencies: Vec<String>,
    /// 未满足的可选依赖，仅供提示
    pub optional_hints: Vec<OptionalDependency>,
}

/// 升级检查结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeReport {
    pub plan: Vec<UpgradePlanItem>,
    /// 已升级的包键；计划被拒绝时为空
    pub upgraded: Vec<String>,
}

/// 已解压、已规范命名、尚未提交的模块
struct Staged {
    scratch: TempDir,
    path: PathBuf,
    package_key: String,
    descriptor: ModuleDescriptor,
}

fn enter(stage: AcquisitionStage, target: &str) {
    debug!(stage = %stage, target = %target, "进入阶段");
}

/// 在源目录中按不区分大小写的子串匹配查找
pub fn search(snapshot: &RegistrySnapshot, query: &str) -> Vec<CatalogKey> {
    let needle = query.to_lowercase();
    snapshot
        .keys()
        .into_iter()
        .filter(|key| key.to_string().to_lowercase().contains(&needle))
        .collect()
}

fn candidate_views(snapshot: &RegistrySnapshot, keys: &[CatalogKey]) -> Vec<CandidateView> {
    keys.iter()
        .filter_map(|key| {
            snapshot
                .module(key)
                .map(|entry| CandidateView::new(key.clone(), entry))
        })
        .collect()
}

fn pick(answer: String, keys: &[CatalogKey]) -> Result<CatalogKey> {
    keys.iter()
        .find(|key| key.to_string() == answer)
        .cloned()
        .ok_or(CoreError::InvalidSelection(answer))
}

/// 模块获取引擎
pub struct AcquisitionEngine {
    store: ModuleStore,
    merger: CatalogMerger,
    decisions: Arc<dyn OperatorDecision>,
}

impl AcquisitionEngine {
    /// 创建引擎
    pub fn new(store: ModuleStore, merger: CatalogMerger, decisions: Arc<dyn OperatorDecision>) -> Self {
        Self {
            store,
            merger,
            decisions,
        }
    }

    /// 模块存储
    pub fn store(&self) -> &ModuleStore {
        &self.store
    }

    /// 源目录合并器
    pub fn merger(&self) -> &CatalogMerger {
        &self.merger
    }

    /// 从源目录安装模块
    ///
    /// 使用本地快照中的目录，不自动刷新。
    ///
    /// # Arguments
    ///
    /// * `query` - 匹配 `模块名@提供方` 的关键字
    ///
    /// # Errors
    ///
    /// - 没有匹配时返回 `NoMatch`
    /// - 选择不在候选中时返回 `InvalidSelection`
    /// - 下载失败时返回 `TransportFailure`
    /// - 安装包结构错误时返回 `MalformedPackage`
    /// - 拒绝覆盖时返回 `StoreCollision`
    ///
    /// 以上情况下存储保持原样。依赖的级联安装失败时，已提交的模块不会回滚，
    /// 返回 `CascadeFailed`，其中列出这些模块的包键。
    pub async fn install(&self, query: &str) -> Result<InstallReport> {
        self.store.ensure().await?;
        let snapshot = self.merger.snapshots().load().await?;

        let mut report = InstallReport::default();
        let mut visited = HashSet::new();
        if let Err(e) = self
            .install_from_catalog(&snapshot, query.to_string(), &mut visited, &mut report)
            .await
        {
            if report.installed.is_empty() {
                return Err(e);
            }
            let installed: Vec<String> = report
                .installed
                .into_iter()
                .map(|p| p.package_key)
                .collect();
            warn!(installed = ?installed, error = %e, "级联安装中断，已提交的模块保留在存储中");
            return Err(CoreError::CascadeFailed {
                installed,
                source: Box::new(e),
            });
        }

        enter(AcquisitionStage::Done, query);
        Ok(report)
    }

    fn install_from_catalog<'a>(
        &'a self,
        snapshot: &'a RegistrySnapshot,
        query: String,
        visited: &'a mut HashSet<String>,
        report: &'a mut InstallReport,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            enter(AcquisitionStage::Search, &query);
            let matches = search(snapshot, &query);
            if matches.is_empty() {
                return Err(CoreError::NoMatch(query));
            }

            enter(AcquisitionStage::Disambiguate, &query);
            let key = if matches.len() == 1 {
                matches[0].clone()
            } else {
                let views = candidate_views(snapshot, &matches);
                let answer = self.decisions.select_candidate(&query, &views)?;
                pick(answer, &matches).map_err(|e| {
                    enter(AcquisitionStage::Abort, &query);
                    e
                })?
            };
            info!(query = %query, catalog_key = %key, "已选择模块");

            let staged = self.fetch(snapshot, &key).await?;
            visited.insert(staged.package_key.clone());
            let replaced = self.place(&staged, true).await?;
            report.installed.push(InstalledPackage {
                package_key: staged.package_key.clone(),
                name: staged.descriptor.name.clone(),
                version: staged.descriptor.version.clone(),
                source: Some(key),
                replaced,
            });

            let descriptor = staged.descriptor;
            drop(staged.scratch);

            self.note_optional(&descriptor, report).await;

            enter(AcquisitionStage::Cascade, &descriptor.package_key);
            let missing = self.missing_dependencies(&descriptor).await;
            if missing.is_empty() {
                return Ok(());
            }

            if !self.decisions.confirm_cascade(&descriptor.package_key, &missing)? {
                info!(module_id = %descriptor.package_key, missing = ?missing, "未安装缺失的依赖");
                report.missing_dependencies.extend(missing);
                return Ok(());
            }

            for dependency in missing {
                if self.store.contains(&dependency).await || !visited.insert(dependency.clone()) {
                    continue;
                }
                let query = self.store.strip_prefix(&dependency).to_string();
                self.install_from_catalog(snapshot, query, visited, report).await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// 从本地安装包安装模块
    ///
    /// 不做级联安装，缺失的依赖记录在结果中。
    pub async fn install_archive(&self, path: &Path) -> Result<InstallReport> {
        tokio::fs::metadata(path).await?;
        self.store.ensure().await?;

        let scratch = self.store.scratch().await?;
        let staged = self.stage(scratch, path.to_path_buf()).await?;
        let replaced = self.place(&staged, true).await?;

        let mut report = InstallReport {
            installed: vec![InstalledPackage {
                package_key: staged.package_key.clone(),
                name: staged.descriptor.name.clone(),
                version: staged.descriptor.version.clone(),
                source: None,
                replaced,
            }],
            ..Default::default()
        };
        report.missing_dependencies = self.missing_dependencies(&staged.descriptor).await;
        self.note_optional(&staged.descriptor, &mut report).await;

        enter(AcquisitionStage::Done, &staged.package_key);
        Ok(report)
    }

    /// 刷新源目录并检查已启用模块的升级
    ///
    /// 候选的模块名须等于描述中的逻辑名或去掉前缀的包键。只有严格更高的版本
    /// 进入升级计划；整份计划只确认一次，确认后逐个替换，不再询问覆盖。
    pub async fn check_upgrade(&self) -> Result<UpgradeReport> {
        let snapshot = self.merger.refresh().await?;

        let registry = ModuleRegistry::new(self.store.clone());
        registry.scan().await?;

        let mut plan = Vec::new();
        for module in registry.enabled().await {
            let key = module.key().to_string();
            let bare = self.store.strip_prefix(&key).to_string();

            let matches: Vec<CatalogKey> = snapshot
                .keys()
                .into_iter()
                .filter(|k| k.module == module.descriptor.name || k.module == bare)
                .collect();
            if matches.is_empty() {
                debug!(module_id = %key, "源目录中没有该模块");
                continue;
            }

            enter(AcquisitionStage::Disambiguate, &key);
            let candidate = if matches.len() == 1 {
                matches[0].clone()
            } else {
                let views = candidate_views(&snapshot, &matches);
                pick(self.decisions.select_provider(&key, &views)?, &matches)?
            };

            let Some(entry) = snapshot.module(&candidate) else {
                continue;
            };
            match version::is_upgrade(module.version(), &entry.version) {
                Ok(true) => plan.push(UpgradePlanItem {
                    package_key: key,
                    name: module.descriptor.name.clone(),
                    installed_version: module.version().to_string(),
                    candidate,
                    candidate_version: entry.version.clone(),
                }),
                Ok(false) => debug!(module_id = %key, version = %module.version(), "已是最新版本"),
                Err(e) => warn!(module_id = %key, catalog_key = %candidate, error = %e, "无法比较版本，跳过"),
            }
        }

        let mut report = UpgradeReport {
            plan,
            upgraded: Vec::new(),
        };
        if report.plan.is_empty() {
            info!("没有可升级的模块");
            return Ok(report);
        }

        enter(AcquisitionStage::Confirm, "upgrade");
        if !self.decisions.confirm_upgrade(&report.plan)? {
            enter(AcquisitionStage::Abort, "upgrade");
            info!(count = report.plan.len(), "升级计划被拒绝");
            return Ok(report);
        }

        for item in &report.plan {
            let mut staged = self.fetch(&snapshot, &item.candidate).await?;
            // 升级替换的是已安装的包，提交时沿用其包键
            if staged.package_key != item.package_key {
                warn!(
                    module_id = %item.package_key,
                    archive_key = %staged.package_key,
                    "安装包目录名与已安装包键不一致，按已安装包键提交"
                );
                staged.package_key = item.package_key.clone();
                staged.descriptor.package_key = item.package_key.clone();
            }
            self.place(&staged, false).await?;
            info!(
                module_id = %item.package_key,
                from = %item.installed_version,
                to = %item.candidate_version,
                "模块已升级"
            );
            report.upgraded.push(item.package_key.clone());
        }

        enter(AcquisitionStage::Done, "upgrade");
        Ok(report)
    }

    /// 下载并暂存源目录中的模块
    async fn fetch(&self, snapshot: &RegistrySnapshot, key: &CatalogKey) -> Result<Staged> {
        let url = snapshot
            .download_url(key)
            .ok_or_else(|| CoreError::transport(key.to_string(), "源目录中缺少下载地址"))?;

        let scratch = self.store.scratch().await?;
        let archive = scratch.path().join(ARCHIVE_NAME);

        enter(AcquisitionStage::Fetch, &url);
        self.merger.transport().download(&url, &archive).await?;

        self.stage(scratch, archive).await
    }

    /// 解压并规范命名
    async fn stage(&self, scratch: TempDir, archive_path: PathBuf) -> Result<Staged> {
        let unpack = scratch.path().join(UNPACK_DIR);
        tokio::fs::create_dir(&unpack).await?;

        enter(AcquisitionStage::Extract, &archive_path.display().to_string());
        let top = archive::extract_async(archive_path, unpack.clone()).await?;

        enter(AcquisitionStage::Normalize, &top);
        let package_key = self.store.normalize_key(&top);
        if package_key != top {
            debug!(top = %top, module_id = %package_key, "补全包键前缀");
        }

        let path = unpack.join(&top);
        let mut descriptor = ModuleParser::parse_dir(&path)
            .await
            .map_err(|e| CoreError::MalformedPackage(format!("'{}' 的模块描述无效: {}", top, e)))?;
        descriptor.package_key = package_key.clone();

        Ok(Staged {
            scratch,
            path,
            package_key,
            descriptor,
        })
    }

    /// 冲突检查后提交
    ///
    /// # Returns
    ///
    /// 是否替换了已有版本
    async fn place(&self, staged: &Staged, ask_overwrite: bool) -> Result<bool> {
        let key = &staged.package_key;

        enter(AcquisitionStage::CollisionCheck, key);
        let exists = self.store.contains(key).await;
        if exists && ask_overwrite {
            if !self.decisions.confirm_overwrite(key)? {
                enter(AcquisitionStage::Abort, key);
                return Err(CoreError::StoreCollision(key.clone()));
            }
            self.store.set_enabled(key, true).await?;
        }

        enter(AcquisitionStage::Commit, key);
        self.store.commit(&staged.path, key, staged.scratch.path()).await?;
        info!(
            module_id = %key,
            name = %staged.descriptor.name,
            version = %staged.descriptor.version,
            replaced = exists,
            "模块已安装"
        );
        Ok(exists)
    }

    async fn missing_dependencies(&self, descriptor: &ModuleDescriptor) -> Vec<String> {
        let mut missing = Vec::new();
        for dependency in &descriptor.dependencies {
            if !self.store.contains(dependency).await {
                missing.push(dependency.clone());
            }
        }
        missing
    }

    async fn note_optional(&self, descriptor: &ModuleDescriptor, report: &mut InstallReport) {
        for optional in &descriptor.optional_dependencies {
            let mut satisfied = false;
            for key in optional.keys() {
                if self.store.contains(key).await {
                    satisfied = true;
                    break;
                }
            }
            if !satisfied {
                info!(module_id = %descriptor.package_key, optional = %optional, "可选依赖未安装");
                report.optional_hints.push(optional.clone());
            }
        }
    }
}
