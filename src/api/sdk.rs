//! SdkFrame
//!
//! 框架的主要对外接口，把配置、模块存储、环境变量、模块管理器
//! 和获取引擎组装在一起：
//!
//! - 启动：扫描存储、解析依赖、按序加载到组合命名空间
//! - 远程源：维护源列表、刷新目录
//! - 获取：安装、升级、从本地安装包安装
//! - 发布：把本地模块打包成远程源
//!
//! # 示例
//!
//! ```rust,no_run
//! use sdk_frame::{CoreConfig, EntryPoints, SdkFrame};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::builder()
//!         .store_root("modules")
//!         .log_level("info")
//!         .build();
//!
//!     let mut frame = SdkFrame::new(config, EntryPoints::new())?;
//!     let namespace = frame.start().await?;
//!     println!("loaded: {:?}", namespace.names());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::acquire::{AcquisitionEngine, OperatorDecision, OriginMaker};
use crate::catalog::{CatalogMerger, HttpTransport, RegistrySnapshot, SnapshotStore, Transport};
use crate::core::config::CoreConfig;
use crate::core::env::EnvStore;
use crate::module::{CompositionNamespace, EntryPoints, ModuleManager, ModuleStore};
use crate::utils::{CoreError, Result};

/// 框架状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// 已创建，模块尚未加载
    Initialized,
    /// 模块已加载
    Running,
}

/// 框架主结构体
///
/// # 组件
///
/// - `store`: 本地模块存储
/// - `env`: env.json 环境变量
/// - `snapshots`: module.json 源列表与目录快照
/// - `manager`: 模块管理器（扫描、解析、加载、启用/禁用）
/// - `transport`: 远程源传输
pub struct SdkFrame {
    config: CoreConfig,
    store: ModuleStore,
    env: EnvStore,
    snapshots: SnapshotStore,
    manager: ModuleManager,
    transport: Arc<dyn Transport>,
    state: FrameState,
    started_at: Option<Instant>,
}

impl SdkFrame {
    /// 创建框架实例，使用 HTTP 传输
    ///
    /// # Errors
    ///
    /// 配置无效或 HTTP 客户端无法创建时返回错误
    pub fn new(config: CoreConfig, entry_points: EntryPoints) -> Result<Self> {
        let transport = HttpTransport::new(&config.catalog.user_agent)?;
        Self::with_transport(config, entry_points, Arc::new(transport))
    }

    /// 创建框架实例，使用指定的传输
    pub fn with_transport(
        config: CoreConfig,
        entry_points: EntryPoints,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        info!("初始化 SDK Frame v{}", crate::VERSION);

        let store = ModuleStore::from_config(&config.store);
        let env = EnvStore::new(config.env_file.clone());
        let snapshots = SnapshotStore::new(config.catalog.snapshot_path.clone());
        let manager = ModuleManager::new(store.clone(), entry_points);
        debug!(
            store = %store.root().display(),
            snapshot = %snapshots.path().display(),
            "组件初始化完成"
        );

        Ok(Self {
            config,
            store,
            env,
            snapshots,
            manager,
            transport,
            state: FrameState::Initialized,
            started_at: None,
        })
    }

    /// 启动：读取环境变量并加载所有已启用模块
    ///
    /// # Returns
    ///
    /// 装载完成的组合命名空间
    ///
    /// # Errors
    ///
    /// 依赖无法解析、存在循环、缺少入口点或名称冲突时返回对应错误，
    /// 此时框架保持未启动状态。
    pub async fn start(&mut self) -> Result<CompositionNamespace> {
        if self.state == FrameState::Running {
            return Err(CoreError::InitFailed("框架已启动".to_string()));
        }

        let env = self.env.load().await?;
        let mut namespace = CompositionNamespace::with_env(env);
        let order = self.manager.initialize(&mut namespace).await?;

        self.state = FrameState::Running;
        self.started_at = Some(Instant::now());
        info!(modules = order.len(), "SDK Frame 已启动");
        Ok(namespace)
    }

    /// 当前状态
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// 启动以来的时长
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// 配置
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// 模块存储
    pub fn store(&self) -> &ModuleStore {
        &self.store
    }

    /// 环境变量存储
    pub fn env(&self) -> &EnvStore {
        &self.env
    }

    /// 源快照存储
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// 模块管理器
    pub fn manager(&self) -> &ModuleManager {
        &self.manager
    }

    /// 源目录合并器
    pub fn merger(&self) -> CatalogMerger {
        CatalogMerger::new(self.transport.clone(), self.snapshots.clone())
    }

    /// 刷新源目录
    pub async fn refresh_catalog(&self) -> Result<RegistrySnapshot> {
        self.merger().refresh().await
    }

    /// 创建获取引擎
    ///
    /// # Arguments
    ///
    /// * `decisions` - 安装过程中的人工决策来源
    pub fn engine(&self, decisions: Arc<dyn OperatorDecision>) -> AcquisitionEngine {
        AcquisitionEngine::new(self.store.clone(), self.merger(), decisions)
    }

    /// 创建源发布器
    pub fn origin_maker(&self) -> OriginMaker {
        OriginMaker::new(self.store.clone(), self.config.origin_maker.clone())
    }
}
