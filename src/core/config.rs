//! 框架配置
//!
//! 定义模块存储、远程源、日志等配置结构和加载逻辑。

use crate::utils::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "sdk-frame.yaml";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 模块存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 模块存储根目录
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    /// 模块目录名前缀
    #[serde(default = "default_store_prefix")]
    pub prefix: String,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("modules")
}

fn default_store_prefix() -> String {
    "m_".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            prefix: default_store_prefix(),
        }
    }
}

/// 远程源目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// 本地注册表快照路径（module.json）
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// 请求远程源时使用的 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("module.json")
}

fn default_user_agent() -> String {
    "SDK Frame CLI".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            user_agent: default_user_agent(),
        }
    }
}

/// 源发布配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginMakerConfig {
    /// 发布描述文件路径（origin-maker-config.json）
    #[serde(default = "default_maker_config")]
    pub config_file: PathBuf,

    /// 发布输出目录
    #[serde(default = "default_release_dir")]
    pub release_dir: PathBuf,
}

fn default_maker_config() -> PathBuf {
    PathBuf::from("origin-maker-config.json")
}

fn default_release_dir() -> PathBuf {
    PathBuf::from("origin-release")
}

impl Default for OriginMakerConfig {
    fn default() -> Self {
        Self {
            config_file: default_maker_config(),
            release_dir: default_release_dir(),
        }
    }
}

/// 框架配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 模块存储配置
    #[serde(default)]
    pub store: StoreConfig,

    /// 远程源目录配置
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// 环境变量文件路径（env.json）
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// 源发布配置
    #[serde(default)]
    pub origin_maker: OriginMakerConfig,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_env_file() -> PathBuf {
    PathBuf::from("env.json")
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            logging: LogConfig::default(),
            store: StoreConfig::default(),
            catalog: CatalogConfig::default(),
            env_file: default_env_file(),
            origin_maker: OriginMakerConfig::default(),
            dev_mode: false,
        }
    }
}

impl CoreConfig {
    /// 创建配置构建器
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// 扩展名为 `.json` 时按 JSON 解析，否则按 YAML 解析。
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("读取 {} 失败: {}", path.display(), e))
        })?;

        let mut config: CoreConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        config.validate()?;
        Ok(config)
    }

    /// 加载配置文件，文件不存在时使用默认配置
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::from_file(path).await
        } else {
            tracing::debug!(path = %path.display(), "配置文件不存在，使用默认配置");
            Ok(Self::default())
        }
    }

    /// 校验配置值
    pub fn validate(&self) -> Result<()> {
        if self.store.prefix.is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "store.prefix".to_string(),
                reason: "前缀不能为空".to_string(),
            });
        }
        if self.store.prefix.starts_with('.') {
            return Err(CoreError::InvalidConfigValue {
                key: "store.prefix".to_string(),
                reason: "前缀不能以 '.' 开头".to_string(),
            });
        }
        if self.catalog.user_agent.trim().is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "catalog.user_agent".to_string(),
                reason: "User-Agent 不能为空".to_string(),
            });
        }
        Ok(())
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: CoreConfig) {
        // 只覆盖非默认值的配置
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.store.root != default_store_root() {
            self.store.root = other.store.root;
        }
        if other.store.prefix != default_store_prefix() {
            self.store.prefix = other.store.prefix;
        }
        if other.catalog.snapshot_path != default_snapshot_path() {
            self.catalog.snapshot_path = other.catalog.snapshot_path;
        }
        if other.catalog.user_agent != default_user_agent() {
            self.catalog.user_agent = other.catalog.user_agent;
        }
        if other.env_file != default_env_file() {
            self.env_file = other.env_file;
        }
        if other.dev_mode {
            self.dev_mode = true;
        }
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    /// 设置配置文件路径
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 设置模块存储根目录
    pub fn store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.store.root = root.into();
        self
    }

    /// 设置模块目录名前缀
    pub fn store_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.store.prefix = prefix.into();
        self
    }

    /// 设置注册表快照路径
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.catalog.snapshot_path = path.into();
        self
    }

    /// 设置 User-Agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.catalog.user_agent = agent.into();
        self
    }

    /// 设置环境变量文件路径
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.env_file = path.into();
        self
    }

    /// 设置源发布目录
    pub fn origin_release(
        mut self,
        config_file: impl Into<PathBuf>,
        release_dir: impl Into<PathBuf>,
    ) -> Self {
        self.config.origin_maker.config_file = config_file.into();
        self.config.origin_maker.release_dir = release_dir.into();
        self
    }

    /// 以一个工作目录为基准设置所有路径
    pub fn workspace(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.store_root(dir.join("modules"))
            .snapshot_path(dir.join("module.json"))
            .env_file(dir.join("env.json"))
            .origin_release(
                dir.join("origin-maker-config.json"),
                dir.join("origin-release"),
            )
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> CoreConfig {
        self.config
    }
}
