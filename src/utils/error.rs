//! 错误类型定义
//!
//! 本模块定义了模块注册表中使用的所有错误类型。

use thiserror::Error;

/// 核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 依赖解析与加载错误 ====================

    /// 依赖模块未安装或未启用
    #[error("模块 '{module}' 的依赖 '{dependency}' 未安装或未启用")]
    UnresolvedDependency {
        module: String,
        dependency: String,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {}", .cycle.join(" -> "))]
    CycleDetected {
        cycle: Vec<String>,
    },

    /// 模块缺少入口点
    #[error("模块 '{0}' 没有可用的入口点 (Main)")]
    MissingEntryPoint(String),

    /// 模块逻辑名重复
    #[error("模块 '{package}' 的名称 '{name}' 已被占用")]
    DuplicateModuleName {
        name: String,
        package: String,
    },

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 无效的模块元数据
    #[error("无效的模块元数据: {0}")]
    InvalidMetadata(String),

    /// 版本号格式错误
    #[error("无效的版本号: '{0}'")]
    MalformedVersion(String),

    // ==================== 获取与安装错误 ====================

    /// 源目录中没有匹配的模块
    #[error("没有匹配 '{0}' 的模块")]
    NoMatch(String),

    /// 选择无效
    #[error("无效的选择: '{0}'")]
    InvalidSelection(String),

    /// 安装包格式错误
    #[error("安装包格式错误: {0}")]
    MalformedPackage(String),

    /// 网络传输失败
    #[error("获取 '{url}' 失败: {reason}")]
    TransportFailure {
        url: String,
        reason: String,
    },

    /// 安装冲突且用户拒绝覆盖
    #[error("模块 '{0}' 已安装，已放弃覆盖")]
    StoreCollision(String),

    /// 级联安装中途失败，`installed` 中的模块已经提交到存储
    #[error("级联安装中断（已安装: {}）: {}", .installed.join(", "), .source)]
    CascadeFailed {
        installed: Vec<String>,
        source: Box<CoreError>,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 压缩包读写错误
    #[error("压缩包错误: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),
}

/// 操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_FOUND: &str = "MODULE-001";
    pub const MODULE_UNRESOLVED_DEPENDENCY: &str = "MODULE-002";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-003";
    pub const MODULE_MISSING_ENTRY: &str = "MODULE-004";
    pub const MODULE_DUPLICATE_NAME: &str = "MODULE-005";
    pub const MODULE_INVALID_METADATA: &str = "MODULE-006";
    pub const MODULE_MALFORMED_VERSION: &str = "MODULE-007";

    // 源目录错误 (CATALOG-xxx)
    pub const CATALOG_NO_MATCH: &str = "CATALOG-001";
    pub const CATALOG_INVALID_SELECTION: &str = "CATALOG-002";
    pub const CATALOG_TRANSPORT_FAILURE: &str = "CATALOG-003";

    // 安装错误 (ACQUIRE-xxx)
    pub const ACQUIRE_MALFORMED_PACKAGE: &str = "ACQUIRE-001";
    pub const ACQUIRE_STORE_COLLISION: &str = "ACQUIRE-002";
    pub const ACQUIRE_CASCADE_FAILED: &str = "ACQUIRE-003";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::UnresolvedDependency { .. } => error_code::MODULE_UNRESOLVED_DEPENDENCY,
            CoreError::CycleDetected { .. } => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::MissingEntryPoint(_) => error_code::MODULE_MISSING_ENTRY,
            CoreError::DuplicateModuleName { .. } => error_code::MODULE_DUPLICATE_NAME,
            CoreError::InvalidMetadata(_) => error_code::MODULE_INVALID_METADATA,
            CoreError::MalformedVersion(_) => error_code::MODULE_MALFORMED_VERSION,
            CoreError::NoMatch(_) => error_code::CATALOG_NO_MATCH,
            CoreError::InvalidSelection(_) => error_code::CATALOG_INVALID_SELECTION,
            CoreError::TransportFailure { .. } => error_code::CATALOG_TRANSPORT_FAILURE,
            CoreError::MalformedPackage(_) => error_code::ACQUIRE_MALFORMED_PACKAGE,
            CoreError::StoreCollision(_) => error_code::ACQUIRE_STORE_COLLISION,
            CoreError::CascadeFailed { .. } => error_code::ACQUIRE_CASCADE_FAILED,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            _ => "UNKNOWN",
        }
    }

    /// 是否为用户主动放弃导致的错误
    pub fn is_abort(&self) -> bool {
        match self {
            CoreError::InvalidSelection(_) | CoreError::StoreCollision(_) => true,
            CoreError::CascadeFailed { source, .. } => source.is_abort(),
            _ => false,
        }
    }

    /// 构造传输错误
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        CoreError::TransportFailure {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
