//! 模块元数据定义
//!
//! 定义模块描述文件 (module.yaml / module.json) 中的数据结构，
//! 以及模块在本地存储中的安装状态。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 可选依赖声明
///
/// 描述文件中可以写成单个包键，或者一组可互相替代的包键（满足其一即可）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionalDependency {
    /// 单个包键
    Single(String),
    /// 备选组
    AnyOf(Vec<String>),
}

impl OptionalDependency {
    /// 该声明涉及的所有包键
    pub fn keys(&self) -> Vec<&str> {
        match self {
            OptionalDependency::Single(key) => vec![key.as_str()],
            OptionalDependency::AnyOf(keys) => keys.iter().map(String::as_str).collect(),
        }
    }

    /// 是否被给定的判定函数满足
    pub fn is_satisfied_by(&self, mut present: impl FnMut(&str) -> bool) -> bool {
        self.keys().into_iter().any(|k| present(k))
    }
}

impl fmt::Display for OptionalDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionalDependency::Single(key) => f.write_str(key),
            OptionalDependency::AnyOf(keys) => write!(f, "[{}]", keys.join(" | ")),
        }
    }
}

/// 模块描述
///
/// 对应模块目录中的 module.yaml（或 module.json），解析后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 逻辑名，组合命名空间中的注册名
    pub name: String,

    /// 存储键（模块目录名），由扫描时的目录名决定
    #[serde(skip)]
    pub package_key: String,

    /// 点分数字版本号
    pub version: String,

    /// 作者
    #[serde(default)]
    pub author: String,

    /// 描述
    #[serde(default)]
    pub description: String,

    /// 必需依赖（包键列表，有序去重）
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 可选依赖，只用于提示，不参与加载排序
    #[serde(default, alias = "optionalDependencies")]
    pub optional_dependencies: Vec<OptionalDependency>,
}

impl ModuleDescriptor {
    /// 创建新的模块描述
    pub fn new(
        package_key: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            package_key: package_key.into(),
            version: version.into(),
            author: String::new(),
            description: String::new(),
            dependencies: vec![],
            optional_dependencies: vec![],
        }
    }

    /// 添加必需依赖
    pub fn with_dependency(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.dependencies.contains(&key) {
            self.dependencies.push(key);
        }
        self
    }

    /// 添加可选依赖
    pub fn with_optional(mut self, dep: OptionalDependency) -> Self {
        self.optional_dependencies.push(dep);
        self
    }

    /// 设置作者
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// 已安装模块
///
/// 描述加上存储状态。启用标志由 `ModuleStore` 读写。
#[derive(Debug, Clone)]
pub struct InstalledModule {
    /// 模块描述
    pub descriptor: ModuleDescriptor,

    /// 是否启用
    pub enabled: bool,

    /// 模块目录
    pub path: PathBuf,
}

impl InstalledModule {
    /// 存储键
    pub fn key(&self) -> &str {
        &self.descriptor.package_key
    }

    /// 逻辑名
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// 版本号
    pub fn version(&self) -> &str {
        &self.descriptor.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder_dedups_dependencies() {
        let descriptor = ModuleDescriptor::new("m_web", "web", "1.0")
            .with_dependency("m_http")
            .with_dependency("m_http")
            .with_dependency("m_log");

        assert_eq!(descriptor.dependencies, vec!["m_http", "m_log"]);
    }

    #[test]
    fn test_optional_dependency_untagged() {
        let yaml = "name: web\nversion: '1.0'\noptionalDependencies:\n  - m_cache\n  - [m_redis, m_memcache]\n";
        let descriptor: ModuleDescriptor = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            descriptor.optional_dependencies,
            vec![
                OptionalDependency::Single("m_cache".to_string()),
                OptionalDependency::AnyOf(vec!["m_redis".to_string(), "m_memcache".to_string()]),
            ]
        );
        assert!(descriptor.package_key.is_empty());
    }

    #[test]
    fn test_optional_dependency_satisfied() {
        let group = OptionalDependency::AnyOf(vec!["m_a".to_string(), "m_b".to_string()]);
        assert!(group.is_satisfied_by(|k| k == "m_b"));
        assert!(!group.is_satisfied_by(|k| k == "m_c"));
        assert_eq!(group.to_string(), "[m_a | m_b]");
    }

    #[test]
    fn test_descriptor_json_round_trip_skips_package_key() {
        let descriptor = ModuleDescriptor::new("m_web", "web", "1.0").with_author("alice");
        let json = serde_json::to_value(&descriptor).unwrap();
        assert!(json.get("package_key").is_none());
        assert_eq!(json["author"], "alice");
    }
}
