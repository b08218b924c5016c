//! 远程源目录数据结构

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::module::metadata::OptionalDependency;
use crate::utils::CoreError;

/// 源目录中的一个模块条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogModule {
    /// 版本号
    pub version: String,

    /// 作者
    #[serde(default)]
    pub author: String,

    /// 描述
    #[serde(default)]
    pub description: String,

    /// 必需依赖（包键）
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 可选依赖
    #[serde(default, alias = "optionalDependencies")]
    pub optional_dependencies: Vec<OptionalDependency>,

    /// 下载路径，拼接在提供方 base 之后
    pub path: String,
}

/// 远程源发布的目录文档（map.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginDocument {
    /// 提供方名称
    pub name: String,

    /// 下载基础地址
    pub base: String,

    /// 模块名 -> 条目
    pub modules: BTreeMap<String, CatalogModule>,
}

/// 合并后的源目录键：`模块名@提供方`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogKey {
    /// 模块名
    pub module: String,
    /// 提供方名称
    pub provider: String,
}

impl CatalogKey {
    /// 创建键
    pub fn new(module: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            provider: provider.into(),
        }
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.module, self.provider)
    }
}

impl FromStr for CatalogKey {
    type Err = CoreError;

    /// 按最后一个 `@` 拆分
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('@') {
            Some((module, provider)) if !module.is_empty() && !provider.is_empty() => {
                Ok(Self::new(module, provider))
            }
            _ => Err(CoreError::InvalidSelection(s.to_string())),
        }
    }
}

/// 本地注册表快照（module.json）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// 远程源地址，有序去重
    #[serde(default)]
    pub origins: Vec<String>,

    /// 提供方名称 -> 下载基础地址
    #[serde(default)]
    pub providers: BTreeMap<String, String>,

    /// `模块名@提供方` -> 条目
    #[serde(default)]
    pub modules: BTreeMap<String, CatalogModule>,
}

impl RegistrySnapshot {
    /// 查找条目
    pub fn module(&self, key: &CatalogKey) -> Option<&CatalogModule> {
        self.modules.get(&key.to_string())
    }

    /// 条目的完整下载地址
    pub fn download_url(&self, key: &CatalogKey) -> Option<String> {
        let base = self.providers.get(&key.provider)?;
        let module = self.module(key)?;
        Some(format!("{}{}", base, module.path))
    }

    /// 所有键（已解析）
    pub fn keys(&self) -> Vec<CatalogKey> {
        self.modules
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_key_parse() {
        let key: CatalogKey = "http@main".parse().unwrap();
        assert_eq!(key, CatalogKey::new("http", "main"));
        assert_eq!(key.to_string(), "http@main");

        assert!("http".parse::<CatalogKey>().is_err());
        assert!("@main".parse::<CatalogKey>().is_err());
        assert!("http@".parse::<CatalogKey>().is_err());
    }

    #[test]
    fn test_origin_document_parse() {
        let doc: OriginDocument = serde_json::from_str(
            r#"{
                "name": "main",
                "base": "https://example.com/mods",
                "modules": {
                    "http": {"version": "1.0", "path": "/m_http.zip", "optionalDependencies": [["m_a", "m_b"]]}
                }
            }"#,
        )
        .unwrap();

        let http = &doc.modules["http"];
        assert_eq!(http.version, "1.0");
        assert!(http.dependencies.is_empty());
        assert_eq!(http.optional_dependencies.len(), 1);
    }

    #[test]
    fn test_snapshot_defaults_and_download_url() {
        let mut snapshot: RegistrySnapshot = serde_json::from_str(r#"{"origins": []}"#).unwrap();
        assert!(snapshot.modules.is_empty());

        snapshot
            .providers
            .insert("main".to_string(), "https://example.com".to_string());
        snapshot.modules.insert(
            "http@main".to_string(),
            CatalogModule {
                version: "1.0".to_string(),
                author: String::new(),
                description: String::new(),
                dependencies: vec![],
                optional_dependencies: vec![],
                path: "/m_http.zip".to_string(),
            },
        );

        let key = CatalogKey::new("http", "main");
        assert_eq!(
            snapshot.download_url(&key).as_deref(),
            Some("https://example.com/m_http.zip")
        );
        assert_eq!(snapshot.keys(), vec![key]);
    }
}
