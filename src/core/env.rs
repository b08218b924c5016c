//! 环境变量存储
//!
//! `env.json` 中保存的键值对，值带类型（字符串、整数、浮点、布尔、JSON）。
//! 加载后的快照挂在组合命名空间上供模块读取。

use crate::utils::{CoreError, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 环境变量快照
pub type EnvMap = Map<String, Value>;

/// 环境变量值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvValueType {
    /// 字符串（默认）
    Str,
    /// 整数
    Int,
    /// 浮点数
    Float,
    /// 布尔值，只有 `true` 解析为真
    Bool,
    /// 任意 JSON
    Json,
}

impl EnvValueType {
    /// 解析类型名
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "str" => Some(Self::Str),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 把原始字符串转换成对应类型的 JSON 值
    pub fn convert(self, key: &str, raw: &str) -> Result<Value> {
        let invalid = |reason: String| CoreError::InvalidConfigValue {
            key: key.to_string(),
            reason,
        };

        Ok(match self {
            Self::Str => Value::String(raw.to_string()),
            Self::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| invalid(format!("'{}' 不是整数: {}", raw, e)))?,
            Self::Float => {
                let f = raw
                    .parse::<f64>()
                    .map_err(|e| invalid(format!("'{}' 不是浮点数: {}", raw, e)))?;
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(format!("'{}' 不是有限浮点数", raw)))?
            }
            Self::Bool => Value::Bool(raw == "true"),
            Self::Json => serde_json::from_str(raw)
                .map_err(|e| invalid(format!("JSON 解析失败: {}", e)))?,
        })
    }
}

/// 解析 `key=[type:]value` 形式的赋值表达式
///
/// # Returns
///
/// 键和转换后的值
pub fn parse_assignment(expr: &str) -> Result<(String, Value)> {
    let (key, rest) = expr
        .split_once('=')
        .ok_or_else(|| CoreError::InvalidConfigValue {
            key: expr.to_string(),
            reason: "格式应为 key=[type:]value".to_string(),
        })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(CoreError::InvalidConfigValue {
            key: expr.to_string(),
            reason: "键不能为空".to_string(),
        });
    }

    let (value_type, raw) = match rest.split_once(':') {
        Some((type_name, raw)) => {
            let value_type =
                EnvValueType::parse(type_name).ok_or_else(|| CoreError::InvalidConfigValue {
                    key: key.to_string(),
                    reason: format!("无效的类型 '{}'", type_name),
                })?;
            (value_type, raw)
        }
        None => (EnvValueType::Str, rest),
    };

    Ok((key.to_string(), value_type.convert(key, raw)?))
}

/// `env.json` 持久化存储
#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
}

impl EnvStore {
    /// 创建存储
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部环境变量，文件不存在时返回空表
    pub async fn load(&self) -> Result<EnvMap> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(EnvMap::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(CoreError::InvalidConfigValue {
                key: self.path.display().to_string(),
                reason: "env.json 顶层必须是对象".to_string(),
            }),
        }
    }

    async fn save(&self, map: &EnvMap) -> Result<()> {
        let content = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// 读取单个变量
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load().await?.remove(key))
    }

    /// 按名称排序列出所有变量
    pub async fn list(&self) -> Result<Vec<(String, Value)>> {
        let mut entries: Vec<_> = self.load().await?.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// 解析并写入 `key=[type:]value`
    pub async fn set(&self, expr: &str) -> Result<(String, Value)> {
        let (key, value) = parse_assignment(expr)?;
        self.insert(&key, value.clone()).await?;
        Ok((key, value))
    }

    /// 直接写入一个值
    pub async fn insert(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.load().await?;
        map.insert(key.to_string(), value);
        self.save(&map).await?;
        debug!(key = %key, "环境变量已写入");
        Ok(())
    }

    /// 删除变量
    ///
    /// # Returns
    ///
    /// 变量存在时返回 true
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut map = self.load().await?;
        let existed = map.remove(key).is_some();
        if existed {
            self.save(&map).await?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_assignment_types() {
        assert_eq!(parse_assignment("a=hello").unwrap(), ("a".to_string(), json!("hello")));
        assert_eq!(parse_assignment("a=int:42").unwrap().1, json!(42));
        assert_eq!(parse_assignment("a=float:1.5").unwrap().1, json!(1.5));
        assert_eq!(parse_assignment("a=bool:true").unwrap().1, json!(true));
        assert_eq!(parse_assignment("a=bool:yes").unwrap().1, json!(false));
        assert_eq!(
            parse_assignment(r#"a=json:{"x":[1,2]}"#).unwrap().1,
            json!({"x": [1, 2]})
        );
    }

    #[test]
    fn test_parse_assignment_keeps_colons_and_equals_in_value() {
        assert_eq!(
            parse_assignment("url=str:http://host:80/?a=b").unwrap().1,
            json!("http://host:80/?a=b")
        );
    }

    #[test]
    fn test_parse_assignment_errors() {
        assert!(matches!(
            parse_assignment("a=date:2020"),
            Err(CoreError::InvalidConfigValue { .. })
        ));
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("a=int:x").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[tokio::test]
    async fn test_env_store_crud() {
        let dir = TempDir::new().unwrap();
        let store = EnvStore::new(dir.path().join("env.json"));

        assert!(store.load().await.unwrap().is_empty());

        store.set("port=int:8080").await.unwrap();
        store.set("name=frame").await.unwrap();
        assert_eq!(store.get("port").await.unwrap(), Some(json!(8080)));

        let keys: Vec<_> = store.list().await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "port"]);

        assert!(store.delete("port").await.unwrap());
        assert!(!store.delete("port").await.unwrap());
        assert_eq!(store.get("port").await.unwrap(), None);
    }
}
