//! 模块描述解析器
//!
//! 负责从模块目录中的 module.yaml 或 module.json 解析模块描述。

use std::path::{Path, PathBuf};

use crate::module::metadata::{ModuleDescriptor, OptionalDependency};
use crate::module::version::DottedVersion;
use crate::utils::{CoreError, Result};

/// YAML 描述文件名（优先）
pub const DESCRIPTOR_YAML: &str = "module.yaml";

/// JSON 描述文件名
pub const DESCRIPTOR_JSON: &str = "module.json";

/// 描述文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    /// YAML
    Yaml,
    /// JSON
    Json,
}

/// 模块描述解析器
#[derive(Debug, Clone, Default)]
pub struct ModuleParser;

impl ModuleParser {
    /// 创建新的解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 查找模块目录中的描述文件
    ///
    /// module.yaml 优先于 module.json。
    pub fn descriptor_path(dir: &Path) -> Option<(PathBuf, DescriptorFormat)> {
        let yaml = dir.join(DESCRIPTOR_YAML);
        if yaml.is_file() {
            return Some((yaml, DescriptorFormat::Yaml));
        }
        let json = dir.join(DESCRIPTOR_JSON);
        if json.is_file() {
            return Some((json, DescriptorFormat::Json));
        }
        None
    }

    /// 从模块目录解析模块描述
    ///
    /// # Arguments
    ///
    /// * `dir` - 模块目录，目录名即包键
    ///
    /// # Returns
    ///
    /// 解析后的 `ModuleDescriptor`，`package_key` 取自目录名
    ///
    /// # Errors
    ///
    /// - 目录中没有描述文件时返回 `InvalidMetadata`
    /// - 文件无法读取时返回 IO 错误
    /// - 验证失败时返回 `InvalidMetadata` 或 `MalformedVersion`
    pub async fn parse_dir(dir: &Path) -> Result<ModuleDescriptor> {
        let (path, format) = Self::descriptor_path(dir).ok_or_else(|| {
            CoreError::InvalidMetadata(format!("{} 中没有模块描述文件", dir.display()))
        })?;
        let content = tokio::fs::read_to_string(&path).await?;
        Self::finish(dir, &content, format)
    }

    fn finish(dir: &Path, content: &str, format: DescriptorFormat) -> Result<ModuleDescriptor> {
        let mut descriptor = Self::parse_string(content, format)?;
        descriptor.package_key = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CoreError::InvalidMetadata(format!("无法确定 {} 的包键", dir.display()))
            })?;
        Ok(descriptor)
    }

    /// 从字符串解析模块描述
    ///
    /// 返回的描述 `package_key` 为空，由调用方填写。重复的必需依赖会被去除。
    ///
    /// # Errors
    ///
    /// - 解析失败时返回 `Yaml` / `Json` 错误
    /// - 验证失败时返回 `InvalidMetadata` 或 `MalformedVersion`
    pub fn parse_string(content: &str, format: DescriptorFormat) -> Result<ModuleDescriptor> {
        let mut descriptor: ModuleDescriptor = match format {
            DescriptorFormat::Yaml => serde_yaml::from_str(content)?,
            DescriptorFormat::Json => serde_json::from_str(content)?,
        };

        let mut seen = std::collections::HashSet::new();
        descriptor.dependencies.retain(|d| seen.insert(d.clone()));

        Self::validate(&descriptor)?;
        Ok(descriptor)
    }

    /// 验证模块描述
    ///
    /// 执行以下验证：
    /// - 逻辑名非空且为合法标识符
    /// - 版本号为点分数字
    /// - 依赖包键非空
    /// - 可选依赖备选组非空
    pub fn validate(descriptor: &ModuleDescriptor) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if descriptor.name.is_empty() {
            errors.push("模块名称不能为空".to_string());
        } else if !Self::is_valid_name(&descriptor.name) {
            errors.push(format!(
                "模块名称 '{}' 格式无效，只允许字母、数字和下划线，且不能以数字开头",
                descriptor.name
            ));
        }

        if descriptor.version.is_empty() {
            errors.push("模块版本号不能为空".to_string());
        } else if DottedVersion::parse(&descriptor.version).is_err() {
            errors.push(format!(
                "无效的版本号格式 '{}'，请使用点分数字 (如 1.0.0)",
                descriptor.version
            ));
        }

        for (index, dep) in descriptor.dependencies.iter().enumerate() {
            if dep.trim().is_empty() {
                errors.push(format!("第 {} 个依赖的包键不能为空", index + 1));
            }
        }

        for (index, dep) in descriptor.optional_dependencies.iter().enumerate() {
            match dep {
                OptionalDependency::AnyOf(keys) if keys.is_empty() => {
                    errors.push(format!("第 {} 个可选依赖的备选组为空", index + 1));
                }
                _ if dep.keys().iter().any(|k| k.trim().is_empty()) => {
                    errors.push(format!("第 {} 个可选依赖包含空包键", index + 1));
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidMetadata(errors.join("; ")))
        }
    }

    /// 检查逻辑名格式是否有效
    ///
    /// 有效格式：字母或下划线开头，只包含字母、数字和下划线
    fn is_valid_name(s: &str) -> bool {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
