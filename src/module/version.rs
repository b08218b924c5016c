//! 版本号比较
//!
//! 模块版本是点分数字串（如 `1.10.2`），逐段按整数比较，缺失的尾段视为 0，
//! 因此 `1.2` 与 `1.2.0` 相等。每段长度不限，按去掉前导零的数字串比较：
//! 先比位数，位数相同再逐位比较。

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::utils::{CoreError, Result};

/// 点分数字版本号
#[derive(Debug, Clone)]
pub struct DottedVersion {
    /// 各段去掉前导零后的数字串，零为空串
    components: Vec<String>,
    raw: String,
}

impl DottedVersion {
    /// 解析版本号
    ///
    /// # Errors
    ///
    /// 任一段为空或包含非数字字符时返回 `MalformedVersion`
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        let components = raw
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CoreError::MalformedVersion(s.to_string()));
                }
                Ok(part.trim_start_matches('0').to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            components,
            raw: raw.to_string(),
        })
    }
}

impl FromStr for DottedVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| {
                let a = self.components.get(i).map(String::as_str).unwrap_or("");
                let b = other.components.get(i).map(String::as_str).unwrap_or("");
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

/// 比较两个版本号字符串
///
/// # Errors
///
/// 任一版本号格式错误时返回 `MalformedVersion`
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(DottedVersion::parse(a)?.cmp(&DottedVersion::parse(b)?))
}

/// `candidate` 是否严格高于 `installed`
pub fn is_upgrade(installed: &str, candidate: &str) -> Result<bool> {
    Ok(compare(installed, candidate)? == Ordering::Less)
}
