//! 操作者决策
//!
//! 安装流程中所有需要人工判断的地方都经过 [`OperatorDecision`]：
//! 命令行使用 [`ConsoleDecisions`]，测试使用预先编排好的 [`ScriptedDecisions`]。

use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Mutex;

use crate::catalog::{CatalogKey, CatalogModule};
use crate::module::metadata::OptionalDependency;
use crate::utils::{CoreError, Result};

/// 呈现给操作者的候选模块
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateView {
    pub key: CatalogKey,
    pub version: String,
    pub author: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub optional_dependencies: Vec<OptionalDependency>,
}

impl CandidateView {
    /// 由源目录条目构造
    pub fn new(key: CatalogKey, entry: &CatalogModule) -> Self {
        Self {
            key,
            version: entry.version.clone(),
            author: entry.author.clone(),
            description: entry.description.clone(),
            dependencies: entry.dependencies.clone(),
            optional_dependencies: entry.optional_dependencies.clone(),
        }
    }
}

impl fmt::Display for CandidateView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.key, self.version)?;
        if !self.author.is_empty() {
            write!(f, " by {}", self.author)?;
        }
        if !self.description.is_empty() {
            write!(f, "\n    {}", self.description)?;
        }
        if !self.dependencies.is_empty() {
            write!(f, "\n    依赖: {}", self.dependencies.join(", "))?;
        }
        for optional in &self.optional_dependencies {
            write!(f, "\n    可选: {}", optional)?;
        }
        Ok(())
    }
}

/// 升级计划中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePlanItem {
    pub package_key: String,
    pub name: String,
    pub installed_version: String,
    pub candidate: CatalogKey,
    pub candidate_version: String,
}

impl fmt::Display for UpgradePlanItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} -> {} [{}]",
            self.name, self.package_key, self.installed_version, self.candidate_version, self.candidate
        )
    }
}

/// 操作者决策接口
pub trait OperatorDecision: Send + Sync {
    /// 从多个匹配中选择一个，返回所选键（`模块名@提供方`）
    fn select_candidate(&self, query: &str, candidates: &[CandidateView]) -> Result<String>;

    /// 为已安装模块选择升级提供方
    fn select_provider(&self, package_key: &str, candidates: &[CandidateView]) -> Result<String>;

    /// 是否覆盖已安装的模块
    fn confirm_overwrite(&self, package_key: &str) -> Result<bool>;

    /// 是否一并安装缺失的依赖
    fn confirm_cascade(&self, package_key: &str, missing: &[String]) -> Result<bool>;

    /// 是否执行整份升级计划
    fn confirm_upgrade(&self, plan: &[UpgradePlanItem]) -> Result<bool>;
}

/// 预先编排的决策
///
/// 选择和确认各自一个队列，按调用顺序依次取出。队列耗尽时，
/// 选择返回 `InvalidSelection`，确认返回 false。
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    selections: Mutex<VecDeque<String>>,
    confirmations: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个选择答案
    pub fn select(self, key: impl Into<String>) -> Self {
        lock(&self.selections).push_back(key.into());
        self
    }

    /// 追加一个确认答案
    pub fn confirm(self, answer: bool) -> Self {
        lock(&self.confirmations).push_back(answer);
        self
    }

    /// 到目前为止收到的提示，形如 `overwrite:m_http`
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    fn record(&self, prompt: String) {
        lock(&self.prompts).push(prompt);
    }

    fn next_selection(&self, context: &str) -> Result<String> {
        lock(&self.selections)
            .pop_front()
            .ok_or_else(|| CoreError::InvalidSelection(format!("{}: 没有预设答案", context)))
    }

    fn next_confirmation(&self) -> bool {
        lock(&self.confirmations).pop_front().unwrap_or(false)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl OperatorDecision for ScriptedDecisions {
    fn select_candidate(&self, query: &str, _candidates: &[CandidateView]) -> Result<String> {
        self.record(format!("select:{}", query));
        self.next_selection(query)
    }

    fn select_provider(&self, package_key: &str, _candidates: &[CandidateView]) -> Result<String> {
        self.record(format!("provider:{}", package_key));
        self.next_selection(package_key)
    }

    fn confirm_overwrite(&self, package_key: &str) -> Result<bool> {
        self.record(format!("overwrite:{}", package_key));
        Ok(self.next_confirmation())
    }

    fn confirm_cascade(&self, package_key: &str, _missing: &[String]) -> Result<bool> {
        self.record(format!("cascade:{}", package_key));
        Ok(self.next_confirmation())
    }

    fn confirm_upgrade(&self, plan: &[UpgradePlanItem]) -> Result<bool> {
        self.record(format!("upgrade:{}", plan.len()));
        Ok(self.next_confirmation())
    }
}

/// 交互式终端决策
pub struct ConsoleDecisions<R, W> {
    io: Mutex<(R, W)>,
}

impl ConsoleDecisions<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    /// 使用标准输入输出
    pub fn stdio() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleDecisions<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    fn ask(&self, text: &str) -> Result<String> {
        let mut guard = lock(&self.io);
        let (reader, writer) = &mut *guard;
        write!(writer, "{}", text)?;
        writer.flush()?;

        let mut line = String::new();
        reader.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn ask_yes_no(&self, text: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N] ", text))?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn choose(&self, header: &str, candidates: &[CandidateView]) -> Result<String> {
        let mut text = format!("{}\n", header);
        for candidate in candidates {
            text.push_str(&format!("  {}\n", candidate));
        }
        text.push_str("输入 模块名@提供方: ");
        self.ask(&text)
    }
}

impl<R, W> OperatorDecision for ConsoleDecisions<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn select_candidate(&self, query: &str, candidates: &[CandidateView]) -> Result<String> {
        self.choose(&format!("'{}' 匹配到多个模块:", query), candidates)
    }

    fn select_provider(&self, package_key: &str, candidates: &[CandidateView]) -> Result<String> {
        self.choose(&format!("'{}' 有多个提供方可升级:", package_key), candidates)
    }

    fn confirm_overwrite(&self, package_key: &str) -> Result<bool> {
        self.ask_yes_no(&format!("模块 '{}' 已安装，是否覆盖?", package_key))
    }

    fn confirm_cascade(&self, package_key: &str, missing: &[String]) -> Result<bool> {
        self.ask_yes_no(&format!(
            "模块 '{}' 缺少依赖 {}，是否一并安装?",
            package_key,
            missing.join(", ")
        ))
    }

    fn confirm_upgrade(&self, plan: &[UpgradePlanItem]) -> Result<bool> {
        let mut text = String::from("以下模块可以升级:\n");
        for item in plan {
            text.push_str(&format!("  {}\n", item));
        }
        text.push_str("是否全部升级?");
        self.ask_yes_no(&text)
    }
}
