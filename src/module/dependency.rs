//! 模块依赖管理
//!
//! 本模块提供已启用模块之间依赖关系的图结构和加载顺序解析。
//!
//! 节点是包键，边只来自描述中的必需依赖。解析时先检查每条边的目标都是图中节点，
//! 然后用 Kahn 算法排序，同时就绪的节点按发现顺序输出，
//! 因此同一个存储目录每次得到的加载顺序都相同。
//!
//! # 示例
//!
//! ```rust
//! use sdk_frame::module::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_module("m_c");
//! graph.add_module("m_a");
//! graph.add_module("m_b");
//! graph.add_dependency("m_b", "m_a");
//! graph.add_dependency("m_c", "m_b");
//!
//! assert_eq!(graph.topological_sort().unwrap(), vec!["m_a", "m_b", "m_c"]);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::module::metadata::InstalledModule;
use crate::utils::{CoreError, Result};

/// 模块依赖关系图
///
/// 记录节点的发现顺序，用作拓扑排序时的稳定次序。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点，按发现顺序
    nodes: Vec<String>,
    /// 节点 -> 发现序号
    index: HashMap<String, usize>,
    /// 正向边：包键 -> 该模块依赖的包键列表
    edges: HashMap<String, Vec<String>>,
    /// 反向边：包键 -> 依赖它的包键列表
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 由已启用模块构建依赖图
    ///
    /// 节点顺序与传入顺序一致，边取自各模块的 `dependencies`。
    pub fn from_modules(modules: &[InstalledModule]) -> Self {
        let mut graph = Self::new();
        for module in modules {
            graph.add_module(module.key());
        }
        for module in modules {
            for dep in &module.descriptor.dependencies {
                graph.add_dependency(module.key(), dep);
            }
        }
        graph
    }

    /// 解析加载顺序
    ///
    /// # Arguments
    ///
    /// * `nodes` - 包键，按发现顺序
    /// * `edges` - 包键 -> 必需依赖列表
    ///
    /// # Returns
    ///
    /// 依赖在前、依赖方在后的包键序列，长度等于节点数
    ///
    /// # Errors
    ///
    /// - 边的目标不在节点中时返回 `UnresolvedDependency`
    /// - 存在环时返回 `CycleDetected`，附带环路径
    pub fn resolve(nodes: &[String], edges: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_module(node);
        }
        for node in nodes {
            for dep in edges.get(node).into_iter().flatten() {
                graph.add_dependency(node, dep);
            }
        }
        graph.topological_sort()
    }

    /// 添加模块节点
    ///
    /// 已存在的节点保持原来的发现序号。
    pub fn add_module(&mut self, module_id: &str) {
        if self.index.contains_key(module_id) {
            return;
        }
        self.index.insert(module_id.to_string(), self.nodes.len());
        self.nodes.push(module_id.to_string());
        self.edges.entry(module_id.to_string()).or_default();
        self.reverse_edges.entry(module_id.to_string()).or_default();
    }

    /// 添加依赖关系：`module_id` 依赖 `dependency_id`
    ///
    /// 目标不会被自动加入节点，未知目标在排序时报告为 `UnresolvedDependency`。
    pub fn add_dependency(&mut self, module_id: &str, dependency_id: &str) {
        self.add_module(module_id);

        let deps = self.edges.entry(module_id.to_string()).or_default();
        if !deps.iter().any(|d| d == dependency_id) {
            deps.push(dependency_id.to_string());
        }

        let rev_deps = self.reverse_edges.entry(dependency_id.to_string()).or_default();
        if !rev_deps.iter().any(|d| d == module_id) {
            rev_deps.push(module_id.to_string());
        }
    }

    /// 获取模块的直接依赖列表
    pub fn get_dependencies(&self, module_id: &str) -> Vec<String> {
        self.edges.get(module_id).cloned().unwrap_or_default()
    }

    /// 获取直接依赖该模块的模块列表
    pub fn get_dependents(&self, module_id: &str) -> Vec<String> {
        self.reverse_edges.get(module_id).cloned().unwrap_or_default()
    }

    /// 获取所有直接或间接依赖该模块的模块
    pub fn get_all_dependents(&self, module_id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![module_id.to_string()];

        while let Some(current) = stack.pop() {
            for dependent in self.reverse_edges.get(&current).into_iter().flatten() {
                if visited.insert(dependent.clone()) {
                    result.push(dependent.clone());
                    stack.push(dependent.clone());
                }
            }
        }

        result
    }

    /// 检查每条边的目标都是图中节点
    ///
    /// # Errors
    ///
    /// 按发现顺序报告第一个未解析的依赖
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for dep in self.edges.get(node).into_iter().flatten() {
                if !self.index.contains_key(dep) {
                    return Err(CoreError::UnresolvedDependency {
                        module: node.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// 查找循环依赖路径
    ///
    /// 从发现顺序最早的节点开始深度优先搜索，返回的路径首尾相同。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let all: HashSet<&str> = self.nodes.iter().map(String::as_str).collect();
        self.find_cycle_within(&all)
    }

    /// 在节点子集内查找环
    fn find_cycle_within(&self, allowed: &HashSet<&str>) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for node in self.nodes.iter().filter(|n| allowed.contains(n.as_str())) {
            if let Some(cycle) =
                self.find_cycle_util(node, allowed, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }

        None
    }

    /// 查找环的辅助函数（DFS）
    fn find_cycle_util(
        &self,
        node: &str,
        allowed: &HashSet<&str>,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if rec_stack.contains(node) {
            // 找到环，截取环路径并闭合
            let start = path.iter().position(|n| n == node)?;
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }

        if !visited.insert(node.to_string()) {
            return None;
        }

        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        for neighbor in self.edges.get(node).into_iter().flatten() {
            if !allowed.contains(neighbor.as_str()) {
                continue;
            }
            if let Some(cycle) = self.find_cycle_util(neighbor, allowed, visited, rec_stack, path) {
                return Some(cycle);
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }

    /// 拓扑排序（Kahn 算法）
    ///
    /// 返回模块的加载顺序，保证依赖在依赖方之前。
    /// 同时就绪的节点中发现顺序靠前的先输出。
    ///
    /// # Errors
    ///
    /// - `UnresolvedDependency` - 依赖目标不是图中节点
    /// - `CycleDetected` - 存在循环依赖，不返回部分顺序
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        self.validate()?;

        // 入度 = 该模块尚未加载的依赖数
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.edges.get(n).map_or(0, Vec::len))
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_first() {
            let node = &self.nodes[i];
            result.push(node.clone());

            for dependent in self.reverse_edges.get(node).into_iter().flatten() {
                if let Some(&j) = self.index.get(dependent) {
                    in_degree[j] -= 1;
                    if in_degree[j] == 0 {
                        ready.insert(j);
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let done: HashSet<&str> = result.iter().map(String::as_str).collect();
            let remaining: HashSet<&str> = self
                .nodes
                .iter()
                .map(String::as_str)
                .filter(|n| !done.contains(n))
                .collect();

            // 剩余节点都至少有一个剩余依赖，必然成环
            let cycle = self.find_cycle_within(&remaining).unwrap_or_else(|| {
                self.nodes
                    .iter()
                    .filter(|n| remaining.contains(n.as_str()))
                    .cloned()
                    .collect()
            });
            return Err(CoreError::CycleDetected { cycle });
        }

        Ok(result)
    }

    /// 检查图是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 获取图中模块数量
    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    /// 检查是否包含指定模块
    pub fn contains_module(&self, module_id: &str) -> bool {
        self.index.contains_key(module_id)
    }
}
