//! 服务依赖关系图
//!
//! 以服务名称为节点，边 `A -> B` 表示 "A 依赖 B"。图必须始终保持无环，
//! 任何会引入环的修改都会被拒绝并完整回滚。

use infrastructure_common::DependencyError;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// 依赖图节点
#[derive(Debug, Clone, PartialEq, Eq)]
struct GraphNode {
    /// 启动优先级，仅被依赖而未声明的节点为 `None`
    priority: Option<i32>,
    /// 插入序号
    sequence: u64,
}

impl GraphNode {
    fn sort_key(&self) -> (i32, u64) {
        (self.priority.unwrap_or_default(), self.sequence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Visited,
}

/// 依赖关系图
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// 节点映射
    nodes: HashMap<String, GraphNode>,
    /// 节点插入顺序
    insertion_order: Vec<String>,
    /// 邻接表（服务 -> 依赖）
    adjacency_list: HashMap<String, Vec<String>>,
    /// 反向邻接表（服务 -> 依赖者）
    reverse_adjacency_list: HashMap<String, Vec<String>>,
    next_sequence: u64,
}

impl DependencyGraph {
    /// 创建新的依赖关系图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加服务节点，已存在时保留更小的优先级
    pub fn add_service(&mut self, name: &str, priority: i32) {
        self.ensure_node(name);
        if let Some(node) = self.nodes.get_mut(name) {
            node.priority = Some(match node.priority {
                Some(existing) => existing.min(priority),
                None => priority,
            });
        }
    }

    /// 添加依赖关系 `service -> depends_on`
    ///
    /// 自环只保证节点存在，不会记录为边。若新边引入循环依赖，
    /// 图恢复到调用前的状态并返回完整的环路径。
    pub fn add_dependency(
        &mut self,
        service: &str,
        depends_on: &str,
    ) -> Result<(), DependencyError> {
        let snapshot_sequence = self.next_sequence;
        let created_service = self.ensure_node(service);

        if service == depends_on {
            return Ok(());
        }

        let created_dependency = self.ensure_node(depends_on);

        if self.get_dependencies(service).iter().any(|dep| dep == depends_on) {
            return Ok(());
        }

        self.adjacency_list
            .entry(service.to_string())
            .or_default()
            .push(depends_on.to_string());
        self.reverse_adjacency_list
            .entry(depends_on.to_string())
            .or_default()
            .push(service.to_string());

        if let Some(path) = self.get_circular_dependency_path() {
            self.remove_edge(service, depends_on);
            if created_dependency {
                self.remove_node(depends_on);
            }
            if created_service {
                self.remove_node(service);
            }
            self.next_sequence = snapshot_sequence;
            return Err(DependencyError::CircularDependency { path });
        }

        Ok(())
    }

    /// 移除服务节点及其所有入边和出边
    pub fn remove_service(&mut self, name: &str) -> bool {
        if !self.nodes.contains_key(name) {
            return false;
        }

        for dep in self.adjacency_list.remove(name).unwrap_or_default() {
            if let Some(dependents) = self.reverse_adjacency_list.get_mut(&dep) {
                dependents.retain(|d| d != name);
            }
        }
        for dependent in self.reverse_adjacency_list.remove(name).unwrap_or_default() {
            if let Some(deps) = self.adjacency_list.get_mut(&dependent) {
                deps.retain(|d| d != name);
            }
        }

        self.remove_node(name);
        true
    }

    /// 获取服务的直接依赖
    pub fn get_dependencies(&self, name: &str) -> Vec<String> {
        self.adjacency_list
            .get(name)
            .map(|deps| deps.iter().filter(|d| *d != name).cloned().collect())
            .unwrap_or_default()
    }

    /// 获取直接依赖于指定服务的服务列表
    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        self.reverse_adjacency_list
            .get(name)
            .map(|deps| deps.iter().filter(|d| *d != name).cloned().collect())
            .unwrap_or_default()
    }

    /// 是否包含指定服务
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// 按插入顺序返回所有服务
    pub fn services(&self) -> &[String] {
        &self.insertion_order
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 获取初始化顺序（拓扑排序）
    ///
    /// 依赖总是排在依赖者之前；同时就绪的节点按优先级升序、再按插入顺序排列。
    pub fn get_initialization_order(&self) -> Result<Vec<String>, DependencyError> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), self.get_dependencies(name).len()))
            .collect();

        let mut ready = BinaryHeap::new();
        for (name, degree) in &in_degree {
            if *degree == 0 {
                ready.push(Reverse((self.nodes[*name].sort_key(), name.to_string())));
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, name))) = ready.pop() {
            for dependent in self.get_dependents(&name) {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.nodes[&dependent].sort_key(), dependent)));
                    }
                }
            }
            order.push(name);
        }

        if order.len() != self.nodes.len() {
            return Err(DependencyError::CircularDependency {
                path: self.get_circular_dependency_path().unwrap_or_default(),
            });
        }

        Ok(order)
    }

    /// 获取停止顺序（初始化顺序的逆序）
    pub fn get_shutdown_order(&self) -> Result<Vec<String>, DependencyError> {
        let mut order = self.get_initialization_order()?;
        order.reverse();
        Ok(order)
    }

    /// 是否存在循环依赖
    pub fn has_circular_dependency(&self) -> bool {
        self.get_circular_dependency_path().is_some()
    }

    /// 返回第一个检测到的环路径，首尾为同一节点，如 `[A, B, C, A]`
    pub fn get_circular_dependency_path(&self) -> Option<Vec<String>> {
        let mut states: HashMap<&str, VisitState> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        for node in &self.insertion_order {
            if !states.contains_key(node.as_str()) {
                if let Some(cycle) = self.dfs_detect_cycle(node, &mut states, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// 深度优先搜索检测循环
    fn dfs_detect_cycle<'a>(
        &'a self,
        node: &'a str,
        states: &mut HashMap<&'a str, VisitState>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        states.insert(node, VisitState::Visiting);
        path.push(node);

        if let Some(dependencies) = self.adjacency_list.get(node) {
            for dep in dependencies.iter().filter(|d| d.as_str() != node) {
                match states.get(dep.as_str()) {
                    Some(VisitState::Visiting) => {
                        let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.clone());
                        return Some(cycle);
                    }
                    Some(VisitState::Visited) => {}
                    None => {
                        if let Some(cycle) = self.dfs_detect_cycle(dep, states, path) {
                            return Some(cycle);
                        }
                    }
                }
            }
        }

        path.pop();
        states.insert(node, VisitState::Visited);
        None
    }

    fn ensure_node(&mut self, name: &str) -> bool {
        if self.nodes.contains_key(name) {
            return false;
        }

        self.nodes.insert(
            name.to_string(),
            GraphNode {
                priority: None,
                sequence: self.next_sequence,
            },
        );
        self.next_sequence += 1;
        self.insertion_order.push(name.to_string());
        true
    }

    fn remove_node(&mut self, name: &str) {
        self.nodes.remove(name);
        self.insertion_order.retain(|n| n != name);
        self.adjacency_list.remove(name);
        self.reverse_adjacency_list.remove(name);
    }

    fn remove_edge(&mut self, service: &str, depends_on: &str) {
        if let Some(deps) = self.adjacency_list.get_mut(service) {
            deps.retain(|d| d != depends_on);
            if deps.is_empty() {
                self.adjacency_list.remove(service);
            }
        }
        if let Some(dependents) = self.reverse_adjacency_list.get_mut(depends_on) {
            dependents.retain(|d| d != service);
            if dependents.is_empty() {
                self.reverse_adjacency_list.remove(depends_on);
            }
        }
    }
}
