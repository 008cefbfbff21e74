//! Component build order using topological sort
use crate::component::ComponentSpec;
use crate::error::{KilnError, KilnResult};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A component in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentNode {
    pub name: String,
    /// Components this one depends on
    pub dependencies: Vec<String>,
}

impl ComponentNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Dependency graph over components
///
/// Nodes are kept in a `BTreeMap` so that independent components come out in
/// name order, whatever order they were declared in.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    nodes: BTreeMap<String, ComponentNode>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from component specs
    pub fn from_specs(specs: &[ComponentSpec]) -> Self {
        let mut graph = Self::new();
        for spec in specs {
            graph.add_node(
                ComponentNode::new(&spec.name).with_dependencies(spec.depends_on.clone()),
            );
        }
        graph
    }

    pub fn add_node(&mut self, node: ComponentNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn get_node(&self, name: &str) -> Option<&ComponentNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check that every dependency names a node
    pub fn validate(&self) -> KilnResult<()> {
        for (name, node) in &self.nodes {
            for dep in &node.dependencies {
                if !self.nodes.contains_key(dep) {
                    return Err(KilnError::Graph(format!(
                        "component '{}' depends on unknown component '{}'",
                        name, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compute the build order using Kahn's algorithm
    pub fn compute_build_order(&self) -> KilnResult<Vec<String>> {
        self.validate()?;

        // In-degree = number of distinct dependencies not yet built
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(name, node)| {
                let distinct: BTreeSet<&String> = node.dependencies.iter().collect();
                (name.as_str(), distinct.len())
            })
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());

            for (dependent, node) in &self.nodes {
                if node.dependencies.iter().any(|d| d == current) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(KilnError::Graph(format!(
                "circular dependency detected: {}",
                self.find_cycle()
            )));
        }

        Ok(order)
    }

    /// Transitive dependencies of a component
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![name];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                for dep in &node.dependencies {
                    if seen.insert(dep.clone()) {
                        stack.push(dep);
                    }
                }
            }
        }
        seen
    }

    /// Find a cycle in the graph (for error reporting)
    fn find_cycle(&self) -> String {
        let mut visited = BTreeSet::new();
        let mut stack = BTreeSet::new();
        let mut path = Vec::new();

        for name in self.nodes.keys() {
            if let Some(cycle) = self.dfs_find_cycle(name, &mut visited, &mut stack, &mut path) {
                return cycle;
            }
        }

        "unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        &self,
        name: &str,
        visited: &mut BTreeSet<String>,
        stack: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) -> Option<String> {
        if stack.contains(name) {
            path.push(name.to_string());
            let start = path.iter().position(|m| m == name).unwrap_or(0);
            return Some(path[start..].join(" -> "));
        }

        if !visited.insert(name.to_string()) {
            return None;
        }

        stack.insert(name.to_string());
        path.push(name.to_string());

        if let Some(node) = self.nodes.get(name) {
            for dep in &node.dependencies {
                if let Some(cycle) = self.dfs_find_cycle(dep, visited, stack, path) {
                    return Some(cycle);
                }
            }
        }

        stack.remove(name);
        path.pop();
        None
    }
}

/// Order component specs for building
pub fn ordered_specs(specs: &[ComponentSpec]) -> KilnResult<Vec<ComponentSpec>> {
    let order = BuildGraph::from_specs(specs).compute_build_order()?;
    Ok(order
        .iter()
        .filter_map(|name| specs.iter().find(|s| &s.name == name).cloned())
        .collect())
}
