//! Resource dependency graph
//!
//! Nodes are kept in declaration order. Validation rejects edges to unknown
//! nodes, cycles (reporting the offending path), and attribute tokens whose
//! node is not a transitive predecessor of the node using them: such a
//! missing edge would let the referenced value race its producer.
//!
//! `topological_order` is Kahn's algorithm with ties broken by declaration
//! order, so the same declarations always yield the same order.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::resource::{NodeId, ResourceNode};
use crate::{Error, Result};

/// Directed acyclic graph of resource nodes
#[derive(Clone, Debug, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<NodeId, usize>,
}

impl ResourceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node; ids must be unique
    pub fn add(&mut self, node: ResourceNode) -> Result<NodeId> {
        if self.index.contains_key(&node.id) {
            return Err(Error::validation_for(
                node.id.as_str(),
                "node declared more than once",
            ));
        }
        debug!(node = %node.id, kind = %node.kind(), "declared node");
        let id = node.id.clone();
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    /// Add an edge: `node` must be applied after `dependency`.
    ///
    /// `node` must already be declared; `dependency` is checked by `validate`.
    pub fn depend(&mut self, node: &NodeId, dependency: &NodeId) -> Result<()> {
        let idx = *self.index.get(node).ok_or_else(|| {
            Error::dependency(node.as_str(), "cannot add an edge from an undeclared node")
        })?;
        self.nodes[idx].add_dependency(dependency.clone());
        Ok(())
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing is declared
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is declared
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Look up a node
    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    /// Direct predecessors of `id`
    pub fn dependencies_of(&self, id: &str) -> Vec<&NodeId> {
        self.get(id)
            .map(|n| n.depends_on.iter().collect())
            .unwrap_or_default()
    }

    /// Direct successors of `id`, in declaration order
    pub fn dependents_of(&self, id: &str) -> Vec<&NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.iter().any(|d| d.as_str() == id))
            .map(|n| &n.id)
            .collect()
    }

    /// Every node reachable through `depends_on` edges from `id`
    pub fn transitive_dependencies(&self, id: &str) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&NodeId> = self.dependencies_of(id);
        while let Some(dep) = stack.pop() {
            if seen.insert(dep.clone()) {
                stack.extend(self.dependencies_of(dep.as_str()));
            }
        }
        seen
    }

    /// Check edge targets, acyclicity and token/edge completeness
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for dep in &node.depends_on {
                if !self.contains(dep.as_str()) {
                    return Err(Error::dependency(
                        node.id.as_str(),
                        format!("depends on unknown node '{}'", dep),
                    ));
                }
            }
        }

        self.topological_order()?;

        for node in &self.nodes {
            let refs = node.references()?;
            if refs.is_empty() {
                continue;
            }
            let ancestors = self.transitive_dependencies(node.id.as_str());
            for r in refs {
                let target = self.get(r.node.as_str()).ok_or_else(|| {
                    Error::dependency(
                        node.id.as_str(),
                        format!("references unknown node '{}'", r.node),
                    )
                })?;
                if !target.kind().attributes().contains(&r.attribute.as_str()) {
                    return Err(Error::dependency(
                        node.id.as_str(),
                        format!(
                            "{} node '{}' has no attribute '{}'",
                            target.kind(),
                            r.node,
                            r.attribute
                        ),
                    ));
                }
                if !ancestors.contains(&r.node) {
                    return Err(Error::validation_for(
                        node.id.as_str(),
                        format!("uses {} without depending on '{}'", r, r.node),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Stable topological order (Kahn, ties by declaration order)
    pub fn topological_order(&self) -> Result<Vec<&ResourceNode>> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                let Some(&d) = self.index.get(dep) else {
                    return Err(Error::dependency(
                        node.id.as_str(),
                        format!("depends on unknown node '{}'", dep),
                    ));
                };
                in_degree[i] += 1;
                successors[d].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_first() {
            order.push(&self.nodes[i]);
            for &s in &successors[i] {
                in_degree[s] -= 1;
                if in_degree[s] == 0 {
                    ready.insert(s);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let remaining: HashSet<usize> =
                (0..self.nodes.len()).filter(|&i| in_degree[i] > 0).collect();
            return Err(Error::Cycle {
                path: self.find_cycle(&remaining),
            });
        }
        Ok(order)
    }

    /// Walk predecessors inside the unsorted remainder until a node repeats.
    fn find_cycle(&self, remaining: &HashSet<usize>) -> Vec<String> {
        let Some(&start) = remaining.iter().min() else {
            return Vec::new();
        };
        let mut path: Vec<usize> = vec![start];
        let mut current = start;
        loop {
            let next = self.nodes[current]
                .depends_on
                .iter()
                .filter_map(|d| self.index.get(d).copied())
                .find(|d| remaining.contains(d));
            let Some(next) = next else {
                break;
            };
            if let Some(pos) = path.iter().position(|&p| p == next) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|&i| self.nodes[i].id.to_string())
                    .collect();
                cycle.push(self.nodes[next].id.to_string());
                // path follows depends_on edges; report in apply order
                cycle.reverse();
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.iter().map(|&i| self.nodes[i].id.to_string()).collect()
    }
}
