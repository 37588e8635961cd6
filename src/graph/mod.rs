//! Dependency graph between bundles
//!
//! Bundles are joined by field name only: an edge runs from the bundle that
//! produces a field to the bundle that consumes it. Nodes refer to each other
//! by index into the graph's node list, so the graph is the sole owner.

pub mod sort;

pub use sort::{topo_sort, StageOrder};

use std::collections::HashMap;

use thiserror::Error;

use crate::config::BundleDescriptor;

#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("Duplicate bundle name: '{0}'")]
    DuplicateBundleName(String),

    #[error("Field '{field}' is {role} by more than one bundle: {bundles:?}")]
    DuplicateFieldBinding {
        field: String,
        role: &'static str,
        bundles: Vec<String>,
    },

    #[error("Cycle detected between bundles: {}", nodes.join(" -> "))]
    CycleDetected { nodes: Vec<String> },
}

/// One bundle in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    /// Indices of the bundles consuming something this one produces
    children: Vec<usize>,
}

impl Node {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    fn add_child(&mut self, child: usize) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// Producer to consumer graph over a set of bundles
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Graph {
    /// Build the graph from descriptors; node order follows descriptor order.
    pub fn build(bundles: &[BundleDescriptor]) -> Result<Self, GraphError> {
        let mut graph = Graph::default();
        for bundle in bundles {
            if graph.index.contains_key(&bundle.name) {
                return Err(GraphError::DuplicateBundleName(bundle.name.clone()));
            }
            graph.index.insert(bundle.name.clone(), graph.nodes.len());
            graph.nodes.push(Node::new(&bundle.name));
        }

        let consumers = claims(bundles, |b| b.input_names());
        let producers = claims(bundles, |b| b.output_names());

        for (producer, bundle) in bundles.iter().enumerate() {
            for field in bundle.output_names() {
                let Some(consumed_by) = consumers.get(field) else {
                    continue;
                };
                check_single(field, "consumed", consumed_by, bundles)?;
                if let Some(produced_by) = producers.get(field) {
                    check_single(field, "produced", produced_by, bundles)?;
                }
                graph.nodes[producer].add_child(consumed_by[0]);
            }
        }

        Ok(graph)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Names of the bundles consuming an output of `name`
    pub fn children_of(&self, name: &str) -> Vec<&str> {
        self.node(name)
            .map(|n| {
                n.children
                    .iter()
                    .map(|&c| self.nodes[c].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All producer -> consumer edges, in build order
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.nodes
            .iter()
            .flat_map(|n| {
                n.children
                    .iter()
                    .map(move |&c| (n.name.as_str(), self.nodes[c].name.as_str()))
            })
            .collect()
    }

    /// Bundles nothing feeds into (pipeline entry points)
    pub fn sources(&self) -> Vec<&str> {
        let mut has_parent = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for &c in &node.children {
                has_parent[c] = true;
            }
        }
        self.nodes
            .iter()
            .zip(has_parent)
            .filter(|(_, parent)| !parent)
            .map(|(n, _)| n.name.as_str())
            .collect()
    }

    /// Bundles whose outputs nobody consumes
    pub fn sinks(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.children.is_empty())
            .map(|n| n.name.as_str())
            .collect()
    }
}

/// Build and sort in one step; nothing is started if either fails.
pub fn plan(bundles: &[BundleDescriptor]) -> Result<(Graph, StageOrder), GraphError> {
    let graph = Graph::build(bundles)?;
    let order = topo_sort(&graph)?;
    Ok((graph, order))
}

// ============================================================================
// SBIO: Pure helpers
// ============================================================================

/// Map each field name to the bundles claiming it, in descriptor order
fn claims<'a, F, I>(bundles: &'a [BundleDescriptor], fields: F) -> HashMap<&'a str, Vec<usize>>
where
    F: Fn(&'a BundleDescriptor) -> I,
    I: Iterator<Item = &'a str>,
{
    let mut map: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, bundle) in bundles.iter().enumerate() {
        for field in fields(bundle) {
            map.entry(field).or_default().push(i);
        }
    }
    map
}

fn check_single(
    field: &str,
    role: &'static str,
    claimed_by: &[usize],
    bundles: &[BundleDescriptor],
) -> Result<(), GraphError> {
    if claimed_by.len() > 1 {
        return Err(GraphError::DuplicateFieldBinding {
            field: field.to_string(),
            role,
            bundles: claimed_by.iter().map(|&i| bundles[i].name.clone()).collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::config::{BundleDescriptor, Field};

    fn fields(names: &[&str]) -> Vec<Field> {
        names
            .iter()
            .map(|n| Field {
                name: n.to_string(),
                description: String::new(),
            })
            .collect()
    }

    pub fn bundle(name: &str, inputs: &[&str], outputs: &[&str]) -> BundleDescriptor {
        BundleDescriptor {
            name: name.to_string(),
            inputs: fields(inputs),
            outputs: fields(outputs),
            install: Vec::new(),
            env: Vec::new(),
        }
    }
}
