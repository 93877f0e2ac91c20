//! Dependency closure over registered scripts and styles.
//!
//! The registry stores "depends on" edges. Blocking or moving a leaf is only
//! safe if every asset that still pulls the leaf back onto the page is swept
//! along with it, so the graph is built with inverted edges, from a
//! dependency to each of its dependents, and a sweep collects everything
//! reachable from the seeds.
//!
//! Cyclic registrations are not valid input. The traversal keeps a visited
//! set, so a cycle still terminates and every member of the cycle lands in
//! the sweep once.

use std::collections::{HashMap, HashSet};

use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::Bfs;

use crate::registry::Registry;

/// Inverted dependency graph: an edge `a -> b` means `b` depends on `a`.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: Graph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from every registered asset. Dependencies that are not
    /// registered themselves still get a node.
    pub fn from_registry<R: Registry + ?Sized>(registry: &R) -> Self {
        let mut graph = Self::new();

        for asset in registry.registered() {
            let dependent = graph.node(&asset.handle);

            for dep in &asset.deps {
                let dependency = graph.node(dep);
                graph.graph.add_edge(dependency, dependent, ());
            }
        }

        graph
    }

    fn node(&mut self, handle: &str) -> NodeIndex {
        if let Some(index) = self.index.get(handle) {
            return *index;
        }

        let index = self.graph.add_node(handle.to_string());
        self.index.insert(handle.to_string(), index);
        index
    }

    /// The seeds plus every handle that transitively depends on one of them.
    ///
    /// Seeds missing from the graph are kept in the sweep, they simply have
    /// no dependents.
    pub fn closure<I, S>(&self, seeds: I) -> Sweep
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seeds: Vec<String> = seeds.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut sweep = Sweep::default();

        for seed in &seeds {
            sweep.insert(seed);
        }

        for seed in &seeds {
            let Some(start) = self.index.get(seed.as_str()) else {
                continue;
            };

            let mut bfs = Bfs::new(&self.graph, *start);
            while let Some(node) = bfs.next(&self.graph) {
                sweep.insert(&self.graph[node]);
            }
        }

        tracing::debug!(seeds = seeds.len(), swept = sweep.len(), "computed dependency closure");

        sweep
    }
}

impl std::fmt::Display for DependencyGraph {
    /// Mermaid diagram of the graph, edges point from a dependency to its
    /// dependents.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let name = self.graph[index].replace('"', "\\\"");
            writeln!(f, "    {}[\"{}\"]", index.index(), name)?;
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {} --> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

/// Ordered set of handles that move together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    handles: Vec<String>,
    seen: HashSet<String>,
}

impl Sweep {
    fn insert(&mut self, handle: &str) {
        if self.seen.insert(handle.to_string()) {
            self.handles.push(handle.to_string());
        }
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.seen.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(String::as_str)
    }

    /// This sweep without the handles of `other`.
    pub fn without(&self, other: &Sweep) -> Sweep {
        let mut sweep = Sweep::default();
        for handle in self.iter().filter(|h| !other.contains(h)) {
            sweep.insert(handle);
        }
        sweep
    }
}
