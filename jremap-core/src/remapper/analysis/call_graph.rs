// Call graph extraction
use crate::remapper::bytecode::Insn;
use crate::remapper::model::MethodKey;
use crate::remapper::normalize::NormalizedMethod;
use std::collections::{BTreeMap, BTreeSet};

/// Directed call graph over method keys, stored in both directions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallGraph {
    callees: BTreeMap<MethodKey, BTreeSet<MethodKey>>,
    callers: BTreeMap<MethodKey, BTreeSet<MethodKey>>,
}

impl CallGraph {
    /// Build from explicit caller → callee edges.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (MethodKey, MethodKey)>,
    {
        let mut graph = CallGraph::default();
        for (caller, callee) in edges {
            graph.add_edge(caller, callee);
        }
        graph
    }

    pub fn add_edge(&mut self, caller: MethodKey, callee: MethodKey) {
        self.callers.entry(callee.clone()).or_default().insert(caller.clone());
        self.callees.entry(caller).or_default().insert(callee);
    }

    /// Ensure `method` is present even without edges.
    pub fn add_node(&mut self, method: MethodKey) {
        self.callees.entry(method).or_default();
    }

    pub fn callees(&self, method: &MethodKey) -> Option<&BTreeSet<MethodKey>> {
        self.callees.get(method)
    }

    pub fn callers(&self, method: &MethodKey) -> Option<&BTreeSet<MethodKey>> {
        self.callers.get(method)
    }

    /// Callees, plus callers when `include_callers` is set.
    pub fn neighbors(&self, method: &MethodKey, include_callers: bool) -> BTreeSet<MethodKey> {
        let mut out: BTreeSet<MethodKey> = self.callees(method).cloned().unwrap_or_default();
        if include_callers {
            if let Some(callers) = self.callers(method) {
                out.extend(callers.iter().cloned());
            }
        }
        out
    }

    /// Caller → callees adjacency.
    pub fn as_map(&self) -> &BTreeMap<MethodKey, BTreeSet<MethodKey>> {
        &self.callees
    }

    pub fn edge_count(&self) -> usize {
        self.callees.values().map(BTreeSet::len).sum()
    }
}

/// Extract a call graph from method bodies.
///
/// With `restrict_to_provided`, edges to methods outside `methods` are dropped
/// so only calls between matchable methods remain.
pub fn extract_call_graph<'a, I>(methods: I, restrict_to_provided: bool) -> CallGraph
where
    I: IntoIterator<Item = &'a NormalizedMethod>,
{
    let methods: Vec<&NormalizedMethod> = methods.into_iter().collect();
    let provided: BTreeSet<&MethodKey> = methods.iter().map(|m| m.key()).collect();
    let mut graph = CallGraph::default();

    for method in &methods {
        graph.add_node(method.key().clone());
        for insn in method.instructions() {
            if let Insn::Method { owner, name, desc, .. } = insn {
                let callee = MethodKey::new(owner, name, desc);
                if restrict_to_provided && !provided.contains(&callee) {
                    continue;
                }
                graph.add_edge(method.key().clone(), callee);
            }
        }
    }

    log::debug!(
        "Call graph: {} methods, {} edges",
        graph.as_map().len(),
        graph.edge_count()
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> MethodKey {
        MethodKey::new("a", name, "()V")
    }

    fn set(names: &[&str]) -> BTreeSet<MethodKey> {
        names.iter().map(|n| key(n)).collect()
    }

    #[test]
    fn test_neighbors() {
        let graph = CallGraph::from_edges([(key("x"), key("y")), (key("z"), key("x"))]);
        assert_eq!(graph.neighbors(&key("x"), false), set(&["y"]));
        assert_eq!(graph.neighbors(&key("x"), true), set(&["y", "z"]));
        assert_eq!(graph.callers(&key("y")), Some(&set(&["x"])));
        assert_eq!(graph.edge_count(), 2);
    }
}
