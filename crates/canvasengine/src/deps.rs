//! Dependency bookkeeping derived from the link list.

use canvascore::{Link, LinkId, NodeId};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Incoming/outgoing adjacency and unmet-dependency counters for one run.
///
/// A node becomes eligible when its counter reaches zero. Counters are only
/// ever decremented through [`DependencyGraph::complete`], once per edge.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    order: Vec<NodeId>,
    incoming: HashMap<NodeId, Vec<Link>>,
    outgoing: HashMap<NodeId, Vec<Link>>,
    remaining: HashMap<NodeId, usize>,
    completed: HashSet<NodeId>,
    ignored: Vec<LinkId>,
}

impl DependencyGraph {
    /// Derive the graph from `(node, input slot count)` pairs and links.
    ///
    /// Links whose endpoints are unknown, or whose target slot does not
    /// exist, are ignored. When several links feed the same input slot the
    /// last one wins.
    pub fn build(nodes: &[(NodeId, usize)], links: &[Link]) -> Self {
        let slots: HashMap<NodeId, usize> = nodes.iter().copied().collect();
        let order: Vec<NodeId> = nodes.iter().map(|(id, _)| *id).collect();

        let mut ignored = Vec::new();
        let mut by_slot: HashMap<(NodeId, usize), usize> = HashMap::new();
        for (index, link) in links.iter().enumerate() {
            let dangling = !slots.contains_key(&link.from_node)
                || slots
                    .get(&link.to_node)
                    .map_or(true, |count| link.to_slot >= *count);
            if dangling {
                warn!(
                    link = %link.id,
                    from = %link.from_node,
                    to = %link.to_node,
                    to_slot = link.to_slot,
                    "ignoring dangling link"
                );
                ignored.push(link.id);
                continue;
            }
            if let Some(previous) = by_slot.insert((link.to_node, link.to_slot), index) {
                warn!(
                    link = %links[previous].id,
                    replaced_by = %link.id,
                    "input slot linked twice; keeping the later link"
                );
                ignored.push(links[previous].id);
            }
        }

        let mut accepted: Vec<usize> = by_slot.into_values().collect();
        accepted.sort_unstable();

        let mut incoming: HashMap<NodeId, Vec<Link>> =
            order.iter().map(|id| (*id, Vec::new())).collect();
        let mut outgoing: HashMap<NodeId, Vec<Link>> =
            order.iter().map(|id| (*id, Vec::new())).collect();
        for index in accepted {
            let link = &links[index];
            incoming.entry(link.to_node).or_default().push(link.clone());
            outgoing.entry(link.from_node).or_default().push(link.clone());
        }

        let remaining = incoming
            .iter()
            .map(|(id, edges)| (*id, edges.len()))
            .collect();

        Self {
            order,
            incoming,
            outgoing,
            remaining,
            completed: HashSet::new(),
            ignored,
        }
    }

    /// Nodes with no incoming edges, in node-list order
    pub fn initial_ready(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.incoming.get(id).map_or(true, Vec::is_empty))
            .collect()
    }

    pub fn has_cycle(&self) -> bool {
        let mut graph = DiGraph::<NodeId, ()>::new();
        let index: HashMap<NodeId, NodeIndex> = self
            .order
            .iter()
            .map(|id| (*id, graph.add_node(*id)))
            .collect();
        for link in self.outgoing.values().flatten() {
            if let (Some(from), Some(to)) = (index.get(&link.from_node), index.get(&link.to_node)) {
                graph.add_edge(*from, *to, ());
            }
        }
        is_cyclic_directed(&graph)
    }

    pub fn incoming(&self, node: NodeId) -> &[Link] {
        self.incoming.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn outgoing(&self, node: NodeId) -> &[Link] {
        self.outgoing.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remaining(&self, node: NodeId) -> Option<usize> {
        self.remaining.get(&node).copied()
    }

    /// Every link that takes part in the run, in original order per source
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.order.iter().flat_map(|id| self.outgoing(*id).iter())
    }

    pub fn ignored_links(&self) -> &[LinkId] {
        &self.ignored
    }

    pub fn is_completed(&self, node: NodeId) -> bool {
        self.completed.contains(&node)
    }

    /// Mark `node` as completed and satisfy its outgoing edges.
    ///
    /// Returns the dependents whose counter just reached zero. Completing a
    /// node a second time changes nothing and returns an empty list.
    pub fn complete(&mut self, node: NodeId) -> Vec<NodeId> {
        if !self.completed.insert(node) {
            return Vec::new();
        }

        let mut released = Vec::new();
        for link in self.outgoing.get(&node).into_iter().flatten() {
            if let Some(count) = self.remaining.get_mut(&link.to_node) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        released.push(link.to_node);
                    }
                }
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn link(from: NodeId, to: NodeId, to_slot: usize) -> Link {
        Link {
            id: Uuid::new_v4(),
            from_node: from,
            from_slot: 0,
            to_node: to,
            to_slot,
        }
    }

    #[test]
    fn diamond_releases_join_once() {
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let nodes = [(a, 0), (b, 1), (c, 1), (d, 2)];
        let links = [link(a, b, 0), link(a, c, 0), link(b, d, 0), link(c, d, 1)];
        let mut graph = DependencyGraph::build(&nodes, &links);

        assert_eq!(graph.initial_ready(), vec![a]);
        assert_eq!(graph.remaining(d), Some(2));

        let mut released = graph.complete(a);
        released.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(released, expected);

        assert!(graph.complete(b).is_empty());
        assert_eq!(graph.complete(c), vec![d]);
        assert!(graph.complete(c).is_empty());
        assert_eq!(graph.remaining(d), Some(0));
    }

    #[test]
    fn dangling_links_are_ignored() {
        let (a, b, ghost) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let nodes = [(a, 0), (b, 1)];
        let to_ghost = link(a, ghost, 0);
        let from_ghost = link(ghost, b, 0);
        let bad_slot = link(a, b, 3);
        let graph = DependencyGraph::build(
            &nodes,
            &[to_ghost.clone(), from_ghost.clone(), bad_slot.clone()],
        );

        assert_eq!(graph.initial_ready(), vec![a, b]);
        assert_eq!(graph.links().count(), 0);
        assert_eq!(graph.ignored_links(), &[to_ghost.id, from_ghost.id, bad_slot.id]);
    }

    #[test]
    fn later_link_into_same_slot_wins() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let nodes = [(a, 0), (b, 0), (c, 1)];
        let first = link(a, c, 0);
        let second = link(b, c, 0);
        let graph = DependencyGraph::build(&nodes, &[first.clone(), second.clone()]);

        assert_eq!(graph.remaining(c), Some(1));
        assert_eq!(graph.incoming(c), &[second]);
        assert_eq!(graph.ignored_links(), &[first.id]);
    }

    #[test]
    fn detects_cycles() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let nodes = [(a, 1), (b, 1)];
        let graph = DependencyGraph::build(&nodes, &[link(a, b, 0), link(b, a, 0)]);
        assert!(graph.has_cycle());
        assert!(graph.initial_ready().is_empty());

        let acyclic = DependencyGraph::build(&nodes, &[link(a, b, 0)]);
        assert!(!acyclic.has_cycle());
    }
}
