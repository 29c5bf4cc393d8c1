//! Read model handed to the rendering surface.

use crate::context::Board;
use canvascore::{
    LinkView, NodeId, NodeStatus, NodeView, PendingInputRequest, RunId, RunStatus,
    StatusSnapshot,
};
use std::collections::{HashMap, HashSet, VecDeque};

/// Derive the status projection from the authoritative board.
///
/// Link status always mirrors the link's source node. Nodes downstream of
/// a failed node that have not run are flagged `blocked`.
pub fn project(
    run_id: Option<RunId>,
    run_status: RunStatus,
    board: &Board,
    pending_inputs: Vec<PendingInputRequest>,
) -> StatusSnapshot {
    let blocked = blocked_nodes(board);

    let nodes = board
        .nodes()
        .iter()
        .map(|node| NodeView {
            node_id: node.id,
            status: node.status,
            output: match node.status {
                NodeStatus::Done => node.output().cloned(),
                _ => None,
            },
            blocked: blocked.contains(&node.id),
        })
        .collect();

    let links = board
        .links()
        .iter()
        .map(|link| LinkView {
            link_id: link.id,
            status: board
                .node(link.from_node)
                .map_or(NodeStatus::Pending, |source| source.status),
        })
        .collect();

    StatusSnapshot {
        run_id,
        run_status,
        nodes,
        links,
        pending_inputs,
    }
}

fn blocked_nodes(board: &Board) -> HashSet<NodeId> {
    let mut downstream: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for link in board.edges() {
        downstream.entry(link.from_node).or_default().push(link.to_node);
    }

    let mut queue: VecDeque<NodeId> = board
        .nodes()
        .iter()
        .filter(|n| n.status == NodeStatus::Error)
        .map(|n| n.id)
        .collect();
    let mut blocked = HashSet::new();

    while let Some(id) = queue.pop_front() {
        for next in downstream.get(&id).into_iter().flatten() {
            let not_started = board
                .node(*next)
                .map_or(false, |n| matches!(n.status, NodeStatus::Pending | NodeStatus::Paused));
            if not_started && blocked.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    blocked
}
