use crate::{LinkId, NodeId, PendingInputRequest, RunId, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Life-cycle status of a node within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Pending,
    /// Blocked on user-supplied input
    Waiting,
    Progressing,
    /// Ready to run but held back by a paused run
    Paused,
    Done,
    Error,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Done | NodeStatus::Error)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "PENDING",
            NodeStatus::Waiting => "WAITING",
            NodeStatus::Progressing => "PROGRESSING",
            NodeStatus::Paused => "PAUSED",
            NodeStatus::Done => "DONE",
            NodeStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Global status of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Stopped,
    Progressing,
    Paused,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Stopped => "stopped",
            RunStatus::Progressing => "progressing",
            RunStatus::Paused => "paused",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: NodeId,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Downstream of a failed node; will not run in this attempt
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkView {
    pub link_id: LinkId,
    /// Mirrors the status of the link's source node
    pub status: NodeStatus,
}

/// What the rendering surface sees of the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub run_id: Option<RunId>,
    pub run_status: RunStatus,
    pub nodes: Vec<NodeView>,
    pub links: Vec<LinkView>,
    /// Input forms published by waiting nodes
    pub pending_inputs: Vec<PendingInputRequest>,
}

impl StatusSnapshot {
    pub fn node(&self, node_id: NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn node_status(&self, node_id: NodeId) -> Option<NodeStatus> {
        self.node(node_id).map(|n| n.status)
    }

    pub fn link(&self, link_id: LinkId) -> Option<&LinkView> {
        self.links.iter().find(|l| l.link_id == link_id)
    }

    pub fn pending_input(&self, node_id: NodeId) -> Option<&PendingInputRequest> {
        self.pending_inputs.iter().find(|p| p.node_id == node_id)
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }
}
