use canvascore::{NodeId, NodeStatus, WorkflowError};
use thiserror::Error;

/// Errors returned by the control surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("No active run")]
    NoActiveRun,

    #[error("Node {node_id} is {status}, not waiting for input")]
    NotWaiting { node_id: NodeId, status: NodeStatus },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("No pending input request for node {0}")]
    NoPendingInput(NodeId),

    #[error("Engine is no longer running")]
    Closed,
}
