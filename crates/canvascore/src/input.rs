use crate::{InputAbandoned, InputPort, NodeId, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Asks the user for the values a node could not resolve on its own.
///
/// A request resolves with the submitted values, or is rejected when the
/// form is dismissed or superseded by a newer request for the same node.
#[async_trait]
pub trait InputResolver: Send + Sync {
    async fn request(&self, request: InputRequest) -> Result<InputSubmission, InputAbandoned>;

    /// Abandon any outstanding request for the node (the run was stopped)
    fn cancel(&self, _node_id: NodeId) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub node_id: NodeId,
    pub schema: Vec<InputPort>,
    pub prefill: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSubmission {
    pub node_id: NodeId,
    pub values: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRequestStatus {
    /// A request is outstanding with the resolver
    Pending,
    /// Nothing outstanding; waiting for a retry
    Waiting,
    /// Values accepted
    Done,
}

/// Input form a waiting node has published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInputRequest {
    pub node_id: NodeId,
    pub schema: Vec<InputPort>,
    pub status: InputRequestStatus,
    /// Last known values, used to re-show a partially filled form
    pub prefill: HashMap<String, Value>,
    /// Why the last submission was refused, if it was
    pub last_error: Option<String>,
}

impl PendingInputRequest {
    pub fn new(node_id: NodeId, schema: Vec<InputPort>, prefill: HashMap<String, Value>) -> Self {
        Self {
            node_id,
            schema,
            status: InputRequestStatus::Pending,
            prefill,
            last_error: None,
        }
    }

    pub fn to_request(&self) -> InputRequest {
        InputRequest {
            node_id: self.node_id,
            schema: self.schema.clone(),
            prefill: self.prefill.clone(),
        }
    }
}
