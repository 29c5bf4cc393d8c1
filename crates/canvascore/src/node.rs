use crate::{events::EventEmitter, NodeError, NodeId, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runs the computation behind a node.
///
/// Calls may take arbitrarily long and are never cancelled by the engine.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<Value, NodeError>;
}

/// Everything an executor receives for one node invocation
#[derive(Clone)]
pub struct ExecutionRequest {
    pub node_id: NodeId,
    pub executor_ref: String,
    pub payload: ExecutionPayload,
    /// Event emitter for progress and log updates
    pub events: EventEmitter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPayload {
    pub input_values: HashMap<String, Value>,
    pub property_values: HashMap<String, Value>,
}

/// One node type, as registered in a node registry
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique type identifier (e.g., "transform.json_parse")
    fn node_type(&self) -> &str;

    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError>;
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,

    /// Resolved and validated input values
    pub inputs: HashMap<String, Value>,

    /// Defaults merged with per-instance overrides
    pub properties: HashMap<String, Value>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl NodeContext {
    pub fn new(node_id: NodeId, events: EventEmitter) -> Self {
        Self {
            node_id,
            inputs: HashMap::new(),
            properties: HashMap::new(),
            events,
        }
    }

    pub fn from_request(request: ExecutionRequest) -> Self {
        Self {
            node_id: request.node_id,
            inputs: request.payload.input_values,
            properties: request.payload.property_values,
            events: request.events,
        }
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    /// Get property value or return error
    pub fn require_property(&self, name: &str) -> Result<&Value, NodeError> {
        self.properties
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("Missing property: {}", name)))
    }

    /// Get property with default
    pub fn get_property_or(&self, name: &str, default: Value) -> Value {
        self.properties.get(name).cloned().unwrap_or(default)
    }
}
