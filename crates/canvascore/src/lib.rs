//! Core abstractions for the canvas workflow engine
//!
//! This crate provides the data model and the boundary traits every other
//! crate depends on: graph snapshots, node definitions, executors, input
//! resolvers, statuses and execution events. It has no scheduling logic.

mod definition;
mod error;
pub mod events;
mod input;
mod node;
mod status;
mod value;
mod workflow;

pub use definition::{DefinitionResolver, FieldKind, InputPort, NodeDefinition, PortDefinition};
pub use error::{FlowError, InputAbandoned, NodeError, ValidationError, WorkflowError};
pub use events::*;
pub use input::{
    InputRequest, InputRequestStatus, InputResolver, InputSubmission, PendingInputRequest,
};
pub use node::{ExecutionPayload, ExecutionRequest, Executor, Node, NodeContext};
pub use status::{LinkView, NodeStatus, NodeView, RunStatus, StatusSnapshot};
pub use value::Value;
pub use workflow::{GraphSnapshot, Link, LinkId, NodeId, NodeSpec, Position, Workflow, WorkflowId};

/// Identifies one execution attempt
pub type RunId = uuid::Uuid;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
