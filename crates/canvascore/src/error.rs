use crate::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resolved input values rejected before the executor is invoked
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' is not valid structured data: {message}")]
    Parse { field: String, message: String },

    #[error("Field '{field}' allows at most {max} selections, got {actual}")]
    TooManySelections { field: String, max: usize, actual: usize },

    #[error("Field '{field}' needs at least {min} selections, got {actual}")]
    TooFewSelections { field: String, min: usize, actual: usize },

    #[error("Field '{field}' allows at most {max} files, got {actual}")]
    TooManyFiles { field: String, max: usize, actual: usize },

    #[error("Field '{field}' needs at least {min} files, got {actual}")]
    TooFewFiles { field: String, min: usize, actual: usize },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::Parse { field, .. }
            | ValidationError::TooManySelections { field, .. }
            | ValidationError::TooFewSelections { field, .. }
            | ValidationError::TooManyFiles { field, .. }
            | ValidationError::TooFewFiles { field, .. } => field,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Unknown executor: {0}")]
    UnknownExecutor(String),

    #[error(transparent)]
    InputAbandoned(#[from] InputAbandoned),
}

/// The input resolver gave up on a request without a submission
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputAbandoned {
    #[error("input form for node {0} was dismissed")]
    Dismissed(NodeId),

    #[error("input request for node {0} was superseded by a newer one")]
    Superseded(NodeId),

    #[error("input request for node {0} was cancelled")]
    Cancelled(NodeId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node definition '{definition}' for node {node_id}")]
    UnknownDefinition { node_id: NodeId, definition: String },

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
}
