//! Workflow execution engine
//!
//! This crate runs a visual workflow as a dependency graph: nodes execute
//! once every upstream node has produced its output, nodes missing required
//! values wait for user input, and the whole run can be paused, resumed and
//! stopped through an [`EngineHandle`]. Progress is published as a
//! [`canvascore::StatusSnapshot`] and as events on the shared bus.

mod context;
mod control;
mod deps;
mod error;
mod projection;
mod registry;
mod resolver;
mod runtime;
mod scheduler;
mod task;
mod validate;

pub use context::{Board, RunContext, WorkflowNode};
pub use control::EngineHandle;
pub use deps::DependencyGraph;
pub use error::EngineError;
pub use projection::project;
pub use registry::{NodeFactory, NodeRegistry};
pub use resolver::ChannelInputResolver;
pub use runtime::{Runtime, RuntimeConfig};
pub use validate::validate_inputs;
