//! Standard node library
//!
//! Collection of built-in nodes for common operations

mod debug;
mod input;
mod time;
mod transform;

pub use debug::{DebugNode, DebugNodeFactory};
pub use input::{SelectInputNode, SelectInputNodeFactory, TextInputNode, TextInputNodeFactory};
pub use time::{DelayNode, DelayNodeFactory};
pub use transform::{JsonParseNode, JsonParseNodeFactory, JsonStringifyNode, JsonStringifyNodeFactory};
use canvasengine::NodeRegistry;

use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(debug::DebugNodeFactory));
    registry.register(Arc::new(input::SelectInputNodeFactory));
    registry.register(Arc::new(input::TextInputNodeFactory));
    registry.register(Arc::new(transform::JsonParseNodeFactory));
    registry.register(Arc::new(transform::JsonStringifyNodeFactory));
    registry.register(Arc::new(time::DelayNodeFactory));
}

/// A registry holding every standard node
pub fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    registry
}
