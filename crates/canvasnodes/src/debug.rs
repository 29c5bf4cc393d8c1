use async_trait::async_trait;
use canvascore::{FieldKind, InputPort, Node, NodeContext, NodeDefinition, NodeError, Value};
use canvasengine::NodeFactory;
use std::collections::HashMap;

/// Logs its input and passes it on
pub struct DebugNode;

#[async_trait]
impl Node for DebugNode {
    fn node_type(&self) -> &str {
        "debug.log"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let message = ctx.inputs.get("message").cloned().unwrap_or(Value::Null);
        let text = match &message {
            Value::String(s) => s.clone(),
            Value::Null => "(no message)".to_string(),
            other => other.to_plain_json().to_string(),
        };

        tracing::info!(node = %ctx.node_id, message = %text, "debug node");
        ctx.events.info(format!("DEBUG: {}", text));

        Ok(message)
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(&self, _properties: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DebugNode))
    }

    fn node_type(&self) -> &str {
        "debug.log"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition::new("Logs its input for debugging", "debug")
            .with_input(InputPort::new("message", FieldKind::Any))
            .with_output("message")
    }
}
