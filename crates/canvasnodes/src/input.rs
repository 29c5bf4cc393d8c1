//! Nodes whose values normally come from the user.
//!
//! Left unlinked and without form data, these nodes make the engine wait
//! for an input submission before they run.

use async_trait::async_trait;
use canvascore::{FieldKind, InputPort, Node, NodeContext, NodeDefinition, NodeError, Value};
use canvasengine::NodeFactory;
use std::collections::HashMap;

/// Returns the text it was given
pub struct TextInputNode;

#[async_trait]
impl Node for TextInputNode {
    fn node_type(&self) -> &str {
        "input.text"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let text = ctx.require_input("text")?;
        Ok(text.clone())
    }
}

pub struct TextInputNodeFactory;

impl NodeFactory for TextInputNodeFactory {
    fn create(&self, _properties: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(TextInputNode))
    }

    fn node_type(&self) -> &str {
        "input.text"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition::new("Ask the user for a line of text", "input")
            .with_input(InputPort::new("text", FieldKind::Text).required())
            .with_output("text")
    }
}

/// Returns the chosen options as an array
pub struct SelectInputNode;

#[async_trait]
impl Node for SelectInputNode {
    fn node_type(&self) -> &str {
        "input.select"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let choices = match ctx.require_input("choices")? {
            Value::Array(items) => items.clone(),
            Value::Json(serde_json::Value::Array(items)) => items
                .iter()
                .cloned()
                .map(Value::from_plain_json)
                .collect(),
            single => vec![single.clone()],
        };
        ctx.events.info(format!("{} option(s) selected", choices.len()));
        Ok(Value::Array(choices))
    }
}

pub struct SelectInputNodeFactory;

impl NodeFactory for SelectInputNodeFactory {
    fn create(&self, _properties: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SelectInputNode))
    }

    fn node_type(&self) -> &str {
        "input.select"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition::new("Ask the user to pick up to three options", "input")
            .with_input(
                InputPort::new("choices", FieldKind::MultiSelect)
                    .required()
                    .with_max(3),
            )
            .with_output("choices")
    }
}
