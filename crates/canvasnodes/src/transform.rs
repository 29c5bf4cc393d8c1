use async_trait::async_trait;
use canvascore::{FieldKind, InputPort, Node, NodeContext, NodeDefinition, NodeError, Value};
use canvasengine::NodeFactory;
use std::collections::HashMap;

/// Parse JSON string to Value
pub struct JsonParseNode;

#[async_trait]
impl Node for JsonParseNode {
    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let input = ctx.require_input("json")?;
        let text = input.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: "json".to_string(),
            expected: "string".to_string(),
            actual: kind_of(input).to_string(),
        })?;

        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(Value::Json(parsed))
    }
}

pub struct JsonParseNodeFactory;

impl NodeFactory for JsonParseNodeFactory {
    fn create(&self, _properties: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonParseNode))
    }

    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition::new("Parse JSON string", "transform")
            .with_input(InputPort::new("json", FieldKind::Text).required())
            .with_output("parsed")
    }
}

/// Stringify Value to JSON
pub struct JsonStringifyNode;

#[async_trait]
impl Node for JsonStringifyNode {
    fn node_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let value = ctx.require_input("value")?;
        let pretty = ctx
            .get_property_or("pretty", Value::Bool(true))
            .as_bool()
            .unwrap_or(true);

        let plain = value.to_plain_json();
        let json_str = if pretty {
            serde_json::to_string_pretty(&plain)
        } else {
            serde_json::to_string(&plain)
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(Value::String(json_str))
    }
}

pub struct JsonStringifyNodeFactory;

impl NodeFactory for JsonStringifyNodeFactory {
    fn create(&self, _properties: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonStringifyNode))
    }

    fn node_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition::new("Convert value to JSON string", "transform")
            .with_input(InputPort::new("value", FieldKind::Any).required())
            .with_output("json")
            .with_default("pretty", true)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::Json(_) => "json",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
