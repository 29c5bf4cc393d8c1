use async_trait::async_trait;
use canvascore::{FieldKind, InputPort, Node, NodeContext, NodeDefinition, NodeError, Value};
use canvasengine::NodeFactory;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

/// Delay execution for a specified duration
pub struct DelayNode {
    delay: Duration,
}

impl DelayNode {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        ctx.events
            .info(format!("Delaying for {}ms", self.delay.as_millis()));

        sleep(self.delay).await;
        ctx.events.progress(100.0, None);

        // Pass the input through unchanged
        Ok(ctx.inputs.get("value").cloned().unwrap_or(Value::Null))
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(&self, properties: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        let delay_ms = match properties.get("delay_ms") {
            None => 1000.0,
            Some(value) => value.as_f64().ok_or_else(|| {
                NodeError::Configuration("delay_ms must be a number".to_string())
            })?,
        };
        if !delay_ms.is_finite() || delay_ms < 0.0 {
            return Err(NodeError::Configuration(format!(
                "delay_ms must be a non-negative number, got {}",
                delay_ms
            )));
        }
        Ok(Box::new(DelayNode::new(Duration::from_millis(delay_ms as u64))))
    }

    fn node_type(&self) -> &str {
        "time.delay"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition::new("Delay execution for specified milliseconds", "time")
            .with_input(InputPort::new("value", FieldKind::Any))
            .with_output("value")
            .with_default("delay_ms", 1000.0)
    }
}
