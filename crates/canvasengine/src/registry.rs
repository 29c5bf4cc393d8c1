use async_trait::async_trait;
use canvascore::{
    DefinitionResolver, ExecutionRequest, Executor, Node, NodeContext, NodeDefinition, NodeError,
    Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a node instance for the given property values
    fn create(&self, properties: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Input/output schema and default properties
    fn definition(&self) -> NodeDefinition {
        NodeDefinition::default()
    }
}

/// Registry of available node types.
///
/// Serves both as the definition resolver and as the executor, dispatching
/// on the node type key.
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get the definition of a node type
    pub fn get_definition(&self, node_type: &str) -> Option<NodeDefinition> {
        self.factories.get(node_type).map(|f| f.definition())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionResolver for NodeRegistry {
    fn resolve(&self, definition_ref: &str) -> Option<NodeDefinition> {
        self.get_definition(definition_ref)
    }
}

#[async_trait]
impl Executor for NodeRegistry {
    async fn execute(&self, request: ExecutionRequest) -> Result<Value, NodeError> {
        let factory = self
            .factories
            .get(&request.executor_ref)
            .ok_or_else(|| NodeError::UnknownExecutor(request.executor_ref.clone()))?;

        let node = factory.create(&request.payload.property_values)?;
        tracing::debug!(
            node = %request.node_id,
            node_type = node.node_type(),
            "executing node"
        );
        node.execute(NodeContext::from_request(request)).await
    }
}
