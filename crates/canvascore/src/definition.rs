use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Looks up the schema of a node type
pub trait DefinitionResolver: Send + Sync {
    fn resolve(&self, definition_ref: &str) -> Option<NodeDefinition>;
}

/// Input/output schema and default properties of a node type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub description: String,
    pub category: String,
    /// Ordered input ports; a link's `to_slot` indexes this list
    pub inputs: Vec<InputPort>,
    /// Ordered output ports; a link's `from_slot` indexes this list
    pub outputs: Vec<PortDefinition>,
    pub default_properties: HashMap<String, Value>,
}

impl NodeDefinition {
    pub fn new(description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, port: InputPort) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(PortDefinition {
            name: name.into(),
            description: String::new(),
        });
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_properties.insert(key.into(), value.into());
        self
    }

    pub fn input_slot(&self, slot: usize) -> Option<&InputPort> {
        self.inputs.get(slot)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Kind of form field backing an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Any,
    Text,
    Number,
    Boolean,
    /// Structured data; strings must parse as JSON
    Json,
    MultiSelect,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPort {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub min: Option<usize>,
}

impl InputPort {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            max: None,
            min: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }
}
