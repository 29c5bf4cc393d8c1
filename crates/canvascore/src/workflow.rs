use crate::{FlowError, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = Uuid;
pub type LinkId = Uuid;

/// Read-only view of the graph a run is built from
pub trait GraphSnapshot: Send + Sync {
    fn nodes(&self) -> Vec<NodeSpec>;
    fn links(&self) -> Vec<Link>;
}

/// Workflow graph as edited on the canvas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Load a workflow from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let workflow: Workflow = serde_json::from_str(&json)?;
        tracing::debug!(
            path = %path.display(),
            nodes = workflow.nodes.len(),
            links = workflow.links.len(),
            "loaded workflow"
        );
        Ok(workflow)
    }

    /// Write the workflow as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FlowError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Remove a node together with every link touching it
    pub fn remove_node(&mut self, id: NodeId) -> Option<NodeSpec> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        self.links.retain(|l| l.from_node != id && l.to_node != id);
        Some(self.nodes.remove(index))
    }

    /// Connect an output slot to an input slot.
    ///
    /// An input slot holds at most one link: connecting into an occupied
    /// slot detaches the link that was there.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_slot: usize,
        to_node: NodeId,
        to_slot: usize,
    ) -> LinkId {
        self.links
            .retain(|l| !(l.to_node == to_node && l.to_slot == to_slot));

        let link = Link {
            id: Uuid::new_v4(),
            from_node,
            from_slot,
            to_node,
            to_slot,
        };
        let id = link.id;
        self.links.push(link);
        id
    }

    pub fn find_node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: NodeId) -> Option<&mut NodeSpec> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}

impl GraphSnapshot for Workflow {
    fn nodes(&self) -> Vec<NodeSpec> {
        self.nodes.clone()
    }

    fn links(&self) -> Vec<Link> {
        self.links.clone()
    }
}

/// Node placed on the canvas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    /// Key into the node definition resolver
    pub definition_ref: String,
    /// Which executor implementation runs this node
    pub executor_ref: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Per-instance property overrides
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    /// Input field values already entered in the node's form
    #[serde(default)]
    pub form: HashMap<String, Value>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl NodeSpec {
    /// A node whose definition and executor share the same key
    pub fn new(node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        Self {
            id: Uuid::new_v4(),
            definition_ref: node_type.clone(),
            executor_ref: node_type,
            name: None,
            properties: HashMap::new(),
            form: HashMap::new(),
            position: None,
        }
    }

    pub fn with_executor(mut self, executor_ref: impl Into<String>) -> Self {
        self.executor_ref = executor_ref.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_form_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.form.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Directed edge from an output slot to an input slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub from_node: NodeId,
    pub from_slot: usize,
    pub to_node: NodeId,
    pub to_slot: usize,
}

/// Node position in visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connecting_into_occupied_slot_detaches_old_link() {
        let mut workflow = Workflow::new("overwrite");
        let a = workflow.add_node(NodeSpec::new("a"));
        let b = workflow.add_node(NodeSpec::new("b"));
        let c = workflow.add_node(NodeSpec::new("c"));

        workflow.connect(a, 0, c, 0);
        let replacement = workflow.connect(b, 0, c, 0);
        workflow.connect(a, 0, c, 1);

        assert_eq!(workflow.links.len(), 2);
        let into_slot_zero: Vec<_> = workflow.links.iter().filter(|l| l.to_slot == 0).collect();
        assert_eq!(into_slot_zero.len(), 1);
        assert_eq!(into_slot_zero[0].id, replacement);
        assert_eq!(into_slot_zero[0].from_node, b);
    }

    #[test]
    fn removing_node_drops_its_links() {
        let mut workflow = Workflow::new("remove");
        let a = workflow.add_node(NodeSpec::new("a"));
        let b = workflow.add_node(NodeSpec::new("b"));
        workflow.connect(a, 0, b, 0);

        assert!(workflow.remove_node(a).is_some());
        assert!(workflow.links.is_empty());
        assert!(workflow.remove_node(a).is_none());
    }
}
