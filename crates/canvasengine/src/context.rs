//! Mutable state of the workflow: the node board and the active run.

use crate::deps::DependencyGraph;
use canvascore::{
    GraphSnapshot, DefinitionResolver, Link, LinkId, NodeDefinition, NodeId, NodeSpec, NodeStatus,
    PendingInputRequest, RunId, Value,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use uuid::Uuid;

/// A graph node as seen by the engine during a run
#[derive(Debug, Clone)]
pub struct WorkflowNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub definition_ref: String,
    pub executor_ref: String,
    pub definition: NodeDefinition,
    pub status: NodeStatus,
    pub input_values: HashMap<String, Value>,
    /// Defaults merged with per-instance overrides; fixed for the run
    pub property_values: HashMap<String, Value>,
    /// Form data known before the run started
    pub form: HashMap<String, Value>,
    output_value: Option<Value>,
}

impl WorkflowNode {
    pub fn from_spec(spec: &NodeSpec, definition: NodeDefinition) -> Self {
        let mut property_values = definition.default_properties.clone();
        property_values.extend(spec.properties.clone());

        Self {
            id: spec.id,
            name: spec.name.clone(),
            definition_ref: spec.definition_ref.clone(),
            executor_ref: spec.executor_ref.clone(),
            definition,
            status: NodeStatus::Pending,
            input_values: HashMap::new(),
            property_values,
            form: spec.form.clone(),
            output_value: None,
        }
    }

    pub fn output(&self) -> Option<&Value> {
        self.output_value.as_ref()
    }

    /// Store the node's result. Refuses to overwrite an existing one.
    pub(crate) fn set_output(&mut self, value: Value) -> bool {
        if self.output_value.is_some() {
            return false;
        }
        self.output_value = Some(value);
        true
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Nodes and links of the workflow the engine currently displays
#[derive(Debug, Clone, Default)]
pub struct Board {
    nodes: Vec<WorkflowNode>,
    index: HashMap<NodeId, usize>,
    links: Vec<Link>,
    /// Links shown on the canvas that carry no dependency
    ignored: HashSet<LinkId>,
}

impl Board {
    pub fn new(nodes: Vec<WorkflowNode>, links: Vec<Link>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();
        Self {
            nodes,
            index,
            links,
            ignored: HashSet::new(),
        }
    }

    /// Mark dangling or replaced links; they stay on the board for display
    pub fn with_ignored(mut self, ignored: &[LinkId]) -> Self {
        self.ignored = ignored.iter().copied().collect();
        self
    }

    /// Every snapshot node at `PENDING`, nothing resolved or computed.
    ///
    /// Nodes with an unknown definition are still shown, with an empty one.
    pub fn idle(graph: &dyn GraphSnapshot, definitions: &dyn DefinitionResolver) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|spec| {
                let definition = definitions
                    .resolve(&spec.definition_ref)
                    .unwrap_or_default();
                WorkflowNode::from_spec(spec, definition)
            })
            .collect();
        Self::new(nodes, graph.links())
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links that feed a dependency
    pub fn edges(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| !self.ignored.contains(&link.id))
    }

    pub fn node(&self, id: NodeId) -> Option<&WorkflowNode> {
        self.index.get(&id).map(|i| &self.nodes[*i])
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut WorkflowNode> {
        match self.index.get(&id) {
            Some(i) => self.nodes.get_mut(*i),
            None => None,
        }
    }

    pub fn any_with_status(&self, status: NodeStatus) -> bool {
        self.nodes.iter().any(|n| n.status == status)
    }
}

/// State of one execution attempt
#[derive(Debug)]
pub struct RunContext {
    pub run_id: RunId,
    pub started: Instant,
    pub deps: DependencyGraph,
    pub results: HashMap<NodeId, Value>,
    pub in_flight: HashSet<NodeId>,
    pub ready: VecDeque<NodeId>,
    pub pending_inputs: HashMap<NodeId, PendingInputRequest>,
    /// Validated submissions waiting for a free execution slot
    pub accepted: HashMap<NodeId, HashMap<String, Value>>,
    input_seq: HashMap<NodeId, u64>,
}

impl RunContext {
    /// Fresh context with every zero-dependency node queued
    pub fn new(deps: DependencyGraph) -> Self {
        let ready = deps.initial_ready().into_iter().collect();
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            deps,
            results: HashMap::new(),
            in_flight: HashSet::new(),
            ready,
            pending_inputs: HashMap::new(),
            accepted: HashMap::new(),
            input_seq: HashMap::new(),
        }
    }

    /// Queue a node unless it is already queued or running
    pub fn enqueue(&mut self, node: NodeId) -> bool {
        if self.in_flight.contains(&node) || self.ready.contains(&node) {
            return false;
        }
        self.ready.push_back(node);
        true
    }

    /// Start a new input request for `node`; older responses become stale
    pub fn next_input_seq(&mut self, node: NodeId) -> u64 {
        let seq = self.input_seq.entry(node).or_insert(0);
        *seq += 1;
        *seq
    }

    pub fn is_current_input(&self, node: NodeId, seq: u64) -> bool {
        self.input_seq.get(&node) == Some(&seq)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
