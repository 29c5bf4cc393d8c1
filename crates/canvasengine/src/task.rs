//! Per-node work: input resolution and the spawned executor/input futures.

use crate::context::{Board, WorkflowNode};
use canvascore::{
    ExecutionRequest, Executor, InputAbandoned, InputRequest, InputResolver, InputSubmission,
    Link, NodeError, NodeId, RunId, Value,
};
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Completion reports sent from node tasks back to the engine loop
#[derive(Debug)]
pub(crate) enum TaskMessage {
    Finished {
        run_id: RunId,
        node_id: NodeId,
        result: Result<Value, NodeError>,
        duration_ms: u64,
    },
    InputResolved {
        run_id: RunId,
        node_id: NodeId,
        seq: u64,
        result: Result<InputSubmission, InputAbandoned>,
    },
}

#[derive(Debug, PartialEq)]
pub(crate) enum Resolution {
    /// Every required input has a value
    Ready(HashMap<String, Value>),
    /// Some required inputs have neither a link nor a value
    NeedsInput {
        prefill: HashMap<String, Value>,
        missing: Vec<String>,
    },
}

/// Resolve a node's input values.
///
/// Linked ports take the upstream node's stored output; other ports fall
/// back to the node's known form data.
pub(crate) fn resolve_inputs(
    node: &WorkflowNode,
    incoming: &[Link],
    board: &Board,
    results: &HashMap<NodeId, Value>,
) -> Resolution {
    let mut values = node.form.clone();
    let mut linked = HashSet::new();

    for link in incoming {
        let Some(port) = node.definition.input_slot(link.to_slot) else {
            continue;
        };
        linked.insert(port.name.as_str());
        if let Some(output) = results.get(&link.from_node) {
            let value = board
                .node(link.from_node)
                .map(|upstream| select_output(upstream, link.from_slot, output))
                .unwrap_or_else(|| output.clone());
            values.insert(port.name.clone(), value);
        }
    }

    let missing: Vec<String> = node
        .definition
        .inputs
        .iter()
        .filter(|port| port.required && !linked.contains(port.name.as_str()))
        .filter(|port| values.get(&port.name).map_or(true, Value::is_empty))
        .map(|port| port.name.clone())
        .collect();

    if missing.is_empty() {
        Resolution::Ready(values)
    } else {
        Resolution::NeedsInput {
            prefill: values,
            missing,
        }
    }
}

/// Pick what flows out of `from_slot`.
///
/// Nodes with several declared outputs return an object keyed by port name;
/// single-output nodes pass their whole result.
fn select_output(upstream: &WorkflowNode, from_slot: usize, output: &Value) -> Value {
    let outputs = &upstream.definition.outputs;
    if outputs.len() > 1 {
        if let (Some(port), Some(map)) = (outputs.get(from_slot), output.as_object()) {
            return map.get(&port.name).cloned().unwrap_or(Value::Null);
        }
    }
    output.clone()
}

/// Run the executor for one node and report back to the engine.
///
/// A panicking executor is reported as an execution failure.
pub(crate) fn spawn_execution(
    executor: Arc<dyn Executor>,
    request: ExecutionRequest,
    run_id: RunId,
    tx: mpsc::UnboundedSender<TaskMessage>,
) {
    let node_id = request.node_id;
    tokio::spawn(async move {
        let start = Instant::now();
        let result = AssertUnwindSafe(executor.execute(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(NodeError::ExecutionFailed(format!(
                    "executor panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        let duration_ms = start.elapsed().as_millis() as u64;

        // The engine may have shut down meanwhile; nothing left to report to.
        let _ = tx.send(TaskMessage::Finished {
            run_id,
            node_id,
            result,
            duration_ms,
        });
    });
}

/// Ask the input resolver for a node's values and report back to the engine.
pub(crate) fn spawn_input_request(
    resolver: Arc<dyn InputResolver>,
    request: InputRequest,
    run_id: RunId,
    seq: u64,
    tx: mpsc::UnboundedSender<TaskMessage>,
) {
    let node_id = request.node_id;
    tokio::spawn(async move {
        let result = resolver.request(request).await;
        let _ = tx.send(TaskMessage::InputResolved {
            run_id,
            node_id,
            seq,
            result,
        });
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::{FieldKind, InputPort, NodeDefinition, NodeSpec};
    use uuid::Uuid;

    fn node(definition: NodeDefinition) -> WorkflowNode {
        WorkflowNode::from_spec(&NodeSpec::new("test"), definition)
    }

    #[test]
    fn linked_port_takes_upstream_output_over_form_data() {
        let upstream = node(NodeDefinition::default().with_output("out"));
        let mut target = node(
            NodeDefinition::default().with_input(InputPort::new("text", FieldKind::Text).required()),
        );
        target.form.insert("text".into(), Value::from("typed"));

        let link = Link {
            id: Uuid::new_v4(),
            from_node: upstream.id,
            from_slot: 0,
            to_node: target.id,
            to_slot: 0,
        };
        let results = HashMap::from([(upstream.id, Value::from("computed"))]);
        let board = Board::new(vec![upstream, target.clone()], vec![link.clone()]);

        let resolution = resolve_inputs(&target, &[link], &board, &results);
        assert_eq!(
            resolution,
            Resolution::Ready(HashMap::from([("text".to_string(), Value::from("computed"))]))
        );
    }

    #[test]
    fn unlinked_required_port_without_value_needs_input() {
        let mut target = node(
            NodeDefinition::default()
                .with_input(InputPort::new("prompt", FieldKind::Text).required())
                .with_input(InputPort::new("note", FieldKind::Text)),
        );
        target.form.insert("note".into(), Value::from("keep me"));
        let board = Board::new(vec![target.clone()], vec![]);

        match resolve_inputs(&target, &[], &board, &HashMap::new()) {
            Resolution::NeedsInput { prefill, missing } => {
                assert_eq!(missing, vec!["prompt".to_string()]);
                assert_eq!(prefill.get("note"), Some(&Value::from("keep me")));
            }
            other => panic!("expected NeedsInput, got {:?}", other),
        }
    }

    #[test]
    fn multi_output_upstream_selects_port_by_slot() {
        let upstream = node(
            NodeDefinition::default()
                .with_output("left")
                .with_output("right"),
        );
        let target = node(NodeDefinition::default().with_input(InputPort::new("in", FieldKind::Any)));
        let link = Link {
            id: Uuid::new_v4(),
            from_node: upstream.id,
            from_slot: 1,
            to_node: target.id,
            to_slot: 0,
        };
        let output = Value::Object(HashMap::from([
            ("left".to_string(), Value::from(1.0)),
            ("right".to_string(), Value::from(2.0)),
        ]));
        let results = HashMap::from([(upstream.id, output)]);
        let board = Board::new(vec![upstream, target.clone()], vec![link.clone()]);

        assert_eq!(
            resolve_inputs(&target, &[link], &board, &results),
            Resolution::Ready(HashMap::from([("in".to_string(), Value::from(2.0))]))
        );
    }
}
