#![allow(dead_code)]

use async_trait::async_trait;
use canvascore::{
    DefinitionResolver, ExecutionRequest, Executor, FieldKind, InputPort, NodeDefinition,
    NodeError, NodeId, NodeStatus, RunStatus, StatusSnapshot, Value, Workflow,
};
use canvasengine::{ChannelInputResolver, EngineHandle, Runtime, RuntimeConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Node types used by the tests:
///
/// - `source`: no inputs, returns its `value` property
/// - `pass`: one required input `in`, returns it
/// - `join`: required inputs `a` and `b`, returns `[a, b]`
/// - `prompt`: one required text input `text`, returns it
/// - `json`: one required json input `data`, returns it
/// - `gate`: optional input `in`; blocks until released, then behaves like `pass`
/// - `held`: like `prompt`, but blocks until released before returning
/// - `fail`: optional input `in`; always fails
/// - `panic`: optional input `in`; panics
pub struct StaticDefinitions(HashMap<String, NodeDefinition>);

impl StaticDefinitions {
    pub fn new() -> Self {
        let any_in = || InputPort::new("in", FieldKind::Any);
        let mut defs = HashMap::new();
        defs.insert(
            "source".to_string(),
            NodeDefinition::new("Emit a constant", "test").with_output("out"),
        );
        defs.insert(
            "pass".to_string(),
            NodeDefinition::new("Pass input through", "test")
                .with_input(any_in().required())
                .with_output("out"),
        );
        defs.insert(
            "join".to_string(),
            NodeDefinition::new("Join two inputs", "test")
                .with_input(InputPort::new("a", FieldKind::Any).required())
                .with_input(InputPort::new("b", FieldKind::Any).required())
                .with_output("out"),
        );
        defs.insert(
            "prompt".to_string(),
            NodeDefinition::new("Ask for text", "test")
                .with_input(InputPort::new("text", FieldKind::Text).required())
                .with_output("out"),
        );
        defs.insert(
            "json".to_string(),
            NodeDefinition::new("Parse json", "test")
                .with_input(InputPort::new("data", FieldKind::Json).required())
                .with_output("out"),
        );
        defs.insert(
            "held".to_string(),
            NodeDefinition::new("Ask for text, then wait", "test")
                .with_input(InputPort::new("text", FieldKind::Text).required())
                .with_output("out"),
        );
        for name in ["gate", "fail", "panic"] {
            defs.insert(
                name.to_string(),
                NodeDefinition::new(name, "test")
                    .with_input(any_in())
                    .with_output("out"),
            );
        }
        Self(defs)
    }
}

impl DefinitionResolver for StaticDefinitions {
    fn resolve(&self, definition_ref: &str) -> Option<NodeDefinition> {
        self.0.get(definition_ref).cloned()
    }
}

/// Executor whose behavior is chosen by the node's executor ref
pub struct ScriptedExecutor {
    calls: Mutex<Vec<(NodeId, HashMap<String, Value>)>>,
    gate: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Let `n` blocked `gate` nodes finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> Vec<(NodeId, HashMap<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, node_id: NodeId) -> usize {
        self.calls().iter().filter(|(id, _)| *id == node_id).count()
    }

    pub fn inputs_of(&self, node_id: NodeId) -> Option<HashMap<String, Value>> {
        self.calls()
            .into_iter()
            .find(|(id, _)| *id == node_id)
            .map(|(_, inputs)| inputs)
    }

    /// Highest number of executions observed running at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<Value, NodeError> {
        let inputs = request.payload.input_values.clone();
        self.calls
            .lock()
            .unwrap()
            .push((request.node_id, inputs.clone()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let result = match request.executor_ref.as_str() {
            "source" => Ok(request
                .payload
                .property_values
                .get("value")
                .cloned()
                .unwrap_or(Value::Null)),
            "pass" => Ok(inputs.get("in").cloned().unwrap_or(Value::Null)),
            "prompt" => Ok(inputs.get("text").cloned().unwrap_or(Value::Null)),
            "json" => Ok(inputs.get("data").cloned().unwrap_or(Value::Null)),
            "join" => Ok(Value::Array(vec![
                inputs.get("a").cloned().unwrap_or(Value::Null),
                inputs.get("b").cloned().unwrap_or(Value::Null),
            ])),
            "gate" => {
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
                Ok(inputs.get("in").cloned().unwrap_or(Value::from("gate")))
            }
            "held" => {
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
                Ok(inputs.get("text").cloned().unwrap_or(Value::Null))
            }
            "fail" => Err(NodeError::ExecutionFailed("boom".to_string())),
            "panic" => panic!("executor blew up"),
            other => Err(NodeError::UnknownExecutor(other.to_string())),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct Harness {
    pub engine: EngineHandle,
    pub executor: Arc<ScriptedExecutor>,
    pub inputs: Arc<ChannelInputResolver>,
}

pub fn spawn(workflow: Workflow) -> Harness {
    spawn_with(workflow, RuntimeConfig::default())
}

pub fn spawn_with(workflow: Workflow, config: RuntimeConfig) -> Harness {
    init_tracing();
    let executor = Arc::new(ScriptedExecutor::new());
    let inputs = Arc::new(ChannelInputResolver::new());
    let runtime = Runtime::with_parts(Arc::new(StaticDefinitions::new()), executor.clone(), config);
    let engine = runtime.spawn_engine(Arc::new(workflow), inputs.clone());
    Harness {
        engine,
        executor,
        inputs,
    }
}

const TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the projection to satisfy `predicate`, failing after a timeout
pub async fn until<F>(engine: &EngineHandle, predicate: F) -> StatusSnapshot
where
    F: FnMut(&StatusSnapshot) -> bool,
{
    tokio::time::timeout(TIMEOUT, engine.wait_for(predicate))
        .await
        .expect("timed out waiting for engine state")
        .expect("engine closed")
}

pub async fn until_node(engine: &EngineHandle, node: NodeId, status: NodeStatus) -> StatusSnapshot {
    until(engine, |s| s.node_status(node) == Some(status)).await
}

pub async fn until_run(engine: &EngineHandle, status: RunStatus) -> StatusSnapshot {
    until(engine, |s| s.run_status == status).await
}

pub fn text(value: &str) -> HashMap<String, Value> {
    HashMap::from([("text".to_string(), Value::from(value))])
}

/// Poll `check` until it holds, failing after a timeout
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<canvascore::ExecutionEvent>,
) -> Vec<canvascore::ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
