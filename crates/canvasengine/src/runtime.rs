use crate::control::EngineHandle;
use crate::registry::NodeRegistry;
use crate::scheduler::EngineParts;
use canvascore::{DefinitionResolver, EventBus, ExecutionEvent, Executor, GraphSnapshot, InputResolver};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Entry point for running workflows.
///
/// Holds the definition resolver, the executor and the event bus shared by
/// every engine it spawns.
pub struct Runtime {
    definitions: Arc<dyn DefinitionResolver>,
    executor: Arc<dyn Executor>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Runtime whose node types all come from `registry`
    pub fn new(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self::with_parts(registry.clone(), registry, config)
    }

    /// Runtime with separately supplied definition and executor sources
    pub fn with_parts(
        definitions: Arc<dyn DefinitionResolver>,
        executor: Arc<dyn Executor>,
        config: RuntimeConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            definitions,
            executor,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Spawn an engine over `graph`. Must be called inside a tokio runtime.
    ///
    /// The graph is re-read at each fresh run and each stop, so edits made
    /// through `graph` between runs are picked up.
    pub fn spawn_engine(
        &self,
        graph: Arc<dyn GraphSnapshot>,
        inputs: Arc<dyn InputResolver>,
    ) -> EngineHandle {
        let parts = EngineParts {
            graph,
            definitions: self.definitions.clone(),
            executor: self.executor.clone(),
            inputs,
            events: self.event_bus.clone(),
        };
        EngineHandle::spawn(parts, self.config.max_parallel_nodes, self.config.command_buffer)
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Cap on concurrently executing nodes; `None` means unbounded
    pub max_parallel_nodes: Option<usize>,
    pub event_buffer_size: usize,
    pub command_buffer: usize,
}

impl RuntimeConfig {
    /// Defaults overridden by `CANVAS_MAX_PARALLEL` and `CANVAS_EVENT_BUFFER`.
    ///
    /// `CANVAS_MAX_PARALLEL=0` removes the cap. Unparseable values are
    /// ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max) = env_usize("CANVAS_MAX_PARALLEL") {
            config.max_parallel_nodes = (max > 0).then_some(max);
        }
        if let Some(size) = env_usize("CANVAS_EVENT_BUFFER") {
            config.event_buffer_size = size.max(1);
        }
        config
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: Some(10),
            event_buffer_size: 1000,
            command_buffer: 64,
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}
