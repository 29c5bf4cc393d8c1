//! Control surface of a running engine.

use crate::scheduler::{Command, ControlMessage, Engine, EngineParts};
use crate::EngineError;
use canvascore::{EventBus, ExecutionEvent, NodeId, StatusSnapshot};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Cloneable handle to an engine task.
///
/// Commands are applied in the order they are received. Each command's
/// effects are visible in [`EngineHandle::snapshot`] once its future
/// resolves.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<ControlMessage>,
    status: watch::Receiver<StatusSnapshot>,
    events: Arc<EventBus>,
}

impl EngineHandle {
    pub(crate) fn spawn(parts: EngineParts, max_parallel: Option<usize>, command_buffer: usize) -> Self {
        let (commands, command_rx) = mpsc::channel(command_buffer.max(1));
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (projection, status) = watch::channel(StatusSnapshot::default());
        let events = parts.events.clone();

        let engine = Engine::new(parts, max_parallel, task_tx, projection);
        tokio::spawn(engine.run(command_rx, task_rx));

        Self {
            commands,
            status,
            events,
        }
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(ControlMessage { command, reply })
            .await
            .map_err(|_| EngineError::Closed)?;
        answer.await.map_err(|_| EngineError::Closed)?
    }

    /// Start a fresh run, or resume a paused one
    pub async fn run(&self) -> Result<(), EngineError> {
        self.send(Command::Run).await
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.send(Command::Pause).await
    }

    /// Abandon the current run and reset every node to `PENDING`
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.send(Command::Stop).await
    }

    /// Re-issue the input request for a node stuck in `WAITING`
    pub async fn retry_input(&self, node_id: NodeId) -> Result<(), EngineError> {
        self.send(Command::RetryInput(node_id)).await
    }

    /// Stop the engine task. Other handles see [`EngineError::Closed`].
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(Command::Shutdown).await
    }

    /// Latest status projection
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    /// Wait until the projection satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<StatusSnapshot, EngineError>
    where
        F: FnMut(&StatusSnapshot) -> bool,
    {
        let mut status = self.status.clone();
        let snapshot = status
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| EngineError::Closed)?;
        Ok(snapshot.clone())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }
}
