//! The engine loop.
//!
//! One tokio task owns the board and the active [`RunContext`]. Control
//! commands and node task reports arrive over channels and are applied one
//! at a time, so no state is shared with the spawned node tasks.

use crate::context::{Board, RunContext, WorkflowNode};
use crate::deps::DependencyGraph;
use crate::projection::project;
use crate::task::{resolve_inputs, spawn_execution, spawn_input_request, Resolution, TaskMessage};
use crate::validate::validate_inputs;
use crate::EngineError;
use canvascore::{
    DefinitionResolver, EventBus, ExecutionEvent, ExecutionPayload, ExecutionRequest, Executor,
    GraphSnapshot, InputAbandoned, InputRequestStatus, InputResolver, InputSubmission, NodeError,
    NodeId, NodeStatus, PendingInputRequest, RunId, RunStatus, StatusSnapshot, ValidationError,
    Value, WorkflowError,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Run,
    Pause,
    Stop,
    RetryInput(NodeId),
    Shutdown,
}

pub(crate) struct ControlMessage {
    pub command: Command,
    pub reply: oneshot::Sender<Result<(), EngineError>>,
}

/// External collaborators the engine talks to
pub(crate) struct EngineParts {
    pub graph: Arc<dyn GraphSnapshot>,
    pub definitions: Arc<dyn DefinitionResolver>,
    pub executor: Arc<dyn Executor>,
    pub inputs: Arc<dyn InputResolver>,
    pub events: Arc<EventBus>,
}

/// Where a node's input values came from
#[derive(Debug, Clone, Copy)]
enum InputSource {
    Automatic { linked: bool },
    Submitted,
}

pub(crate) struct Engine {
    graph: Arc<dyn GraphSnapshot>,
    definitions: Arc<dyn DefinitionResolver>,
    executor: Arc<dyn Executor>,
    inputs: Arc<dyn InputResolver>,
    events: Arc<EventBus>,
    max_parallel: Option<usize>,
    status: RunStatus,
    board: Board,
    run: Option<RunContext>,
    last_run_id: Option<RunId>,
    /// Accepted form values per node, reused as known form data next run
    remembered: HashMap<NodeId, HashMap<String, Value>>,
    task_tx: mpsc::UnboundedSender<TaskMessage>,
    projection: watch::Sender<StatusSnapshot>,
}

impl Engine {
    pub(crate) fn new(
        parts: EngineParts,
        max_parallel: Option<usize>,
        task_tx: mpsc::UnboundedSender<TaskMessage>,
        projection: watch::Sender<StatusSnapshot>,
    ) -> Self {
        let board = Board::idle(parts.graph.as_ref(), parts.definitions.as_ref());
        Self {
            graph: parts.graph,
            definitions: parts.definitions,
            executor: parts.executor,
            inputs: parts.inputs,
            events: parts.events,
            max_parallel,
            status: RunStatus::Stopped,
            board,
            run: None,
            last_run_id: None,
            remembered: HashMap::new(),
            task_tx,
            projection,
        }
    }

    /// Process messages until shut down or every handle is dropped
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlMessage>,
        mut tasks: mpsc::UnboundedReceiver<TaskMessage>,
    ) {
        self.publish();
        loop {
            tokio::select! {
                message = commands.recv() => {
                    let Some(ControlMessage { command, reply }) = message else {
                        debug!("all engine handles dropped");
                        break;
                    };
                    let result = self.handle_command(command);
                    self.publish();
                    let _ = reply.send(result);
                    if command == Command::Shutdown {
                        break;
                    }
                }
                Some(message) = tasks.recv() => {
                    self.handle_task(message);
                    self.publish();
                }
            }
        }
        self.abandon_run();
        info!("engine loop exited");
    }

    fn handle_command(&mut self, command: Command) -> Result<(), EngineError> {
        debug!(?command, status = %self.status, "control command");
        match command {
            Command::Run => self.start_or_resume(),
            Command::Pause => {
                self.pause();
                Ok(())
            }
            Command::Stop => {
                self.stop();
                Ok(())
            }
            Command::RetryInput(node_id) => self.retry_input(node_id),
            Command::Shutdown => {
                self.stop();
                Ok(())
            }
        }
    }

    fn handle_task(&mut self, message: TaskMessage) {
        match message {
            TaskMessage::Finished {
                run_id,
                node_id,
                result,
                duration_ms,
            } => {
                if !self.is_current(run_id) {
                    debug!(run_id = %run_id, node = %node_id, "ignoring completion from a discarded run");
                    return;
                }
                if let Some(run) = self.run.as_mut() {
                    run.in_flight.remove(&node_id);
                }
                match result {
                    Ok(output) => self.complete_node(node_id, output, duration_ms),
                    Err(err) => self.fail_node(node_id, err, true),
                }
            }
            TaskMessage::InputResolved {
                run_id,
                node_id,
                seq,
                result,
            } => {
                if !self.is_current(run_id) {
                    debug!(run_id = %run_id, node = %node_id, "ignoring input for a discarded run");
                    return;
                }
                self.accept_input(node_id, seq, result);
            }
        }
        self.drain();
        self.check_finished();
    }

    // ----- control surface -------------------------------------------------

    fn start_or_resume(&mut self) -> Result<(), EngineError> {
        match self.status {
            RunStatus::Progressing => {
                debug!("run requested while already progressing");
                Ok(())
            }
            RunStatus::Paused => {
                self.resume();
                Ok(())
            }
            RunStatus::Stopped => self.start(),
        }
    }

    fn start(&mut self) -> Result<(), EngineError> {
        let specs = self.graph.nodes();
        let links = self.graph.links();

        let mut nodes = Vec::with_capacity(specs.len());
        for spec in &specs {
            let definition = self
                .definitions
                .resolve(&spec.definition_ref)
                .ok_or_else(|| WorkflowError::UnknownDefinition {
                    node_id: spec.id,
                    definition: spec.definition_ref.clone(),
                })?;
            let mut node = WorkflowNode::from_spec(spec, definition);
            if let Some(known) = self.remembered.get(&spec.id) {
                node.form.extend(known.clone());
            }
            nodes.push(node);
        }

        let slots: Vec<(NodeId, usize)> = nodes
            .iter()
            .map(|n| (n.id, n.definition.inputs.len()))
            .collect();
        let deps = DependencyGraph::build(&slots, &links);
        if deps.has_cycle() {
            warn!(nodes = nodes.len(), "refusing to run a cyclic graph");
            return Err(WorkflowError::CyclicDependency.into());
        }

        self.abandon_run();
        self.board = Board::new(nodes, links).with_ignored(deps.ignored_links());

        let run = RunContext::new(deps);
        let run_id = run.run_id;
        info!(
            run_id = %run_id,
            nodes = specs.len(),
            ready = run.ready.len(),
            "starting run"
        );
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            nodes: specs.len(),
            timestamp: Utc::now(),
        });
        self.run = Some(run);
        self.last_run_id = None;
        self.set_run_status(RunStatus::Progressing);

        self.drain();
        self.check_finished();
        Ok(())
    }

    fn resume(&mut self) {
        info!(run_id = ?self.current_run_id(), "resuming run");
        self.set_run_status(RunStatus::Progressing);
        for node_id in self.queued() {
            if self.node_status(node_id) == Some(NodeStatus::Paused) {
                self.set_node_status(node_id, NodeStatus::Pending);
            }
        }
        self.drain();
        self.check_finished();
    }

    fn pause(&mut self) {
        if self.status != RunStatus::Progressing {
            debug!(status = %self.status, "pause ignored; run is not progressing");
            return;
        }
        self.set_run_status(RunStatus::Paused);
        for node_id in self.queued() {
            self.set_node_status(node_id, NodeStatus::Paused);
        }
    }

    fn stop(&mut self) {
        self.abandon_run();
        self.board = Board::idle(self.graph.as_ref(), self.definitions.as_ref());
        self.last_run_id = None;
        self.set_run_status(RunStatus::Stopped);
    }

    fn retry_input(&mut self, node_id: NodeId) -> Result<(), EngineError> {
        if self.run.is_none() {
            return Err(EngineError::NoActiveRun);
        }
        let status = self
            .node_status(node_id)
            .ok_or(EngineError::UnknownNode(node_id))?;
        if status != NodeStatus::Waiting {
            return Err(EngineError::NotWaiting { node_id, status });
        }

        info!(node = %node_id, "retrying input request");
        self.request_input(node_id);
        Ok(())
    }

    // ----- scheduling ------------------------------------------------------

    fn next_ready(&mut self) -> Option<NodeId> {
        if self.status != RunStatus::Progressing {
            return None;
        }
        if self.at_capacity() {
            return None;
        }
        self.run.as_mut()?.ready.pop_front()
    }

    fn at_capacity(&self) -> bool {
        match (self.max_parallel, self.run.as_ref()) {
            (Some(max), Some(run)) => run.in_flight.len() >= max,
            _ => false,
        }
    }

    fn drain(&mut self) {
        while let Some(node_id) = self.next_ready() {
            self.start_node(node_id);
        }
    }

    fn start_node(&mut self, node_id: NodeId) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.in_flight.contains(&node_id) {
            warn!(node = %node_id, "node already in flight; not launching twice");
            return;
        }
        let accepted = run.accepted.remove(&node_id);
        let Some(node) = self.board.node(node_id) else {
            warn!(node = %node_id, "ready node missing from board");
            return;
        };
        if !matches!(node.status, NodeStatus::Pending | NodeStatus::Paused) {
            debug!(node = %node_id, status = %node.status, "node already started");
            return;
        }
        // already validated when the submission was accepted
        if let Some(values) = accepted {
            self.launch(node_id, values);
            return;
        }

        let Some(run) = self.run.as_ref() else {
            return;
        };
        let incoming = run.deps.incoming(node_id);
        let linked = !incoming.is_empty();
        match resolve_inputs(node, incoming, &self.board, &run.results) {
            Resolution::Ready(values) => {
                self.validate_and_launch(node_id, values, InputSource::Automatic { linked })
            }
            Resolution::NeedsInput { prefill, missing } => {
                self.wait_for_input(node_id, prefill, missing)
            }
        }
    }

    fn validate_and_launch(
        &mut self,
        node_id: NodeId,
        mut values: HashMap<String, Value>,
        source: InputSource,
    ) {
        let Some(node) = self.board.node(node_id) else {
            return;
        };

        match validate_inputs(&node.definition.inputs, &mut values) {
            Ok(()) => {
                let submitted = matches!(source, InputSource::Submitted);
                if submitted {
                    self.remember_submission(node_id, &values);
                }
                let hold = submitted && self.at_capacity();
                let queued_status = match self.status {
                    RunStatus::Paused => NodeStatus::Paused,
                    _ => NodeStatus::Pending,
                };

                let Some(run) = self.run.as_mut() else {
                    return;
                };
                if let Some(pending) = run.pending_inputs.get_mut(&node_id) {
                    pending.status = InputRequestStatus::Done;
                    pending.last_error = None;
                }
                if hold {
                    debug!(
                        node = %node_id,
                        in_flight = run.in_flight.len(),
                        "parallel limit reached; queueing node with accepted input"
                    );
                    run.accepted.insert(node_id, values);
                    run.enqueue(node_id);
                    self.set_node_status(node_id, queued_status);
                    return;
                }
                self.launch(node_id, values);
            }
            // Inputs fed by upstream results pause the run like an executor
            // failure; a root node's own form data fails only that node.
            Err(err) => match source {
                InputSource::Automatic { linked } => {
                    self.fail_node(node_id, NodeError::Validation(err), linked)
                }
                InputSource::Submitted => self.reject_submission(node_id, err),
            },
        }
    }

    fn launch(&mut self, node_id: NodeId, values: HashMap<String, Value>) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let run_id = run.run_id;
        let Some(node) = self.board.node_mut(node_id) else {
            return;
        };
        run.in_flight.insert(node_id);
        node.input_values = values.clone();

        let request = ExecutionRequest {
            node_id,
            executor_ref: node.executor_ref.clone(),
            payload: ExecutionPayload {
                input_values: values,
                property_values: node.property_values.clone(),
            },
            events: self.events.create_emitter(run_id, node_id),
        };
        info!(
            run_id = %run_id,
            node = %node_id,
            executor = %request.executor_ref,
            "launching node"
        );

        self.set_node_status(node_id, NodeStatus::Progressing);
        spawn_execution(self.executor.clone(), request, run_id, self.task_tx.clone());
    }

    fn complete_node(&mut self, node_id: NodeId, output: Value, duration_ms: u64) {
        let Some(node) = self.board.node_mut(node_id) else {
            return;
        };
        if !node.set_output(output.clone()) {
            warn!(node = %node_id, "node already has an output; ignoring duplicate completion");
            return;
        }
        self.set_node_status(node_id, NodeStatus::Done);

        let Some(run) = self.run.as_mut() else {
            return;
        };
        let run_id = run.run_id;
        info!(run_id = %run_id, node = %node_id, duration_ms, "node completed");
        run.results.insert(node_id, output.clone());
        let released = run.deps.complete(node_id);

        self.events.emit(ExecutionEvent::NodeCompleted {
            run_id,
            node_id,
            output,
            duration_ms,
            timestamp: Utc::now(),
        });

        for next in released {
            debug!(node = %next, from = %node_id, "dependencies satisfied");
            if let Some(run) = self.run.as_mut() {
                run.enqueue(next);
            }
            if self.status == RunStatus::Paused {
                self.set_node_status(next, NodeStatus::Paused);
            }
        }
    }

    fn fail_node(&mut self, node_id: NodeId, err: NodeError, pause_run: bool) {
        let Some(run_id) = self.run.as_ref().map(|r| r.run_id) else {
            return;
        };
        error!(run_id = %run_id, node = %node_id, error = %err, "node failed");
        self.set_node_status(node_id, NodeStatus::Error);
        self.events.emit(ExecutionEvent::NodeFailed {
            run_id,
            node_id,
            error: err.to_string(),
            timestamp: Utc::now(),
        });
        if pause_run {
            self.pause();
        }
    }

    fn check_finished(&mut self) {
        if self.status != RunStatus::Progressing {
            return;
        }
        let Some(run) = self.run.as_ref() else {
            return;
        };
        if !run.ready.is_empty()
            || !run.in_flight.is_empty()
            || self.board.any_with_status(NodeStatus::Waiting)
        {
            return;
        }

        let run_id = run.run_id;
        let duration_ms = run.elapsed_ms();
        let success = !self.board.any_with_status(NodeStatus::Error);
        info!(run_id = %run_id, success, duration_ms, "run finished");
        self.events.emit(ExecutionEvent::RunCompleted {
            run_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        self.run = None;
        self.last_run_id = Some(run_id);
        self.set_run_status(RunStatus::Stopped);
    }

    // ----- user input ------------------------------------------------------

    fn wait_for_input(
        &mut self,
        node_id: NodeId,
        prefill: HashMap<String, Value>,
        missing: Vec<String>,
    ) {
        // linked ports are filled from upstream results, never from the form
        let linked = self.linked_ports(node_id);
        let Some(schema) = self.board.node(node_id).map(|n| {
            n.definition
                .inputs
                .iter()
                .filter(|port| !linked.contains(&port.name))
                .cloned()
                .collect::<Vec<_>>()
        }) else {
            return;
        };
        let Some(run) = self.run.as_mut() else {
            return;
        };
        info!(run_id = %run.run_id, node = %node_id, ?missing, "node waiting for user input");
        run.pending_inputs
            .insert(node_id, PendingInputRequest::new(node_id, schema, prefill));

        self.set_node_status(node_id, NodeStatus::Waiting);
        self.request_input(node_id);
    }

    fn request_input(&mut self, node_id: NodeId) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let run_id = run.run_id;
        let seq = run.next_input_seq(node_id);
        let Some(pending) = run.pending_inputs.get_mut(&node_id) else {
            warn!(node = %node_id, "no input form published for node");
            return;
        };
        pending.status = InputRequestStatus::Pending;
        let request = pending.to_request();

        self.events.emit(ExecutionEvent::InputRequested {
            run_id,
            node_id,
            schema: request.schema.clone(),
            prefill: request.prefill.clone(),
            timestamp: Utc::now(),
        });
        spawn_input_request(self.inputs.clone(), request, run_id, seq, self.task_tx.clone());
    }

    fn accept_input(
        &mut self,
        node_id: NodeId,
        seq: u64,
        result: Result<InputSubmission, InputAbandoned>,
    ) {
        let linked = self.linked_ports(node_id);
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if !run.is_current_input(node_id, seq) {
            debug!(node = %node_id, seq, "ignoring response to a superseded input request");
            return;
        }
        let waiting = self
            .board
            .node(node_id)
            .map_or(false, |n| n.status == NodeStatus::Waiting);
        let Some(pending) = run.pending_inputs.get_mut(&node_id) else {
            return;
        };
        if !waiting {
            debug!(node = %node_id, "input arrived for a node that is no longer waiting");
            return;
        }

        match result {
            Ok(submission) => {
                let mut values = submission.values;
                values.retain(|field, _| {
                    let fed_by_link = linked.contains(field);
                    if fed_by_link {
                        debug!(node = %node_id, field = %field, "ignoring submitted value for a linked port");
                    }
                    !fed_by_link
                });
                pending.prefill.extend(values);
                let values = pending.prefill.clone();
                self.validate_and_launch(node_id, values, InputSource::Submitted);
            }
            Err(abandoned) => {
                pending.status = InputRequestStatus::Waiting;
                info!(node = %node_id, reason = %abandoned, "input abandoned; node keeps waiting");
            }
        }
    }

    /// Input ports of `node_id` fed by a link in the active run
    fn linked_ports(&self, node_id: NodeId) -> HashSet<String> {
        let (Some(run), Some(node)) = (self.run.as_ref(), self.board.node(node_id)) else {
            return HashSet::new();
        };
        run.deps
            .incoming(node_id)
            .iter()
            .filter_map(|link| node.definition.input_slot(link.to_slot))
            .map(|port| port.name.clone())
            .collect()
    }

    /// Keep what the user entered so the next run starts from it
    fn remember_submission(&mut self, node_id: NodeId, values: &HashMap<String, Value>) {
        let linked = self.linked_ports(node_id);
        let known = self.remembered.entry(node_id).or_default();
        for (field, value) in values {
            if !linked.contains(field) {
                known.insert(field.clone(), value.clone());
            }
        }
    }

    fn reject_submission(&mut self, node_id: NodeId, err: ValidationError) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        warn!(node = %node_id, error = %err, "submitted input rejected");
        if let Some(pending) = run.pending_inputs.get_mut(&node_id) {
            pending.status = InputRequestStatus::Waiting;
            pending.last_error = Some(err.to_string());
        }
        self.events.emit(ExecutionEvent::InputRejected {
            run_id: run.run_id,
            node_id,
            error: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    // ----- bookkeeping -----------------------------------------------------

    fn abandon_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        for (node_id, pending) in &run.pending_inputs {
            if pending.status == InputRequestStatus::Pending {
                self.inputs.cancel(*node_id);
            }
        }
        info!(
            run_id = %run.run_id,
            in_flight = run.in_flight.len(),
            "discarding run context"
        );
    }

    fn is_current(&self, run_id: RunId) -> bool {
        self.run.as_ref().map_or(false, |run| run.run_id == run_id)
    }

    fn current_run_id(&self) -> Option<RunId> {
        self.run.as_ref().map(|run| run.run_id).or(self.last_run_id)
    }

    fn queued(&self) -> Vec<NodeId> {
        self.run
            .as_ref()
            .map(|run| run.ready.iter().copied().collect())
            .unwrap_or_default()
    }

    fn node_status(&self, node_id: NodeId) -> Option<NodeStatus> {
        self.board.node(node_id).map(|n| n.status)
    }

    fn set_node_status(&mut self, node_id: NodeId, status: NodeStatus) {
        let Some(node) = self.board.node_mut(node_id) else {
            return;
        };
        if node.status == status {
            return;
        }
        debug!(node = %node_id, label = %node.label(), from = %node.status, to = %status, "node status");
        node.status = status;

        if let Some(run_id) = self.run.as_ref().map(|run| run.run_id) {
            self.events.emit(ExecutionEvent::NodeStatusChanged {
                run_id,
                node_id,
                status,
                timestamp: Utc::now(),
            });
        }
    }

    fn set_run_status(&mut self, status: RunStatus) {
        if self.status == status {
            return;
        }
        info!(run_id = ?self.current_run_id(), from = %self.status, to = %status, "run status");
        self.status = status;
        self.events.emit(ExecutionEvent::RunStatusChanged {
            run_id: self.current_run_id(),
            status,
            timestamp: Utc::now(),
        });
    }

    fn publish(&self) {
        let mut pending: Vec<PendingInputRequest> = self
            .run
            .as_ref()
            .map(|run| {
                run.pending_inputs
                    .values()
                    .filter(|p| p.status != InputRequestStatus::Done)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        pending.sort_by_key(|p| {
            self.board
                .nodes()
                .iter()
                .position(|n| n.id == p.node_id)
        });

        let snapshot = project(self.current_run_id(), self.status, &self.board, pending);
        self.projection.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
