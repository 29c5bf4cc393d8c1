use arc_swap::ArcSwap;
use canvascore::{GraphSnapshot, Link, NodeSpec, Workflow};
use std::sync::Arc;

/// The workflow currently on the canvas.
///
/// Edits swap in a whole new workflow; the engine reads a consistent copy
/// whenever it starts a run or resets after a stop.
pub struct LiveGraph {
    current: ArcSwap<Workflow>,
}

impl LiveGraph {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            current: ArcSwap::from_pointee(workflow),
        }
    }

    pub fn current(&self) -> Arc<Workflow> {
        self.current.load_full()
    }

    pub fn replace(&self, workflow: Workflow) {
        tracing::info!(
            workflow = %workflow.id,
            nodes = workflow.nodes.len(),
            links = workflow.links.len(),
            "workflow replaced"
        );
        self.current.store(Arc::new(workflow));
    }
}

impl GraphSnapshot for LiveGraph {
    fn nodes(&self) -> Vec<NodeSpec> {
        self.current.load().nodes.clone()
    }

    fn links(&self) -> Vec<Link> {
        self.current.load().links.clone()
    }
}
