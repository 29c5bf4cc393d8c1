//! Input resolver backed by in-process channels.
//!
//! The engine's request parks on a oneshot receiver until a UI layer calls
//! [`ChannelInputResolver::submit`] or [`ChannelInputResolver::dismiss`].

use crate::EngineError;
use async_trait::async_trait;
use canvascore::{
    InputAbandoned, InputRequest, InputResolver, InputSubmission, NodeId, Value,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};
use tracing::debug;

type Reply = oneshot::Sender<Result<HashMap<String, Value>, InputAbandoned>>;

struct Outstanding {
    request: InputRequest,
    reply: Reply,
}

/// At most one outstanding request per node; a newer request for the same
/// node rejects the older one with [`InputAbandoned::Superseded`].
#[derive(Default)]
pub struct ChannelInputResolver {
    outstanding: Mutex<HashMap<NodeId, Outstanding>>,
    changed: Notify,
}

impl ChannelInputResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, Outstanding>> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests currently waiting for the user
    pub fn pending(&self) -> Vec<InputRequest> {
        self.lock().values().map(|o| o.request.clone()).collect()
    }

    pub fn pending_for(&self, node_id: NodeId) -> Option<InputRequest> {
        self.lock().get(&node_id).map(|o| o.request.clone())
    }

    /// Wait until a request for `node_id` is outstanding
    pub async fn wait_for_request(&self, node_id: NodeId) -> InputRequest {
        loop {
            let changed = self.changed.notified();
            if let Some(request) = self.pending_for(node_id) {
                return request;
            }
            changed.await;
        }
    }

    /// Answer the outstanding request for `node_id`
    pub fn submit(&self, node_id: NodeId, values: HashMap<String, Value>) -> Result<(), EngineError> {
        let outstanding = self
            .lock()
            .remove(&node_id)
            .ok_or(EngineError::NoPendingInput(node_id))?;
        debug!(node = %node_id, fields = values.len(), "input submitted");
        outstanding
            .reply
            .send(Ok(values))
            .map_err(|_| EngineError::NoPendingInput(node_id))
    }

    /// Close the form for `node_id` without submitting
    pub fn dismiss(&self, node_id: NodeId) -> Result<(), EngineError> {
        let outstanding = self
            .lock()
            .remove(&node_id)
            .ok_or(EngineError::NoPendingInput(node_id))?;
        debug!(node = %node_id, "input dismissed");
        let _ = outstanding.reply.send(Err(InputAbandoned::Dismissed(node_id)));
        Ok(())
    }
}

#[async_trait]
impl InputResolver for ChannelInputResolver {
    async fn request(&self, request: InputRequest) -> Result<InputSubmission, InputAbandoned> {
        let node_id = request.node_id;
        let (reply, answer) = oneshot::channel();

        let previous = self.lock().insert(node_id, Outstanding { request, reply });
        if let Some(previous) = previous {
            let _ = previous.reply.send(Err(InputAbandoned::Superseded(node_id)));
        }
        self.changed.notify_waiters();

        match answer.await {
            Ok(Ok(values)) => Ok(InputSubmission { node_id, values }),
            Ok(Err(abandoned)) => Err(abandoned),
            Err(_) => Err(InputAbandoned::Cancelled(node_id)),
        }
    }

    fn cancel(&self, node_id: NodeId) {
        if let Some(outstanding) = self.lock().remove(&node_id) {
            let _ = outstanding.reply.send(Err(InputAbandoned::Cancelled(node_id)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn request(node_id: NodeId) -> InputRequest {
        InputRequest {
            node_id,
            schema: vec![],
            prefill: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn submit_resolves_request() {
        let resolver = Arc::new(ChannelInputResolver::new());
        let node = Uuid::new_v4();

        let waiting = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.request(request(node)).await }
        });

        resolver.wait_for_request(node).await;
        resolver
            .submit(node, HashMap::from([("text".to_string(), Value::from("hi"))]))
            .unwrap();

        let submission = waiting.await.unwrap().unwrap();
        assert_eq!(submission.values["text"], Value::from("hi"));
        assert!(resolver.pending().is_empty());
    }

    #[tokio::test]
    async fn newer_request_supersedes_older_one() {
        let resolver = Arc::new(ChannelInputResolver::new());
        let node = Uuid::new_v4();

        let first = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.request(request(node)).await }
        });
        resolver.wait_for_request(node).await;

        let second = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.request(request(node)).await }
        });

        assert_eq!(first.await.unwrap().unwrap_err(), InputAbandoned::Superseded(node));

        resolver.wait_for_request(node).await;
        resolver.dismiss(node).unwrap();
        assert_eq!(second.await.unwrap().unwrap_err(), InputAbandoned::Dismissed(node));
    }

    #[test]
    fn submit_without_request_fails() {
        let resolver = ChannelInputResolver::new();
        let node = Uuid::new_v4();
        assert_eq!(
            resolver.submit(node, HashMap::new()),
            Err(EngineError::NoPendingInput(node))
        );
    }
}
