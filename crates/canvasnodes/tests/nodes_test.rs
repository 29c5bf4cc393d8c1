use canvascore::{
    EventBus, Node, NodeContext, NodeError, NodeSpec, NodeStatus, RunStatus, Value, Workflow,
};
use canvasengine::{ChannelInputResolver, NodeFactory, Runtime, RuntimeConfig};
use canvasnodes::{
    standard_registry, DebugNode, DelayNodeFactory, JsonParseNode, JsonStringifyNode,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Helper function to create a test context
fn create_test_context(inputs: HashMap<String, Value>) -> NodeContext {
    let event_bus = Arc::new(EventBus::new(100));
    let run_id = uuid::Uuid::new_v4();
    let node_id = uuid::Uuid::new_v4();

    let mut ctx = NodeContext::new(node_id, event_bus.create_emitter(run_id, node_id));
    ctx.inputs = inputs;
    ctx
}

fn input(name: &str, value: impl Into<Value>) -> HashMap<String, Value> {
    HashMap::from([(name.to_string(), value.into())])
}

#[tokio::test]
async fn test_json_parse_returns_structured_value() {
    let ctx = create_test_context(input("json", r#"{"answer": 42}"#));

    let output = JsonParseNode.execute(ctx).await.unwrap();
    assert_eq!(output, Value::Json(serde_json::json!({"answer": 42})));
}

#[tokio::test]
async fn test_json_parse_rejects_non_string_input() {
    let ctx = create_test_context(input("json", 3.0));

    let err = JsonParseNode.execute(ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::InvalidInputType { ref actual, .. } if actual == "number"));
}

#[tokio::test]
async fn test_json_stringify_compact() {
    let mut ctx = create_test_context(input(
        "value",
        Value::Array(vec![Value::from(1.0), Value::from("two")]),
    ));
    ctx.properties.insert("pretty".to_string(), Value::Bool(false));

    let output = JsonStringifyNode.execute(ctx).await.unwrap();
    assert_eq!(output, Value::from(r#"[1.0,"two"]"#));
}

#[tokio::test]
async fn test_debug_passes_message_through() {
    let ctx = create_test_context(input("message", "hello"));
    let output = DebugNode.execute(ctx).await.unwrap();
    assert_eq!(output, Value::from("hello"));
}

#[test]
fn test_delay_rejects_negative_duration() {
    let properties = HashMap::from([("delay_ms".to_string(), Value::from(-5.0))]);
    assert!(matches!(
        DelayNodeFactory.create(&properties),
        Err(NodeError::Configuration(_))
    ));
}

#[test]
fn test_standard_registry_lists_every_node() {
    let registry = standard_registry();
    assert_eq!(
        registry.list_node_types(),
        vec![
            "debug.log",
            "input.select",
            "input.text",
            "time.delay",
            "transform.json_parse",
            "transform.json_stringify",
        ]
    );
}

#[tokio::test]
async fn test_text_input_feeds_parser_end_to_end() {
    let mut workflow = Workflow::new("ask and parse");
    let ask = workflow.add_node(NodeSpec::new("input.text"));
    let parse = workflow.add_node(NodeSpec::new("transform.json_parse"));
    let delay = workflow.add_node(NodeSpec::new("time.delay").with_property("delay_ms", 5.0));
    let log = workflow.add_node(NodeSpec::new("debug.log"));
    workflow.connect(ask, 0, parse, 0);
    workflow.connect(parse, 0, delay, 0);
    workflow.connect(delay, 0, log, 0);

    let runtime = Runtime::new(Arc::new(standard_registry()), RuntimeConfig::default());
    let inputs = Arc::new(ChannelInputResolver::new());
    let engine = runtime.spawn_engine(Arc::new(workflow), inputs.clone());
    engine.run().await.unwrap();

    inputs.wait_for_request(ask).await;
    inputs
        .submit(ask, input("text", r#"[1, 2, 3]"#))
        .unwrap();

    let done = tokio::time::timeout(
        Duration::from_secs(5),
        engine.wait_for(|s| s.run_status == RunStatus::Stopped && s.count(NodeStatus::Done) == 4),
    )
    .await
    .expect("workflow did not finish")
    .unwrap();

    assert_eq!(
        done.node(log).unwrap().output,
        Some(Value::Json(serde_json::json!([1, 2, 3])))
    );
}

#[tokio::test]
async fn test_select_input_rejects_too_many_choices() {
    let mut workflow = Workflow::new("pick");
    let pick = workflow.add_node(NodeSpec::new("input.select"));

    let runtime = Runtime::new(Arc::new(standard_registry()), RuntimeConfig::default());
    let inputs = Arc::new(ChannelInputResolver::new());
    let engine = runtime.spawn_engine(Arc::new(workflow), inputs.clone());
    engine.run().await.unwrap();

    inputs.wait_for_request(pick).await;
    let four = Value::Array(["a", "b", "c", "d"].into_iter().map(Value::from).collect());
    inputs.submit(pick, input("choices", four)).unwrap();

    let rejected = tokio::time::timeout(
        Duration::from_secs(5),
        engine.wait_for(|s| s.pending_input(pick).map_or(false, |p| p.last_error.is_some())),
    )
    .await
    .expect("submission was not rejected")
    .unwrap();
    assert_eq!(rejected.node_status(pick), Some(NodeStatus::Waiting));
}
