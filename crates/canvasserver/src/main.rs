mod live;

use actix_cors::Cors;
use actix_web::{
    delete, get, http::StatusCode, post, put, web, App, HttpResponse, HttpServer, Responder,
    ResponseError, Result as ActixResult,
};
use actix_ws::Message;
use canvascore::{DefinitionResolver, NodeId, Value, Workflow};
use canvasengine::{
    ChannelInputResolver, EngineError, EngineHandle, NodeRegistry, Runtime, RuntimeConfig,
};
use live::LiveGraph;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Application state shared across handlers
struct AppState {
    registry: Arc<NodeRegistry>,
    graph: Arc<LiveGraph>,
    engine: EngineHandle,
    inputs: Arc<ChannelInputResolver>,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError(EngineError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            EngineError::Workflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::NoActiveRun | EngineError::NotWaiting { .. } => StatusCode::CONFLICT,
            EngineError::UnknownNode(_) | EngineError::NoPendingInput(_) => StatusCode::NOT_FOUND,
            EngineError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.0.to_string(),
        })
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "canvasserver"
    }))
}

/// The workflow on the canvas
#[get("/api/workflow")]
async fn get_workflow(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.graph.current().as_ref())
}

/// Replace the workflow. A running run keeps its graph; the change is
/// picked up by the next run or stop.
#[put("/api/workflow")]
async fn put_workflow(data: web::Data<AppState>, workflow: web::Json<Workflow>) -> impl Responder {
    let workflow = workflow.into_inner();
    let summary = serde_json::json!({
        "id": workflow.id,
        "name": workflow.name,
        "nodes": workflow.nodes.len(),
        "links": workflow.links.len(),
    });
    data.graph.replace(workflow);
    HttpResponse::Ok().json(summary)
}

/// Start a run, or resume a paused one
#[post("/api/run")]
async fn run(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.engine.run().await?;
    Ok(HttpResponse::Ok().json(data.engine.snapshot()))
}

#[post("/api/pause")]
async fn pause(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.engine.pause().await?;
    Ok(HttpResponse::Ok().json(data.engine.snapshot()))
}

#[post("/api/stop")]
async fn stop(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.engine.stop().await?;
    Ok(HttpResponse::Ok().json(data.engine.snapshot()))
}

/// Status projection of every node and link
#[get("/api/status")]
async fn status(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.engine.snapshot())
}

/// Input forms published by the current run
#[get("/api/inputs")]
async fn pending_inputs(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.engine.snapshot().pending_inputs)
}

/// Re-open the input form of a waiting node
#[post("/api/nodes/{id}/retry")]
async fn retry_input(
    data: web::Data<AppState>,
    path: web::Path<NodeId>,
) -> Result<HttpResponse, ApiError> {
    data.engine.retry_input(path.into_inner()).await?;
    Ok(HttpResponse::Accepted().finish())
}

/// Submit form values for a node; body is an object of plain JSON values
#[post("/api/nodes/{id}/input")]
async fn submit_input(
    data: web::Data<AppState>,
    path: web::Path<NodeId>,
    body: web::Json<HashMap<String, serde_json::Value>>,
) -> Result<HttpResponse, ApiError> {
    let node_id = path.into_inner();
    let values = body
        .into_inner()
        .into_iter()
        .map(|(field, value)| (field, Value::from_plain_json(value)))
        .collect();
    data.inputs.submit(node_id, values)?;
    Ok(HttpResponse::Accepted().finish())
}

/// Close a node's input form without submitting
#[delete("/api/nodes/{id}/input")]
async fn dismiss_input(
    data: web::Data<AppState>,
    path: web::Path<NodeId>,
) -> Result<HttpResponse, ApiError> {
    data.inputs.dismiss(path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

/// WebSocket endpoint for execution events and status snapshots
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.engine.subscribe_events();
    let mut snapshots = data.engine.watch();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "WebSocket client lagging; events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    let json = serde_json::json!({ "type": "StatusSnapshot", "snapshot": snapshot });
                    if session.text(json.to_string()).await.is_err() {
                        break;
                    }
                }

                // Handle incoming WebSocket messages (ping/pong)
                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> impl Responder {
    let nodes: Vec<_> = data
        .registry
        .list_node_types()
        .into_iter()
        .map(|node_type| {
            let definition = data.registry.resolve(&node_type);
            serde_json::json!({
                "type": node_type,
                "definition": definition,
            })
        })
        .collect();

    HttpResponse::Ok().json(nodes)
}

fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(get_workflow)
        .service(put_workflow)
        .service(run)
        .service(pause)
        .service(stop)
        .service(status)
        .service(pending_inputs)
        .service(retry_input)
        .service(submit_input)
        .service(dismiss_input)
        .service(websocket_events)
        .service(list_node_types);
}

/// Build the registry, the live graph and a running engine over them.
/// Must be called inside a tokio runtime.
fn app_state(workflow: Workflow, config: RuntimeConfig) -> web::Data<AppState> {
    let registry = Arc::new(canvasnodes::standard_registry());
    let graph = Arc::new(LiveGraph::new(workflow));
    let inputs = Arc::new(ChannelInputResolver::new());

    let runtime = Runtime::new(registry.clone(), config);
    let engine = runtime.spawn_engine(graph.clone(), inputs.clone());

    web::Data::new(AppState {
        registry,
        graph,
        engine,
        inputs,
    })
}

/// Workflow from `WORKFLOW_FILE`, or an empty one
fn initial_workflow() -> anyhow::Result<Workflow> {
    match std::env::var("WORKFLOW_FILE") {
        Ok(path) => {
            info!(path = %path, "loading workflow");
            Ok(Workflow::load(&path)?)
        }
        Err(_) => Ok(Workflow::new("Untitled")),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_env("CANVAS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Starting Canvas Engine Server");

    let app_state = app_state(initial_workflow()?, RuntimeConfig::from_env());

    info!("✅ Engine started with standard nodes");

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use canvascore::{NodeSpec, NodeStatus, RunStatus, StatusSnapshot};
    use std::time::Duration;

    fn ask_workflow() -> (Workflow, NodeId, NodeId) {
        let mut workflow = Workflow::new("ask");
        let ask = workflow.add_node(NodeSpec::new("input.text").with_name("Ask"));
        let log = workflow.add_node(NodeSpec::new("debug.log").with_name("Log"));
        workflow.connect(ask, 0, log, 0);
        (workflow, ask, log)
    }

    #[actix_web::test]
    async fn test_health() {
        let state = app_state(Workflow::new("empty"), RuntimeConfig::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_run_submit_and_finish() {
        let (workflow, ask, log) = ask_workflow();
        let state = app_state(workflow, RuntimeConfig::default());
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/api/run").to_request();
        let snapshot: StatusSnapshot = test::call_and_read_body_json(&app, req).await;
        assert_eq!(snapshot.node_status(ask), Some(NodeStatus::Waiting));

        state.inputs.wait_for_request(ask).await;
        let req = test::TestRequest::post()
            .uri(&format!("/api/nodes/{}/input", ask))
            .set_json(serde_json::json!({ "text": "hello" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

        let done = tokio::time::timeout(
            Duration::from_secs(5),
            state.engine.wait_for(|s| s.run_status == RunStatus::Stopped && s.count(NodeStatus::Done) == 2),
        )
        .await
        .expect("run did not finish")
        .unwrap();
        assert_eq!(done.node(log).unwrap().output, Some(Value::from("hello")));
    }

    #[actix_web::test]
    async fn test_engine_errors_map_to_status_codes() {
        let (workflow, ask, _) = ask_workflow();
        let state = app_state(workflow, RuntimeConfig::default());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/nodes/{}/retry", ask))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/nodes/{}/input", ask))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let mut broken = Workflow::new("broken");
        broken.add_node(NodeSpec::new("no.such.node"));
        let req = test::TestRequest::put()
            .uri("/api/workflow")
            .set_json(&broken)
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::post().uri("/api/run").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
