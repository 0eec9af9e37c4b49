//! HTTP gateway for Colloquy.
//!
//! Exposes the agent runtime over two routes: `POST /chat` accepts a
//! message with optional history and session id and answers with a
//! Server-Sent Event stream (`text`, `done`, `error`), and
//! `GET /health` reports liveness.
//!
//! Built on Axum for high performance async HTTP.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use colloquy_agent::{AgentRuntime, build_rag_system_prompt};
use colloquy_config::AppConfig;
use colloquy_core::message::ChatMessage;
use colloquy_core::model::{Model, ModelContext, UsageMetrics};
use colloquy_core::retrieval::Retriever;
use colloquy_core::tool::ToolRegistry;
use colloquy_memory::{PgMemoryStore, PgVectorRetriever, PgVectorStore};
use colloquy_models::{OpenAiCompatEmbedding, OpenAiCompatModel};

/// Shared application state for the gateway.
///
/// Everything here is read-only after startup; per-request state
/// (session memory, the SSE channel) is built inside the handler.
pub struct AppState {
    pub config: AppConfig,
    pub model: Arc<dyn Model>,
    pub tools: Arc<ToolRegistry>,
    pub pool: Option<PgPool>,
    pub retriever: Option<Arc<dyn Retriever>>,
}

type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Builds the model backend and tool registry once and shares them
/// across requests. Session memory and retrieval activate only when a
/// `database_url` is configured; the idempotent schema migration runs
/// on every boot.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let model: Arc<dyn Model> = Arc::new(OpenAiCompatModel::from_config(&config)?);
    let tools = Arc::new(colloquy_tools::default_registry());

    let pool = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            colloquy_memory::migrate(&pool).await?;
            info!("Session memory enabled");
            Some(pool)
        }
        None => {
            info!("No database_url configured, session memory disabled");
            None
        }
    };

    let retriever: Option<Arc<dyn Retriever>> = match (&pool, config.retrieval.enabled) {
        (Some(pool), true) => {
            let embedder = Arc::new(OpenAiCompatEmbedding::from_config(&config)?);
            let store = PgVectorStore::from_pool(pool.clone());
            info!(top_k = config.retrieval.top_k, "Retrieval enabled");
            Some(Arc::new(PgVectorRetriever::new(store, embedder)))
        }
        _ => None,
    };

    let state = Arc::new(AppState {
        model,
        tools,
        pool,
        retriever,
        config,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,

    /// Base instruction prepended to the assembled system prompt
    #[serde(default)]
    system_prompt: Option<String>,

    /// Memory session key; a fresh UUID is minted when absent
    #[serde(default)]
    session_id: Option<String>,

    /// Prior transcript to continue from
    #[serde(default)]
    history: Vec<ChatMessage>,
}

/// Events bridged from the agent run to the SSE response.
enum ChatEvent {
    Text(String),
    Done { usage: Option<UsageMetrics> },
    Error(String),
}

/// Handle `POST /chat`: run the agent loop, streaming the answer as SSE.
///
/// The stream carries `text` events while the final answer is being
/// generated, then exactly one terminal event: `done` with accumulated
/// usage on success, `error` with a message on failure. The connection
/// closes after the terminal event either way.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let session_id = payload
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(
        session_id = %session_id,
        message_len = payload.message.len(),
        history_len = payload.history.len(),
        "Chat request"
    );

    let mut messages = payload.history;
    messages.push(ChatMessage::user(&payload.message));

    // Ground the base instruction in retrieved chunks up front; the
    // runtime folds session memory into the same prompt later.
    let base_prompt = payload.system_prompt.unwrap_or_default();
    let system_prompt = match &state.retriever {
        Some(retriever) => {
            let chunks = match retriever
                .retrieve(&payload.message, state.config.retrieval.top_k)
                .await
            {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(error = %e, "Retrieval failed, answering without context");
                    Vec::new()
                }
            };
            build_rag_system_prompt(&chunks, &[], Some(&base_prompt))
        }
        None => base_prompt,
    };

    let mut context = ModelContext::new(messages).with_tools(state.tools.definitions());
    if !system_prompt.is_empty() {
        context = context.with_system_prompt(system_prompt);
    }
    context.temperature = Some(state.config.default_temperature);
    context.max_tokens = Some(state.config.default_max_tokens);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let chunk_tx = tx.clone();
    let mut runtime = AgentRuntime::new(state.tools.clone())
        .with_max_iterations(state.config.max_iterations)
        .with_chunk_handler(move |text: &str| {
            let _ = chunk_tx.send(ChatEvent::Text(text.to_string()));
        });

    if let Some(pool) = &state.pool {
        let store = PgMemoryStore::from_pool(pool.clone(), &session_id);
        runtime = runtime.with_memory(Arc::new(store));
    }

    let model = state.model.clone();
    tokio::spawn(async move {
        match runtime.run(model.as_ref(), context).await {
            Ok(result) => {
                let _ = tx.send(ChatEvent::Done {
                    usage: result.usage,
                });
            }
            Err(e) => {
                error!(error = %e, session_id = %session_id, "Agent run failed");
                let _ = tx.send(ChatEvent::Error(e.to_string()));
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let (name, data) = match event {
            ChatEvent::Text(content) => ("text", serde_json::json!({ "content": content })),
            ChatEvent::Done { usage } => ("done", serde_json::json!({ "usage": usage })),
            ChatEvent::Error(message) => ("error", serde_json::json!({ "message": message })),
        };
        Ok(SseEvent::default().event(name).data(data.to_string()))
    });

    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use colloquy_core::error::ModelError;
    use colloquy_core::model::ModelResult;

    /// Mock backend answering every request with a fixed text.
    struct FixedModel {
        text: String,
    }

    #[async_trait::async_trait]
    impl Model for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _context: ModelContext) -> Result<ModelResult, ModelError> {
            Ok(ModelResult {
                output: self.text.clone(),
                tool_calls: Vec::new(),
                usage: Some(UsageMetrics {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                    duration_ms: 3,
                }),
            })
        }
    }

    /// Mock backend failing every request.
    struct BrokenModel;

    #[async_trait::async_trait]
    impl Model for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }

        async fn generate(&self, _context: ModelContext) -> Result<ModelResult, ModelError> {
            Err(ModelError::ApiError {
                status_code: 500,
                message: "model failure".into(),
            })
        }
    }

    fn test_state(model: Arc<dyn Model>) -> SharedState {
        Arc::new(AppState {
            config: AppConfig::default(),
            model,
            tools: Arc::new(colloquy_tools::default_registry()),
            pool: None,
            retriever: None,
        })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(Arc::new(FixedModel {
            text: "unused".into(),
        })));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn chat_streams_text_then_done() {
        let app = build_router(test_state(Arc::new(FixedModel {
            text: "Hello".into(),
        })));

        let body = serde_json::json!({ "message": "Hi" });
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Collecting the body waits for the stream to close, so this
        // also proves the connection ends after the terminal event.
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("event: text"), "missing text event: {text}");
        assert!(text.contains("\"content\":\"Hello\""), "missing content: {text}");
        assert!(text.contains("event: done"), "missing done event: {text}");

        let done_pos = text.find("event: done").unwrap();
        let text_pos = text.find("event: text").unwrap();
        assert!(text_pos < done_pos, "done must come last: {text}");
    }

    #[tokio::test]
    async fn chat_reports_model_failure_as_error_event() {
        let app = build_router(test_state(Arc::new(BrokenModel)));

        let body = serde_json::json!({ "message": "Hi" });
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("event: error"), "missing error event: {text}");
        assert!(text.contains("model failure"), "missing message: {text}");
        assert!(!text.contains("event: done"), "no done after error: {text}");
    }

    #[tokio::test]
    async fn chat_rejects_missing_message() {
        let app = build_router(test_state(Arc::new(FixedModel {
            text: "unused".into(),
        })));

        let body = serde_json::json!({ "session_id": "abc" });
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn chat_accepts_history_and_session() {
        let app = build_router(test_state(Arc::new(FixedModel {
            text: "Continuing".into(),
        })));

        let body = serde_json::json!({
            "message": "And then?",
            "session_id": "session-1",
            "system_prompt": "Be brief.",
            "history": [
                { "role": "user", "content": "Tell me a story." },
                { "role": "assistant", "content": "Once upon a time." }
            ]
        });
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("\"content\":\"Continuing\""), "{text}");
        assert!(text.contains("event: done"), "{text}");
    }
}
