// HTTP query service
// Thin axum surface over the chat engine: one message endpoint, one
// memory-clear endpoint, and a placeholder front-end page

pub mod chat;


use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use self::chat::ChatEngine;
use crate::llm::ChatMessage;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
}

/// Build the application router
#[inline]
pub fn create_router(engine: Arc<ChatEngine>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/get-message", post(get_message))
        .route("/clear-memory", get(clear_memory).post(clear_memory))
        .with_state(engine)
}

/// Serve the query service until the listener fails or the process stops
#[inline]
pub async fn serve(addr: SocketAddr, engine: Arc<ChatEngine>) -> Result<()> {
    let app = create_router(engine)
        .layer(TraceLayer::new_for_http())
        // TODO: Configure CORS properly for production
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Query service listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("Query service stopped unexpectedly")?;

    Ok(())
}

/// GET / - placeholder front-end page
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// POST /get-message - answer one user query
async fn get_message(
    State(engine): State<Arc<ChatEngine>>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<ChatMessage>, StatusCode> {
    let query = request
        .query
        .unwrap_or_else(|| "No query provided".to_string());

    match engine.answer(&query).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            error!("Failed to answer query: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET|POST /clear-memory - reset the conversation transcript
async fn clear_memory(State(engine): State<Arc<ChatEngine>>) -> Json<ClearResponse> {
    engine.clear_memory().await;
    Json(ClearResponse {
        status: "Memory cleared",
    })
}
