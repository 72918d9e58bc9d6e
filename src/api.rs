use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::core::Indexer;
use crate::runtime::store::BlockGateway;
use crate::upstream::ChainSource;

fn error_body(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "error": msg.into() }))).into_response()
}

async fn get_block<S: ChainSource, G: BlockGateway>(
    State(indexer): State<Arc<Indexer<S, G>>>,
    Path(raw): Path<String>,
) -> Response {
    let Ok(height) = raw.parse::<u64>() else {
        return error_body(StatusCode::BAD_REQUEST, "Invalid block height");
    };

    match indexer.get_block_details(height).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => {
            warn!(height, error = %e, "[api] block lookup failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn get_tip<S: ChainSource, G: BlockGateway>(
    State(indexer): State<Arc<Indexer<S, G>>>,
) -> Response {
    Json(indexer.tip_report().await).into_response()
}

async fn get_stats<S: ChainSource, G: BlockGateway>(
    State(indexer): State<Arc<Indexer<S, G>>>,
) -> Response {
    let gateway = indexer.gateway().clone();
    match tokio::task::spawn_blocking(move || gateway.count()).await {
        Ok(Ok(indexed)) => Json(json!({ "indexed_blocks": indexed })).into_response(),
        Ok(Err(e)) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, format!("count task failed: {e}")),
    }
}

pub fn router<S: ChainSource, G: BlockGateway>(state: Arc<Indexer<S, G>>) -> Router {
    Router::new()
        .route("/block/{height}", get(get_block::<S, G>))
        .route("/tip", get(get_tip::<S, G>))
        .route("/stats", get(get_stats::<S, G>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run<S: ChainSource, G: BlockGateway>(
    addr: SocketAddr,
    state: Arc<Indexer<S, G>>,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
