pub mod auth;
pub mod crypto;
pub mod orders;

pub use auth::CurrentUser;

use crate::db::Store;
use crate::Result;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
}

/// Build the API router over the given store
pub fn router<S: Store>(store: S) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let collection = get(orders::list::<S>).post(orders::create::<S>);
    let member = get(orders::retrieve::<S>)
        .put(orders::update::<S>)
        .patch(orders::partial_update::<S>)
        .delete(orders::destroy::<S>);
    let crypto = get(crypto::list::<S>);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/orders", collection.clone())
        .route("/api/orders/", collection)
        .route("/api/orders/{id}", member.clone())
        .route("/api/orders/{id}/", member)
        .route("/api/crypto", crypto.clone())
        .route("/api/crypto/", crypto)
        .with_state(AppState { store })
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the API on `addr` until Ctrl+C
pub async fn serve<S: Store>(addr: &str, store: S) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
