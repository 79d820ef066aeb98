//! Adapter Binding API
//!
//! The unary RPC surface the scheduler's adapter pool drives: list, create,
//! and delete bindings. Create and delete are idempotent so the scheduler
//! may replay them freely.

use crate::adapter::store::BindingStore;
use crate::adapter::subscriber::SubscriptionManager;
use crate::bindings::{Binding, BindingList};
use crate::Result;
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<BindingStore>,
    pub subscriptions: Arc<SubscriptionManager>,
}

/// HTTP server for the binding API
pub struct BindingApiServer {
    bind_addr: SocketAddr,
    state: ApiState,
}

impl BindingApiServer {
    pub fn new(
        bind_addr: SocketAddr,
        store: Arc<BindingStore>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            bind_addr,
            state: ApiState {
                store,
                subscriptions,
            },
        }
    }

    pub fn router(state: ApiState) -> Router {
        Router::new()
            .route(
                "/bindings",
                get(list_bindings).post(create_binding).delete(delete_binding),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start serving the binding API
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind binding API to {}", self.bind_addr))?;

        info!(bind_addr = %self.bind_addr, "Binding API listening");

        axum::serve(listener, Self::router(self.state))
            .await
            .context("Binding API server error")?;

        Ok(())
    }
}

async fn list_bindings(State(state): State<ApiState>) -> Json<BindingList> {
    Json(BindingList {
        bindings: state.store.list(),
    })
}

async fn create_binding(State(state): State<ApiState>, Json(binding): Json<Binding>) -> StatusCode {
    if state.store.add(binding.clone()) {
        state.subscriptions.start(binding);
        StatusCode::CREATED
    } else {
        // already held, nothing to do
        StatusCode::OK
    }
}

async fn delete_binding(State(state): State<ApiState>, Json(binding): Json<Binding>) -> StatusCode {
    if state.store.remove(&binding) {
        state.subscriptions.stop(&binding);
    }
    StatusCode::OK
}
