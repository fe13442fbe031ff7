//! Approval Service
//!
//! Custom image requests for Chainguard repos: intake over a REST API,
//! human approval, duplicate-image matching, assembly through chainctl,
//! and tracking until the built image is available.

pub mod config;
pub mod events;
pub mod handlers;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod package_search;
pub mod store;
pub mod workflow;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use events::{EventBus, LifecycleEvent};
pub use handlers::AppState;
pub use models::{Request, RequestStatus, RequestUpdate, SubmitRequest};
pub use monitor::{BuildMonitor, MonitorConfig};
pub use package_search::PackageSearch;
pub use store::{MemoryRequestStore, RequestStore, StoreError};
pub use workflow::{ApprovalWorkflow, WorkflowError};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/api/requests",
            post(handlers::submit_request_handler).get(handlers::list_requests_handler),
        )
        .route(
            "/api/requests/{request_id}",
            get(handlers::get_request_handler).delete(handlers::delete_request_handler),
        )
        .route(
            "/api/requests/{request_id}/approve",
            post(handlers::approve_request_handler),
        )
        .route(
            "/api/requests/{request_id}/reject",
            post(handlers::reject_request_handler),
        )
        .route("/api/packages/search", get(handlers::search_packages_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
