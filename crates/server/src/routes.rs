//! Route configuration.

use crate::handlers;
use crate::identity::trace_middleware;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/uploads", post(handlers::create_upload))
        .route(
            "/v1/uploads/{upload_id}",
            get(handlers::get_upload).delete(handlers::delete_upload),
        )
        .route(
            "/v1/uploads/{upload_id}/chunks",
            get(handlers::list_chunks),
        )
        .route(
            "/v1/uploads/{upload_id}/chunks/{chunk_index}",
            put(handlers::upload_chunk),
        )
        .route(
            "/v1/uploads/{upload_id}/finish",
            post(handlers::finish_upload),
        )
        .route(
            "/v1/uploads/{upload_id}/content",
            get(handlers::download_upload),
        );

    let mut router = Router::new().merge(api_routes);

    // Only exposed when enabled; see crate::metrics for the deployment note.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Layers run outermost first: TraceLayer -> trace ID span -> handler.
    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
