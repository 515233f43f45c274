//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the review API router.
pub fn review_api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/catalogue", get(endpoints::templates::catalogue))
        .route("/sessions/:session_id", get(endpoints::sessions::show))
        .route("/sessions/:session_id/issues", get(endpoints::sessions::issues))
        .route("/sessions/:session_id/messages", post(endpoints::sessions::dispatch))
        .route("/sessions/:session_id/restart", post(endpoints::sessions::restart))
        .route(
            "/sessions/:session_id/extractions",
            post(endpoints::extraction::start),
        )
        .route(
            "/sessions/:session_id/extractions/:job_id",
            get(endpoints::extraction::status),
        )
        .route(
            "/sessions/:session_id/extractions/:job_id/cancel",
            post(endpoints::extraction::cancel),
        )
        .route(
            "/sessions/:session_id/templates",
            post(endpoints::templates::upload).get(endpoints::templates::list),
        )
        .route(
            "/sessions/:session_id/templates/:template_id",
            get(endpoints::templates::show)
                .put(endpoints::templates::replace)
                .delete(endpoints::templates::remove),
        )
        .route(
            "/sessions/:session_id/templates/:template_id/mapping/:field",
            put(endpoints::templates::map_field).delete(endpoints::templates::unmap_field),
        )
        .route("/sessions/:session_id/renders", post(endpoints::render::start))
        .route(
            "/sessions/:session_id/renders/:job_id",
            get(endpoints::render::status),
        )
        .route(
            "/sessions/:session_id/renders/:job_id/document",
            get(endpoints::render::document),
        )
        .route(
            "/sessions/:session_id/renders/:job_id/cancel",
            post(endpoints::render::cancel),
        )
        .with_state(ctx);

    Router::new().nest("/api", api)
}
