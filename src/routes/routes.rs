//! Defines the routes served by the function.
//!
//! - `GET /feed?filename=<name>[&md5]` — object bytes, or its entity tag
//! - `GET /healthz` — liveness
//!
//! API Gateway forwards `/feed` through a Lambda proxy integration; in local
//! mode the same router is bound to a TCP listener.

use crate::{
    handlers::{feed_handlers::get_feed, health_handlers::healthz},
    state::AppState,
};
use axum::{Router, routing::get};

/// Build the router. State (`AppState`) is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/feed", get(get_feed))
}
