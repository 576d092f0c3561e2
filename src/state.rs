//! Shared router state.

use crate::services::feed_service::FeedService;

/// Cloned into every handler. Holds only read-only clients and flags.
#[derive(Clone)]
pub struct AppState {
    pub feed: FeedService,

    /// Log each incoming request event in full.
    pub debug: bool,
}
