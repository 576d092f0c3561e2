pub mod feed_handlers;
pub mod health_handlers;
