pub mod feed_service;
pub mod object_store;
pub mod parameter_store;
