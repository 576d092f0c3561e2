//! Data models for the feed endpoint.
//!
//! `FeedLocation` is the JSON record kept in the parameter store; `ObjectHead`
//! and `ObjectBody` are what the object store hands back.

pub mod feed_location;
pub mod object;
