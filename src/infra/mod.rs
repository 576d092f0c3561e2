//! Deployment template for the feed function.
//!
//! `--synth` renders a CloudFormation template declaring the bucket, the
//! parameter holding its location, the execution role, the function and the
//! REST API in front of it.

pub mod context;
pub mod stack;
