//! The configuration record stored in the parameter store at deploy time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default key written by the deployment template.
pub const DEFAULT_OBJECT_KEY: &str = "badurls.txt";

/// Where the feed lives: the bucket the function reads from, plus the key the
/// deployment seeded as its default object.
///
/// The request's `filename` parameter is what actually selects the object;
/// `object_key` is kept so the record round-trips unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeedLocation {
    /// Name of the bucket holding feed objects.
    pub bucket_name: String,

    /// Key seeded at deploy time (e.g. `badurls.txt`).
    #[serde(default)]
    pub object_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("feed location is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("feed location has an empty `bucket_name`")]
    EmptyBucket,
}

impl FeedLocation {
    /// Parse the raw parameter value.
    pub fn parse(raw: &str) -> Result<Self, LocationError> {
        let location: FeedLocation = serde_json::from_str(raw)?;
        if location.bucket_name.trim().is_empty() {
            return Err(LocationError::EmptyBucket);
        }
        Ok(location)
    }

    /// Render the record the way the deployment template stores it.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
