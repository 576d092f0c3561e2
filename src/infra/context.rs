//! Deployment context: optional knobs read from a JSON file at synth time.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{fs, path::Path};

use crate::models::feed_location::DEFAULT_OBJECT_KEY;

#[derive(Deserialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentContext {
    /// Full ARN of a managed policy applied as permissions boundary.
    #[serde(default)]
    pub permissions_boundary_policy_arn: Option<String>,

    /// Policy name in the deploying account; ignored when an ARN is given.
    #[serde(default)]
    pub permissions_boundary_policy_name: Option<String>,

    /// KMS key alias for bucket encryption, with or without `alias/`.
    #[serde(default)]
    pub kms_key_alias: Option<String>,

    /// Set `DEBUG` on the function.
    #[serde(default)]
    pub debug: bool,

    /// Default object key written into the location parameter.
    #[serde(default)]
    pub object_key: Option<String>,
}

impl DeploymentContext {
    /// Load from a file holding either the bare context object or a
    /// `cdk.json`-style document with a top-level `context` key.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading deployment context {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut doc: Value = serde_json::from_str(raw)?;
        if doc.get("context").is_some_and(Value::is_object) {
            doc = doc["context"].take();
        }
        Ok(serde_json::from_value(doc)?)
    }

    pub fn object_key(&self) -> &str {
        self.object_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_OBJECT_KEY)
    }

    /// Boundary policy ARN as a template value, if any is configured.
    pub fn permissions_boundary(&self) -> Option<Value> {
        if let Some(arn) = non_empty(&self.permissions_boundary_policy_arn) {
            return Some(json!(arn));
        }
        non_empty(&self.permissions_boundary_policy_name).map(|name| {
            json!({
                "Fn::Sub": format!("arn:${{AWS::Partition}}:iam::${{AWS::AccountId}}:policy/{name}")
            })
        })
    }

    /// Alias name without the `alias/` prefix.
    pub fn kms_alias_name(&self) -> Option<&str> {
        non_empty(&self.kms_key_alias).map(|alias| alias.trim_start_matches("alias/"))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
