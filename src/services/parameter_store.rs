//! src/services/parameter_store.rs
//!
//! Parameter store backends. The feed endpoint reads exactly one parameter per
//! request: the JSON record naming the bucket. In AWS that is an SSM
//! parameter; locally it is a file beneath `storage_dir/.parameters`.

use async_trait::async_trait;
use aws_sdk_ssm::{error::DisplayErrorContext, operation::get_parameter::GetParameterError};
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("parameter `{0}` not found")]
    NotFound(String),
    #[error("parameter `{0}` has no value")]
    EmptyValue(String),
    #[error("parameter name `{0}` is invalid")]
    InvalidName(String),
    #[error("parameter store request failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ParameterResult<T> = Result<T, ParameterError>;

/// Read access to a key/value configuration service.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Fetch a parameter's value, decrypting secure strings.
    async fn get_parameter(&self, name: &str) -> ParameterResult<String>;
}

/// AWS Systems Manager parameter store.
#[derive(Clone)]
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, name: &str) -> ParameterResult<String> {
        debug!(parameter = name, "reading parameter from SSM");
        let resp = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(GetParameterError::ParameterNotFound(_)) => {
                    ParameterError::NotFound(name.to_string())
                }
                _ => ParameterError::Backend(DisplayErrorContext(&err).to_string()),
            })?;

        resp.parameter
            .and_then(|p| p.value)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParameterError::EmptyValue(name.to_string()))
    }
}

/// File-backed parameter store used when running outside AWS.
///
/// A parameter named `/url-feed/bucket` lives at `root/url-feed/bucket`.
#[derive(Clone, Debug)]
pub struct LocalParameterStore {
    root: PathBuf,
}

impl LocalParameterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a parameter name onto a file path, refusing anything that would
    /// escape `root`.
    fn parameter_path(&self, name: &str) -> ParameterResult<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let safe = !name.trim_start_matches('/').is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(ParameterError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ParameterStore for LocalParameterStore {
    async fn get_parameter(&self, name: &str) -> ParameterResult<String> {
        let path = self.parameter_path(name)?;
        debug!("reading parameter from {}", path.display());
        let value = fs::read_to_string(&path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ParameterError::NotFound(name.to_string())
            } else {
                ParameterError::Io(err)
            }
        })?;

        if value.trim().is_empty() {
            return Err(ParameterError::EmptyValue(name.to_string()));
        }
        Ok(value)
    }
}
