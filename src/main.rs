use anyhow::{Context, Result, anyhow};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{AppConfig, Backend, Mode},
    infra::context::DeploymentContext,
    services::{
        feed_service::FeedService,
        object_store::{LocalObjectStore, ObjectStore, S3ObjectStore},
        parameter_store::{LocalParameterStore, ParameterStore, SsmParameterStore},
    },
    state::AppState,
};

mod config;
mod errors;
mod handlers;
mod infra;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cfg.local {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        // CloudWatch: one JSON object per line, no ANSI colours.
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .with_current_span(false)
            .with_ansi(false)
            .without_time()
            .init();
    }

    // --- Handle synth mode ---
    if let Mode::Synth { context } = mode {
        let ctx = match context {
            Some(path) => DeploymentContext::load(&path)?,
            None => DeploymentContext::default(),
        };
        let template = infra::stack::synthesize(&ctx).context("rendering template")?;
        println!("{}", serde_json::to_string_pretty(&template)?);
        return Ok(()); // exit after synth
    }

    tracing::info!("Starting url-feed with config: {:?}", cfg);
    if cfg.bucket_param.is_none() {
        tracing::warn!("BUCKET_SSM_PARAM is not set; every /feed request will fail");
    }

    // --- Initialize backends ---
    let (parameters, objects): (Arc<dyn ParameterStore>, Arc<dyn ObjectStore>) = match cfg.backend
    {
        Backend::Aws => {
            let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            (
                Arc::new(SsmParameterStore::new(aws_sdk_ssm::Client::new(&shared))),
                Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&shared))),
            )
        }
        Backend::Fs => {
            tracing::info!(
                "Serving objects from {} and parameters from {}",
                cfg.storage_dir.display(),
                cfg.parameters_dir().display()
            );
            (
                Arc::new(LocalParameterStore::new(cfg.parameters_dir())),
                Arc::new(LocalObjectStore::new(cfg.storage_dir.clone())),
            )
        }
    };

    let state = AppState {
        feed: FeedService::new(parameters, objects, cfg.bucket_param.clone()),
        debug: cfg.debug,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    if !cfg.local {
        return lambda_http::run(app)
            .await
            .map_err(|err| anyhow!(err))
            .context("lambda runtime exited");
    }

    // --- Start local server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
