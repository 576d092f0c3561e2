use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf};

use crate::services::feed_service::BUCKET_PARAM_ENV;

/// Which parameter/object store implementation backs the feed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SSM Parameter Store + S3, using the default AWS credential chain.
    Aws,
    /// Files beneath `storage_dir`.
    Fs,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub backend: Backend,

    /// Serve over TCP instead of the Lambda runtime.
    pub local: bool,

    /// Name of the parameter holding the feed location. Absence is only
    /// reported per request.
    pub bucket_param: Option<String>,

    /// Log each incoming event.
    pub debug: bool,
}

/// What the process should do after parsing its arguments.
#[derive(Debug, Clone)]
pub enum Mode {
    Serve,
    /// Print the deployment template, optionally using a context file.
    Synth { context: Option<PathBuf> },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "URL feed retrieval function")]
pub struct Args {
    /// Serve on a local TCP listener instead of the Lambda runtime
    #[arg(long)]
    pub local: bool,

    /// Storage backend (defaults to `fs` with --local, `aws` otherwise)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Host to bind to in local mode (overrides URL_FEED_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to in local mode (overrides URL_FEED_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for the `fs` backend (overrides URL_FEED_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Print the CloudFormation template and exit
    #[arg(long)]
    pub synth: bool,

    /// Deployment context JSON used by --synth
    #[arg(long, requires = "synth")]
    pub context: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<(Self, Mode)> {
        // --- Environment fallback ---
        let env_host = env::var("URL_FEED_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("URL_FEED_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing URL_FEED_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading URL_FEED_PORT"),
        };
        let env_storage = env::var("URL_FEED_STORAGE_DIR").unwrap_or_else(|_| "./data".into());
        let bucket_param = env::var(BUCKET_PARAM_ENV).ok().filter(|v| !v.is_empty());
        let debug = env::var_os("DEBUG").is_some();

        let backend = args
            .backend
            .unwrap_or(if args.local { Backend::Fs } else { Backend::Aws });

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or_else(|| env_storage.into()),
            backend,
            local: args.local,
            bucket_param,
            debug,
        };

        let mode = if args.synth {
            Mode::Synth {
                context: args.context,
            }
        } else {
            Mode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Root of the `fs` parameter store.
    pub fn parameters_dir(&self) -> PathBuf {
        self.storage_dir.join(".parameters")
    }
}
