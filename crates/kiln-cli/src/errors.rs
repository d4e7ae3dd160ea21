//! Error types for the CLI runtime.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use kiln_plugins::PluginError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Exit code for usage errors.
pub(crate) const USAGE_EXIT_CODE: u8 = 2;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("'kiln plugins {command}' expects <address> [<version>], got {count} arguments\n\n{usage}")]
    AmbiguousArguments {
        command: &'static str,
        count: usize,
        usage: String,
    },
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("no installed version of {address} matches '{requirement}' on {platform}")]
    NotInstalled {
        address: String,
        requirement: String,
        platform: String,
    },
    #[error("failed to serialise output: {0}")]
    Serialise(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl AppError {
    /// Maps the error to the process exit code: usage errors exit with 2,
    /// everything else with 1.
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::CliUsage(_) | Self::AmbiguousArguments { .. } => ExitCode::from(USAGE_EXIT_CODE),
            _ => ExitCode::FAILURE,
        }
    }
}
