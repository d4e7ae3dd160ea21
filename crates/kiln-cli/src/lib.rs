//! Command-line interface runtime for Kiln.
//!
//! The module owns argument parsing, configuration bootstrapping, and the
//! `kiln plugins` commands. It is exercised both from the binary entrypoint
//! and from tests, where configuration loading, the release source, and the
//! output streams are substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use kiln_plugins::ReleaseSource;

mod cli;
mod commands;
mod config;
mod errors;
mod fetch;
mod telemetry;

use cli::{Cli, CliCommand};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
use config::split_arguments;
pub(crate) use errors::AppError;

/// Bundles the output streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

struct CliRunner<'a, 'io, W: Write, E: Write, L: ConfigLoader> {
    io: &'a mut IoStreams<'io, W, E>,
    loader: &'a L,
    source: Option<&'a dyn ReleaseSource>,
}

impl<'a, 'io, W, E, L> CliRunner<'a, 'io, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    const fn new(io: &'a mut IoStreams<'io, W, E>, loader: &'a L) -> Self {
        Self {
            io,
            loader,
            source: None,
        }
    }

    #[cfg(test)]
    const fn with_source(mut self, source: &'a dyn ReleaseSource) -> Self {
        self.source = Some(source);
        self
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_arguments(&args);

        let cli = match Cli::try_parse_from(&split.command_arguments) {
            Ok(cli) => cli,
            Err(error)
                if matches!(
                    error.kind(),
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
                ) =>
            {
                return match write!(self.io.stdout, "{error}") {
                    Ok(()) => ExitCode::SUCCESS,
                    Err(_) => ExitCode::FAILURE,
                };
            }
            Err(error) => return self.report(&AppError::CliUsage(error)),
        };

        let result = self
            .loader
            .load(&split.config_arguments)
            .and_then(|config| {
                telemetry::initialise(&config)?;
                let CliCommand::Plugins { action } = cli.command;
                commands::execute(&action, &config, self.source, &mut *self.io.stdout)
            });

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => self.report(&error),
        }
    }

    fn report(&mut self, error: &AppError) -> ExitCode {
        // Nothing more can be done when stderr itself is gone.
        drop(writeln!(self.io.stderr, "{error}"));
        error.exit_code()
    }
}

/// Runs the CLI using the provided arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    CliRunner::new(&mut io, &OrthoConfigLoader).run(args)
}

#[cfg(test)]
pub(crate) fn run_with<I, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
    source: &dyn ReleaseSource,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    CliRunner::new(io, loader).with_source(source).run(args)
}
