//! CLI entrypoint for Kiln.
//!
//! The binary delegates to [`kiln_cli::run`], which loads configuration,
//! parses the command line, and runs the requested plugin action.

use std::io::{self, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    // Left unlocked: log events from discovery and bridge threads write here.
    let mut stderr = io::stderr();
    kiln_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
