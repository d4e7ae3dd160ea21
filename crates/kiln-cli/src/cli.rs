//! CLI argument definitions for `kiln`.

use clap::{Parser, Subcommand};

/// Command-line interface for the Kiln build orchestrator.
#[derive(Parser, Debug)]
#[command(name = "kiln", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Top-level command.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Manages external plugins.
    Plugins {
        /// The plugin action to perform.
        #[command(subcommand)]
        action: PluginsAction,
    },
}

/// Plugin management actions.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum PluginsAction {
    /// Installs a plugin: `kiln plugins install <address> [<version>]`.
    Install {
        /// Source address, optionally followed by a version requirement.
        #[arg(value_name = "ADDRESS [VERSION]", num_args = 0..)]
        arguments: Vec<String>,
    },
    /// Lists installed plugins, optionally only those of one address.
    Installed {
        /// Source address to filter by.
        #[arg(value_name = "ADDRESS")]
        address: Option<String>,
        /// Prints one JSON document per plugin.
        #[arg(long)]
        json: bool,
    },
    /// Removes installed versions: `kiln plugins remove <address> [<version>]`.
    Remove {
        /// Source address, optionally followed by a version requirement.
        #[arg(value_name = "ADDRESS [VERSION]", num_args = 0..)]
        arguments: Vec<String>,
    },
    /// Starts a plugin and prints the components it provides.
    Describe {
        /// Source address, optionally followed by a version requirement.
        #[arg(value_name = "ADDRESS [VERSION]", num_args = 0..)]
        arguments: Vec<String>,
    },
}

impl PluginsAction {
    /// Name used in usage messages.
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Installed { .. } => "installed",
            Self::Remove { .. } => "remove",
            Self::Describe { .. } => "describe",
        }
    }
}
