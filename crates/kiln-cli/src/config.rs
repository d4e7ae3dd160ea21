//! Configuration loading helpers for the Kiln CLI.
//!
//! Configuration flags (see [`CONFIG_CLI_FLAGS`]) must appear before the
//! command, as in `kiln --plugin-directory /srv/plugins plugins installed`.
//! They are split off and handed to `ortho_config`; the remaining tokens go
//! to the command parser.

use std::ffi::{OsStr, OsString};

use kiln_config::{CONFIG_CLI_FLAGS, Config};
use ortho_config::OrthoConfig;

use crate::AppError;

pub(crate) trait ConfigLoader {
    /// Loads configuration from the configuration flags of the command line
    /// (program name included).
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*text, false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Command line split into configuration and command tokens.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    /// Program name followed by the configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by everything else.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ArgumentSplit::default();
    };

    let mut config_arguments = vec![program.clone()];
    let mut remaining = rest.iter().peekable();
    while let Some(argument) = remaining.peek() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.extend(remaining.next().cloned());
                if needs_value {
                    config_arguments.extend(remaining.next().cloned());
                }
            }
            FlagAction::Stop => break,
        }
    }

    let command_arguments = std::iter::once(program.clone())
        .chain(remaining.cloned())
        .collect();
    ArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case("--log-filter", FlagAction::Include { needs_value: true })]
    #[case("plugins", FlagAction::Stop)]
    #[case("--unknown", FlagAction::Stop)]
    fn classifies_flags(#[case] raw: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(raw)), expected);
    }

    #[test]
    fn splits_leading_configuration_flags() {
        let split = split_arguments(&os(&[
            "kiln",
            "--plugin-directory",
            "/srv/plugins",
            "--log-format=json",
            "plugins",
            "installed",
            "--json",
        ]));
        assert_eq!(
            split.config_arguments,
            os(&["kiln", "--plugin-directory", "/srv/plugins", "--log-format=json"])
        );
        assert_eq!(
            split.command_arguments,
            os(&["kiln", "plugins", "installed", "--json"])
        );
    }

    #[test]
    fn flags_after_the_command_belong_to_the_command() {
        let split = split_arguments(&os(&["kiln", "plugins", "--log-filter", "debug"]));
        assert_eq!(split.config_arguments, os(&["kiln"]));
        assert_eq!(
            split.command_arguments,
            os(&["kiln", "plugins", "--log-filter", "debug"])
        );
    }

    #[test]
    fn empty_command_line_splits_to_nothing() {
        assert_eq!(split_arguments(&[]), ArgumentSplit::default());
    }
}
