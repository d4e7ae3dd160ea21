//! Implementations of the `kiln plugins` actions.

use std::io::Write;

use clap::CommandFactory;
use kiln_config::Config;
use kiln_plugins::{
    BridgeConfig, GithubReleases, InstalledPlugin, Installer, Platform, PluginBridge,
    ReleaseSource, SourceAddress, VersionRequirement, discover,
};
use tracing::debug;

use crate::AppError;
use crate::cli::{Cli, PluginsAction};
use crate::fetch::HttpFetcher;

const COMMAND_TARGET: &str = "kiln_cli::commands";

/// Runs `action`, writing its output to `out`.
///
/// `source` replaces the GitHub release source when present.
pub(crate) fn execute<W: Write>(
    action: &PluginsAction,
    config: &Config,
    source: Option<&dyn ReleaseSource>,
    out: &mut W,
) -> Result<(), AppError> {
    debug!(target: COMMAND_TARGET, command = action.name(), "dispatching");
    match action {
        PluginsAction::Install { arguments } => install(arguments, config, source, out),
        PluginsAction::Installed { address, json } => {
            installed(address.as_deref(), *json, config, out)
        }
        PluginsAction::Remove { arguments } => remove(arguments, config, out),
        PluginsAction::Describe { arguments } => describe(arguments, config, out),
    }
}

/// Address and optional version taken from the positional arguments.
struct Target {
    address: SourceAddress,
    version: Option<VersionRequirement>,
}

impl Target {
    fn parse(command: &'static str, arguments: &[String]) -> Result<Self, AppError> {
        let (address, version) = match arguments {
            [address] => (address, None),
            [address, version] => (address, Some(version)),
            _ => {
                return Err(AppError::AmbiguousArguments {
                    command,
                    count: arguments.len(),
                    usage: usage(command),
                });
            }
        };
        Ok(Self {
            address: SourceAddress::parse(address)?,
            version: version
                .map(String::as_str)
                .map(VersionRequirement::parse)
                .transpose()?,
        })
    }

    fn requirement(&self) -> VersionRequirement {
        self.version.clone().unwrap_or(VersionRequirement::Latest)
    }
}

fn usage(command: &str) -> String {
    let mut cli = Cli::command();
    cli.find_subcommand_mut("plugins")
        .and_then(|plugins| plugins.find_subcommand_mut(command))
        .map(|subcommand| subcommand.render_usage().to_string())
        .unwrap_or_default()
}

fn install<W: Write>(
    arguments: &[String],
    config: &Config,
    source: Option<&dyn ReleaseSource>,
    out: &mut W,
) -> Result<(), AppError> {
    let target = Target::parse("install", arguments)?;
    let requirement = target.requirement();
    let installer = Installer::new(config.plugin_directory().as_std_path());
    let platform = Platform::current();

    let plugin = if let Some(source) = source {
        installer.install_from_source(&target.address, &requirement, source, &platform)?
    } else {
        let github = GithubReleases::new(HttpFetcher::new()?);
        installer.install_from_source(&target.address, &requirement, &github, &platform)?
    };

    writeln!(
        out,
        "Installed {} v{} ({}) at {}",
        plugin.address(),
        plugin.version(),
        plugin.platform(),
        plugin.path().display()
    )?;
    Ok(())
}

fn installed<W: Write>(
    address: Option<&str>,
    json: bool,
    config: &Config,
    out: &mut W,
) -> Result<(), AppError> {
    let filter = address.map(SourceAddress::parse).transpose()?;
    let registry = discover([config.plugin_directory().as_std_path()]);
    let plugins: Vec<&InstalledPlugin> = registry
        .iter()
        .filter(|plugin| filter.as_ref().is_none_or(|wanted| plugin.address() == wanted))
        .collect();

    if json {
        for plugin in plugins {
            serde_json::to_writer(&mut *out, plugin)?;
            writeln!(out)?;
        }
        return Ok(());
    }

    if plugins.is_empty() {
        writeln!(out, "No plugins installed.")?;
    }
    for plugin in plugins {
        writeln!(
            out,
            "{} v{} api {} {} {}",
            plugin.address(),
            plugin.version(),
            plugin.api(),
            plugin.platform(),
            plugin.path().display()
        )?;
    }
    Ok(())
}

fn remove<W: Write>(arguments: &[String], config: &Config, out: &mut W) -> Result<(), AppError> {
    let target = Target::parse("remove", arguments)?;
    let installer = Installer::new(config.plugin_directory().as_std_path());
    let removed = installer.uninstall(&target.address, target.version.as_ref())?;
    if removed.is_empty() {
        return Err(not_installed(&target));
    }
    for path in removed {
        writeln!(out, "Removed {}", path.display())?;
    }
    Ok(())
}

fn describe<W: Write>(arguments: &[String], config: &Config, out: &mut W) -> Result<(), AppError> {
    let target = Target::parse("describe", arguments)?;
    let registry = discover([config.plugin_directory().as_std_path()]);
    let plugin = registry
        .latest(&target.address, &target.requirement(), &Platform::current())
        .ok_or_else(|| not_installed(&target))?;

    let bridge_config = BridgeConfig::default()
        .with_handshake_timeout(config.handshake_timeout())
        .with_shutdown_grace(config.shutdown_grace());
    let mut bridge = PluginBridge::for_installed(plugin, bridge_config);
    let description = bridge.launch()?.clone();
    bridge.shutdown()?;

    serde_json::to_writer_pretty(&mut *out, &description)?;
    writeln!(out)?;
    Ok(())
}

fn not_installed(target: &Target) -> AppError {
    AppError::NotInstalled {
        address: target.address.to_string(),
        requirement: target.requirement().to_string(),
        platform: Platform::current().to_string(),
    }
}
