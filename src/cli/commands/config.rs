//! `iw config` command - Configuration management
//!
//! Reads show the merged configuration (global file, workspace file, then
//! `IW_*` environment variables). Writes go to the workspace file only.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::cli::OutputFormat;
use crate::core::config::CONFIG_KEYS;
use crate::core::{Config, Workspace};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print one value
    Get(KeyArgs),

    /// Set a value in the workspace config
    Set(SetArgs),

    /// Remove a value from the workspace config
    Unset(KeyArgs),

    /// List all configuration keys
    Keys,
}

#[derive(clap::Args, Debug)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Configuration key (see `iw config keys`)
    pub key: String,

    pub value: String,
}

pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show => run_show(global),
        ConfigCommands::Get(args) => run_get(args, global),
        ConfigCommands::Set(args) => write_key(&args.key, &args.value, global),
        ConfigCommands::Unset(args) => write_key(&args.key, "", global),
        ConfigCommands::Keys => {
            for key in CONFIG_KEYS {
                println!("{}", key);
            }
            Ok(())
        }
    }
}

fn locate(global: &GlobalOpts) -> Result<Workspace> {
    Workspace::locate(global.workspace.as_deref()).map_err(|e| miette::miette!("{}", e))
}

fn run_show(global: &GlobalOpts) -> Result<()> {
    let workspace = locate(global)?;
    let config = Config::load(Some(&workspace));
    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config).into_diagnostic()?);
        }
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&config).into_diagnostic()?),
        _ => {
            for key in CONFIG_KEYS {
                let value = config.get(key);
                println!(
                    "{:<18} {}",
                    style(key).cyan(),
                    match &value {
                        Some(v) => v.clone(),
                        None => style("(unset)").dim().to_string(),
                    }
                );
            }
        }
    }
    Ok(())
}

fn run_get(args: KeyArgs, global: &GlobalOpts) -> Result<()> {
    if !CONFIG_KEYS.contains(&args.key.as_str()) {
        return Err(miette::miette!(
            help = format!("valid keys: {}", CONFIG_KEYS.join(", ")),
            "unknown config key '{}'",
            args.key
        ));
    }
    let workspace = locate(global)?;
    let config = Config::load(Some(&workspace));
    match config.get(&args.key) {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => Err(miette::miette!("'{}' is not set", args.key)),
    }
}

fn write_key(key: &str, value: &str, global: &GlobalOpts) -> Result<()> {
    let workspace = locate(global)?;
    let mut config = Config::load_workspace_file(&workspace);
    config.set(key, value).map_err(|e| miette::miette!("{}", e))?;
    config.save_workspace_file(&workspace).into_diagnostic()?;
    tracing::debug!(key, "workspace config updated");

    if !global.quiet {
        if value.trim().is_empty() {
            println!("{} Unset {}", style("✓").green(), style(key).cyan());
        } else {
            println!(
                "{} Set {} = {}",
                style("✓").green(),
                style(key).cyan(),
                style(value.trim()).yellow()
            );
        }
    }
    Ok(())
}
