//! Inspect and initialise the configuration file.

use anyhow::Context;
use clap::Subcommand;
use tokslides_common::config::{config_file_path, AppConfig};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as JSON
    Show,

    /// Print the configuration file location
    Path,

    /// Write the effective configuration to the configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(config: &AppConfig, command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => println!("{}", serde_json::to_string_pretty(config)?),
        ConfigCommand::Path => println!("{}", config_file_path().display()),
        ConfigCommand::Init { force } => {
            let path = config_file_path();
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config
                .save()
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
