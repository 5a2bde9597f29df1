//! Operator commands. The live `Ejector::run` loop, with real chain and data
//! API clients built from `[chain]` and `[data_api]`, is wired by the
//! embedding binary. The commands here only prepare and rehearse that setup.

use clap::{Parser, Subcommand};

pub mod init_config;
pub mod logging;
pub mod private_key;
pub mod rehearse;
pub mod validate;
pub mod version;

#[derive(Parser)]
#[command(name = "ejector")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ejects validators that stop signing batches", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    InitConfig {
        /// Path to config file (default: ~/.config/ejector/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load and validate a configuration file
    ValidateConfig {
        /// Path to config file (default: ~/.config/ejector/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Path to file containing the signing key (container-native)
        #[arg(long)]
        private_key_file: Option<String>,
    },

    /// Replay a signing-rate snapshot through the ejection pipeline without
    /// touching the chain
    Rehearse {
        /// Path to config file (default: ~/.config/ejector/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// JSON signing-rate snapshot
        #[arg(long)]
        snapshot: String,

        /// Number of ejection periods to simulate
        #[arg(long, default_value_t = 24)]
        ticks: u32,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::InitConfig { config, force } => init_config::execute(config, force),
        Commands::ValidateConfig {
            config,
            private_key_file,
        } => validate::execute(config, private_key_file),
        Commands::Rehearse {
            config,
            snapshot,
            ticks,
        } => rehearse::execute(config, snapshot, ticks).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_init_config() {
        let cli = Cli::parse_from(["ejector", "init-config", "--config", "/tmp/c.toml", "--force"]);

        match cli.command {
            Commands::InitConfig { config, force } => {
                assert_eq!(config.as_deref(), Some("/tmp/c.toml"));
                assert!(force);
            }
            _ => panic!("Expected InitConfig command"),
        }
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from([
            "ejector",
            "validate-config",
            "--private-key-file",
            "/run/secrets/key",
        ]);

        match cli.command {
            Commands::ValidateConfig {
                config,
                private_key_file,
            } => {
                assert!(config.is_none());
                assert_eq!(private_key_file.as_deref(), Some("/run/secrets/key"));
            }
            _ => panic!("Expected ValidateConfig command"),
        }
    }

    #[test]
    fn test_cli_parse_rehearse_defaults() {
        let cli = Cli::parse_from(["ejector", "rehearse", "--snapshot", "snap.json"]);

        match cli.command {
            Commands::Rehearse {
                config,
                snapshot,
                ticks,
            } => {
                assert!(config.is_none());
                assert_eq!(snapshot, "snap.json");
                assert_eq!(ticks, 24);
            }
            _ => panic!("Expected Rehearse command"),
        }
    }

    #[test]
    fn test_cli_rehearse_requires_snapshot() {
        assert!(Cli::try_parse_from(["ejector", "rehearse"]).is_err());
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["ejector", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }
}
