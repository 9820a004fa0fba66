pub mod config;
pub mod doctor;
pub mod pid;
pub mod token;

use clap::{Parser, Subcommand};

/// CodeRelay: coding-agent CLIs as an HTTP session service.
#[derive(Debug, Parser)]
#[command(name = "coderelay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Credential utilities.
    #[command(subcommand)]
    Token(TokenCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Mint a bearer credential and print it to stdout.
    Issue {
        /// Client identity to embed in the credential.
        client_id: String,
        /// Issue an admin-scope credential.
        #[arg(long)]
        admin: bool,
        /// Lifetime in hours (defaults to `auth.token_ttl_hours`).
        #[arg(long)]
        ttl_hours: Option<u32>,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `CR_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the
/// path that was used.
///
/// A missing file means defaults; a present but unparsable one is an error.
pub fn load_config() -> anyhow::Result<(cr_domain::config::Config, String)> {
    let config_path = std::env::var("CR_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<cr_domain::config::Config> {
    if std::path::Path::new(config_path).exists() {
        let raw = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
    } else {
        Ok(cr_domain::config::Config::default())
    }
}
