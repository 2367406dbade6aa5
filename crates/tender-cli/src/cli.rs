//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tender_domain::Portal;

/// Tender CLI - Turn tender documents into structured bid summaries.
#[derive(Debug, Parser)]
#[command(name = "tender")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TENDER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// JSON record plus run metadata
    Json,
    /// Field table plus run summary
    Table,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process extracted text files of one tender
    Process(ProcessArgs),

    /// Print a configuration as TOML
    Config(ConfigArgs),
}

/// Arguments for the process command.
#[derive(Debug, Parser)]
pub struct ProcessArgs {
    /// Plain-text files, in the order they should be read
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Portal the tender was published on (detected when omitted)
    #[arg(short, long, value_enum)]
    pub portal: Option<PortalArg>,

    /// Ollama API endpoint
    #[arg(long, env = "TENDER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Model name
    #[arg(short, long, env = "TENDER_MODEL")]
    pub model: Option<String>,

    /// Write the output here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the config command.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    /// Print a preset instead of the loaded configuration
    #[arg(long, value_enum)]
    pub preset: Option<PresetArg>,
}

/// Portal argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PortalArg {
    /// Government e-Marketplace
    Gem,
    /// Central Public Procurement Portal
    Cppp,
    /// Any other portal
    Generic,
}

/// Engine configuration presets.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PresetArg {
    /// Balanced defaults
    Default,
    /// Hierarchical sooner, more parallelism, fewer retries
    Aggressive,
    /// Larger contexts, more recovery attempts
    Lenient,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Table => crate::config::OutputFormat::Table,
        }
    }
}

impl From<PortalArg> for Portal {
    fn from(portal: PortalArg) -> Self {
        match portal {
            PortalArg::Gem => Portal::Gem,
            PortalArg::Cppp => Portal::Cppp,
            PortalArg::Generic => Portal::Generic,
        }
    }
}
