use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use consentgate_core::GdprResolver;

#[derive(Parser)]
#[command(
    name = "consentgate",
    version,
    about = "Consent-gated activation for marketing SDKs: validate policies, inspect and purge vendor caches, simulate the gate"
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Vendor policy manifests
    Policy(PolicyArgs),
    /// Vendor files in an application data directory
    Cache(CacheArgs),
    /// Run a scripted scenario through the gate against a recording vendor
    Simulate(SimulateArgs),
    Version,
}

#[derive(Args, Clone, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub cmd: PolicyCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PolicyCommand {
    /// Load a policy and list its entries in init order
    Validate(PolicyValidateArgs),
}

#[derive(Args, Clone, Debug)]
pub struct PolicyValidateArgs {
    /// Policy file path (JSON)
    pub input: PathBuf,

    /// Fail when the policy produced any warnings
    #[arg(long)]
    pub strict: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheCommand {
    /// List vendor-named files
    Inspect(CacheTargetArgs),
    /// Delete vendor-named files
    Purge(CacheTargetArgs),
}

#[derive(Args, Clone, Debug)]
pub struct CacheTargetArgs {
    /// Application data directory (contains cache/, files/, shared_prefs/)
    #[arg(long, env = "CONSENTGATE_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Policy file path (JSON)
    #[arg(long)]
    pub policy: PathBuf,

    /// Scenario script (YAML)
    #[arg(long)]
    pub script: PathBuf,

    /// Data directory the simulated vendor caches into (default: a temp dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// GDPR-subject resolution: always, never or from_cmp
    #[arg(long, env = "CONSENTGATE_GDPR")]
    pub gdpr: Option<GdprResolver>,

    /// Keep vendor files on revoke
    #[arg(long)]
    pub no_purge: bool,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}
