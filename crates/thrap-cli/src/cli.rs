use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "thrap",
    about = "Thrap stack registry: versioned, hash-chained stack and identity records",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Data directory (default: ./.thrap)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Hash algorithm for new stores: blake3 or sha256
    #[arg(long, global = true)]
    pub hash: Option<String>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the data directory and write thrap.toml
    Init(InitArgs),
    /// Register, inspect, and audit stacks
    Stack(StackArgs),
    /// Register and inspect identities
    Identity(IdentityArgs),
    /// List the refs held by one namespace
    Refs(RefsArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing thrap.toml
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct StackArgs {
    #[command(subcommand)]
    pub action: StackAction,
}

#[derive(Subcommand)]
pub enum StackAction {
    /// Register a new stack from a JSON manifest
    Register { file: PathBuf },
    /// Record a new version of a registered stack from a JSON manifest
    Update { file: PathBuf },
    /// Show the current version of a stack
    Show { id: String },
    /// Show every version of a stack, latest first
    Log {
        id: String,
        #[arg(long)]
        oneline: bool,
    },
    /// List registered stack ids
    List,
    /// Check the version chain of a stack
    Verify { id: String },
    /// Unregister a stack, keeping its versions
    Delete { id: String },
}

#[derive(Args)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub action: IdentityAction,
}

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Register an identity
    Register {
        email: String,
        /// Hex-encoded public key
        #[arg(long)]
        public_key: String,
        /// Identity id (default: the email)
        #[arg(long)]
        id: Option<String>,
    },
    /// Show an identity
    Show { id: String },
    /// List registered identity ids
    List,
}

#[derive(Args)]
pub struct RefsArgs {
    pub namespace: String,
    /// Look in the identity keyspace instead of the stack keyspace
    #[arg(long)]
    pub identity: bool,
}
