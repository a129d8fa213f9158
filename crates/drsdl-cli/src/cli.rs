use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI for the DRS manifest downloader.
#[derive(Debug, Parser)]
#[command(name = "drsdl")]
#[command(about = "Resolve, sign, and download GA4GH DRS-addressed objects from a manifest", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download against the in-process mock provider (no network; for tests and demos).
    Mock(MockArgs),
    /// Download against a DRS deployment that exchanges an access-id for a signed URL.
    ServiceA(ServiceAArgs),
    /// Download against a DRS deployment that embeds a signed URL directly in `resolve`.
    ServiceB(ServiceBArgs),
}

/// Flags shared by every provider subcommand (§6).
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Path to the TSV manifest listing DRS URIs.
    pub manifest: PathBuf,

    /// Destination directory for downloaded files. Defaults to the current directory.
    #[arg(long, default_value = ".")]
    pub dest: PathBuf,

    /// Manifest column name to treat as the DRS URI column, overriding header-substring matching.
    #[arg(long)]
    pub column: Option<String>,

    /// Echo log records to stderr in addition to the log file.
    #[arg(short, long)]
    pub verbose: bool,

    /// Overwrite an existing file at the destination instead of appending a `(n)` suffix.
    #[arg(long)]
    pub replace: bool,

    /// Billing project to pass for requester-pays objects.
    #[arg(long)]
    pub billing_project: Option<String>,

    /// Path to a config TOML to load instead of the XDG default.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the concurrent-resolve bound (§5).
    #[arg(long)]
    pub max_retrievers: Option<usize>,
    /// Override the concurrent-sign / sign-then-download chunk width (§5).
    #[arg(long)]
    pub max_signers: Option<usize>,
    /// Override the concurrent-object-download bound (§5).
    #[arg(long)]
    pub max_downloaders: Option<usize>,
    /// Override the part size the workload-shaping table would otherwise choose (§4.4).
    #[arg(long)]
    pub part_size: Option<u64>,
    /// Override the concurrent-part-fetch-per-object bound the workload-shaping table
    /// would otherwise choose (§4.2, §5).
    #[arg(long)]
    pub max_part_handlers: Option<usize>,
}

#[derive(Debug, Args)]
pub struct MockArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Registers a synthetic object for local demo purposes: `id=name:size`.
    /// Ids referenced by the manifest that are not registered resolve as not-found.
    #[arg(long = "register", value_name = "ID=NAME:SIZE")]
    pub register: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ServiceAArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Base URL of the DRS-hosting service.
    #[arg(long)]
    pub base_url: String,

    /// Bearer token for authenticated requests.
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Debug, Args)]
pub struct ServiceBArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Base URL of the DRS-hosting service.
    #[arg(long)]
    pub base_url: String,

    /// API key for authenticated requests.
    #[arg(long)]
    pub api_key: Option<String>,
}
