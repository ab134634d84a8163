//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    acct::AcctCommands, company::CompanyCommands, completions::CompletionsArgs,
    config::ConfigCommands, cust::CustCommands, doc::DocCommands, import::ImportCommands,
    init::InitArgs, inv::InvCommands, job::JobCommands, part::PartCommands, po::PoCommands,
    quote::QuoteCommands, seq::SeqCommands, so::SoCommands, sup::SupCommands, user::UserCommands,
    watch::WatchArgs,
};

#[derive(Parser)]
#[command(name = "iw")]
#[command(author, version, about = "Ironworks manufacturing ERP")]
#[command(long_about = "Quoting, sales, purchasing, parts, inventory and accounting for one or more companies, kept in a local workspace.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Workspace root (default: auto-detect by finding .iw/)
    #[arg(long, global = true, env = "IW_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Company to act in, by id or name (overrides config)
    #[arg(long, global = true)]
    pub company: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a workspace with a first company and administrator
    Init(InitArgs),

    /// Companies (tenants)
    #[command(subcommand)]
    Company(CompanyCommands),

    /// Users, employee types and permissions
    #[command(subcommand)]
    User(UserCommands),

    /// Item master
    #[command(subcommand)]
    Part(PartCommands),

    /// Customers
    #[command(subcommand)]
    Cust(CustCommands),

    /// Suppliers
    #[command(subcommand)]
    Sup(SupCommands),

    /// Sales quotes
    #[command(subcommand)]
    Quote(QuoteCommands),

    /// Sales orders
    #[command(subcommand)]
    So(SoCommands),

    /// Purchase orders
    #[command(subcommand)]
    Po(PoCommands),

    /// Inventory adjustments and stock levels
    #[command(subcommand)]
    Inv(InvCommands),

    /// Chart of accounts
    #[command(subcommand)]
    Acct(AcctCommands),

    /// Document numbering sequences
    #[command(subcommand)]
    Seq(SeqCommands),

    /// Stored documents and preview URLs
    #[command(subcommand)]
    Doc(DocCommands),

    /// Background jobs
    #[command(subcommand)]
    Job(JobCommands),

    /// Follow changes to a table
    Watch(WatchArgs),

    /// Bulk import from CSV
    #[command(subcommand)]
    Import(ImportCommands),

    /// View or modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned table for lists, YAML for single records
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just IDs or document numbers, one per line
    Id,
}
