//! # Tenderflow CLI Module
//!
//! This module implements the CLI interface for Tenderflow.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `stages` - List the stage registry
//! - `create` - Create a tender
//! - `show` - Show a tender with its progress
//! - `finalize` - Finalize one stage
//! - `award` - Record the LOA and award a tender
//! - `advance` - Complete every eligible auto stage
//! - `backfill` - Add missing stage-1 records
//! - `import` - Import tenders from JSON
//! - `export` - Export tenders and audit log
//! - `audit` - Show a tender's audit log

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tenderflow_core::TenderflowError;

pub use commands::*;

/// Database path used when neither the flag nor the config names one.
pub const DEFAULT_DATABASE: &str = "tenderflow.db";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tenderflow - tender stage workflow server
///
/// Sixteen fixed stages from identification to the letter of award,
/// role-gated finalization and an integer progress rollup.
#[derive(Parser, Debug)]
#[command(name = "tenderflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the tender database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Path to a TOML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where tenders are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    /// ACID database
    #[default]
    Redb,
    /// Snapshot file rewritten after every command
    File,
}

impl Backend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Redb => "redb",
            Backend::File => "file",
        }
    }

    /// Parse a config value.
    pub fn parse(raw: &str) -> Result<Self, TenderflowError> {
        <Self as ValueEnum>::from_str(raw, true).map_err(|_| {
            TenderflowError::InvalidArgument(format!(
                "Unknown backend '{}'. Use: redb, file",
                raw
            ))
        })
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (default from config, then 127.0.0.1)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (default from config, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// List the stage registry
    Stages,

    /// Create a tender; stage 1 completes on behalf of the creator
    Create {
        /// Acting user
        #[arg(short, long)]
        user: String,

        /// Tender title (overrides the draft file's)
        #[arg(short, long)]
        title: Option<String>,

        /// Member as user:role (repeatable)
        #[arg(short, long = "member")]
        members: Vec<String>,

        /// JSON draft with checklist, BOQ and approvals
        #[arg(long)]
        draft: Option<PathBuf>,
    },

    /// Show a tender with its progress and eligibility
    Show {
        /// Tender id
        tender_id: String,
    },

    /// Finalize one stage
    Finalize {
        /// Tender id
        tender_id: String,

        /// Stage id, e.g. 5_technical
        stage: String,

        /// Acting user
        #[arg(short, long)]
        user: String,

        /// Evidence reference (repeatable)
        #[arg(short, long = "evidence")]
        evidence: Vec<String>,

        /// Free-text note for the audit log
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Record the LOA and mark the tender awarded
    Award {
        /// Tender id
        tender_id: String,

        /// Letter of award reference
        #[arg(short, long)]
        loa_ref: String,

        /// Acting user (must be an admin member)
        #[arg(short, long)]
        user: String,

        /// Free-text note for the audit log
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Complete every auto or hybrid stage whose condition holds
    Advance {
        /// Tender id
        tender_id: String,

        /// Member credited with the completions (default: system)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Add the stage-1 record to every tender that lacks one
    Backfill {
        /// Operator recorded in the audit log
        #[arg(short, long, default_value = "system")]
        operator: String,
    },

    /// Import tenders from a JSON array or an exported snapshot
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Operator recorded in the audit log
        #[arg(short, long, default_value = "system")]
        operator: String,
    },

    /// Export tenders and audit log
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (json, snapshot)
        #[arg(short = 't', long, default_value = "json")]
        format: String,
    },

    /// Show a tender's audit log
    Audit {
        /// Tender id
        tender_id: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolved settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub json_mode: bool,
    pub config: Config,
}

impl Context {
    /// Merge CLI flags over the config file. Flags win.
    pub fn resolve(cli: &Cli) -> Result<Self, TenderflowError> {
        let config = Config::load(cli.config.as_deref())?;
        let backend = match (cli.backend, config.storage.backend.as_deref()) {
            (Some(backend), _) => backend,
            (None, Some(raw)) => Backend::parse(raw)?,
            (None, None) => Backend::default(),
        };
        let database = cli
            .database
            .clone()
            .or_else(|| config.storage.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

        Ok(Self {
            database,
            backend,
            json_mode: cli.json_mode,
            config,
        })
    }
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TenderflowError> {
    let ctx = Context::resolve(&cli)?;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&ctx, host, port).await,
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Stages) => cmd_stages(&ctx),
        Some(Commands::Create {
            user,
            title,
            members,
            draft,
        }) => cmd_create(&ctx, &user, title, &members, draft.as_deref()),
        Some(Commands::Show { tender_id }) => cmd_show(&ctx, &tender_id),
        Some(Commands::Finalize {
            tender_id,
            stage,
            user,
            evidence,
            notes,
        }) => cmd_finalize(&ctx, &tender_id, &stage, &user, evidence, notes),
        Some(Commands::Award {
            tender_id,
            loa_ref,
            user,
            notes,
        }) => cmd_award(&ctx, &tender_id, &loa_ref, &user, notes),
        Some(Commands::Advance { tender_id, user }) => {
            cmd_advance(&ctx, &tender_id, user.as_deref())
        }
        Some(Commands::Backfill { operator }) => cmd_backfill(&ctx, &operator),
        Some(Commands::Import { input, operator }) => cmd_import(&ctx, &input, &operator),
        Some(Commands::Export { output, format }) => cmd_export(&ctx, &output, &format),
        Some(Commands::Audit { tender_id }) => cmd_audit(&ctx, &tender_id),
        None => {
            // No subcommand - list the registry by default
            cmd_stages(&ctx)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
