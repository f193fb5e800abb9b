//! # Tracis CLI Module
//!
//! This module implements the CLI interface for Tracis.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show store status
//! - `commit` - Commit a change set from a JSON file
//! - `query` - Execute a structural query
//! - `export` - Export one version in canonical format
//! - `verify` - Verify a canonical export file
//! - `init` - Initialize a new database

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracis_core::TracisError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tracis - Versioned Traceability Server
///
/// Tracks artifacts and trace links across an append-only version history
/// and keeps the trace matrix and reachability views exactly consistent
/// with it.
#[derive(Parser, Debug)]
#[command(name = "tracis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the store database
    #[arg(short = 'D', long, global = true, default_value = "tracis.db")]
    pub database: PathBuf,

    /// Storage backend: "memory" (volatile) or "redb" (ACID database)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Optional TOML configuration file (flags override file values)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show store status
    Status,

    /// Commit a change set from a JSON file
    Commit {
        /// Path to the change set file (JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Version target of the commit
        #[arg(long)]
        version: u64,

        /// Commit author stamped onto version records
        #[arg(short, long)]
        actor: String,

        /// Abort the whole commit on the first per-entity error
        #[arg(long)]
        fail_on_error: bool,

        /// Treat the lists as the complete state at the version
        #[arg(long)]
        complete_set: bool,
    },

    /// Execute a structural query
    Query {
        /// Query type (lookup, reachability, neighborhood, matrix)
        #[arg(short = 't', long)]
        query_type: String,

        /// Version target
        #[arg(long, default_value = "1")]
        version: u64,

        /// Artifact id (for reachability/neighborhood queries)
        #[arg(long)]
        artifact: Option<u64>,

        /// Project id (for lookup queries)
        #[arg(long)]
        project: Option<u64>,

        /// Artifact name (for lookup queries)
        #[arg(long)]
        name: Option<String>,

        /// Allowed type names for neighborhood queries (comma-separated)
        #[arg(long)]
        types: Option<String>,
    },

    /// Export one version's state in canonical format
    Export {
        /// Version to export
        #[arg(long)]
        version: u64,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Verify a canonical export file
    Verify {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TracisError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port, config }) => {
            cmd_server(&cli.database, backend, host, port, config.as_deref()).await
        }
        Some(Commands::Status) => cmd_status(&cli.database, backend, json_mode),
        Some(Commands::Commit {
            file,
            version,
            actor,
            fail_on_error,
            complete_set,
        }) => cmd_commit(
            &cli.database,
            backend,
            json_mode,
            &file,
            version,
            &actor,
            fail_on_error,
            complete_set,
        ),
        Some(Commands::Query {
            query_type,
            version,
            artifact,
            project,
            name,
            types,
        }) => cmd_query(
            &cli.database,
            backend,
            json_mode,
            &query_type,
            version,
            artifact,
            project,
            name,
            types,
        ),
        Some(Commands::Export { version, output }) => {
            cmd_export(&cli.database, backend, version, &output)
        }
        Some(Commands::Verify { input }) => cmd_verify(&input, json_mode),
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.database, backend, json_mode)
        }
    }
}
