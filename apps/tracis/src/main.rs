//! # Tracis - Versioned Traceability Server
//!
//! The main binary for the Tracis trace commit engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for commits, queries, and exports
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │               apps/tracis (THE BINARY)             │
//! │                                                    │
//! │   ┌─────────────┐          ┌─────────────┐         │
//! │   │   CLI       │          │   HTTP API  │         │
//! │   │  (clap)     │          │   (axum)    │         │
//! │   └──────┬──────┘          └──────┬──────┘         │
//! │          │                        │                │
//! │          └───────────┬────────────┘                │
//! │                      ▼                             │
//! │              ┌───────────────┐                     │
//! │              │  tracis-core  │                     │
//! │              │ (THE ENGINE)  │                     │
//! │              └───────────────┘                     │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! tracis server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! tracis status
//! tracis commit -f changes.json --version 3 --actor alice
//! tracis query -t reachability --version 3 --artifact 1
//! ```

use clap::Parser;
use tracis::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — TRACIS_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TRACIS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tracis=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Tracis startup banner.
fn print_banner() {
    println!(
        r#"
  ████████╗██████╗  █████╗  ██████╗██╗███████╗
  ╚══██╔══╝██╔══██╗██╔══██╗██╔════╝██║██╔════╝
     ██║   ██████╔╝███████║██║     ██║███████╗
     ██║   ██╔══██╗██╔══██║██║     ██║╚════██║
     ██║   ██║  ██║██║  ██║╚██████╗██║███████║
     ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝╚═╝╚══════╝

  Versioned Traceability Server v{}

  Versioned • Consistent • Traceable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
