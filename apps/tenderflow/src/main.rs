//! # Tenderflow - tender stage workflow server
//!
//! The main binary around the `tenderflow-core` engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for tender operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               apps/tenderflow (THE BINARY)           │
//! │                                                      │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │  config  │   │
//! │   │   (clap)    │   │   (axum)    │   │  (toml)  │   │
//! │   └──────┬──────┘   └──────┬──────┘   └────┬─────┘   │
//! │          └─────────────────┼───────────────┘         │
//! │                            ▼                         │
//! │                  ┌──────────────────┐                │
//! │                  │ tenderflow-core  │                │
//! │                  │   (THE LOGIC)    │                │
//! │                  └──────────────────┘                │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! tenderflow --config tenderflow.toml server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! tenderflow create --user alice --title "Ring road" --member alice:admin
//! tenderflow finalize TND-000001 5_technical --user alice -e docs/tech.pdf
//! tenderflow show TND-000001
//! ```

use clap::Parser;
use tenderflow::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // TENDERFLOW_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("TENDERFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tenderflow=info,tower_http=debug".into());

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

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(code = e.kind().as_str(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  ████████╗███████╗███╗   ██╗██████╗ ███████╗██████╗ ███████╗██╗      ██████╗ ██╗    ██╗
  ╚══██╔══╝██╔════╝████╗  ██║██╔══██╗██╔════╝██╔══██╗██╔════╝██║     ██╔═══██╗██║    ██║
     ██║   █████╗  ██╔██╗ ██║██║  ██║█████╗  ██████╔╝█████╗  ██║     ██║   ██║██║ █╗ ██║
     ██║   ██╔══╝  ██║╚██╗██║██║  ██║██╔══╝  ██╔══██╗██╔══╝  ██║     ██║   ██║██║███╗██║
     ██║   ███████╗██║ ╚████║██████╔╝███████╗██║  ██║██║     ███████╗╚██████╔╝╚███╔███╔╝
     ╚═╝   ╚══════╝╚═╝  ╚═══╝╚═════╝ ╚══════╝╚═╝  ╚═╝╚═╝     ╚══════╝ ╚═════╝  ╚══╝╚══╝

  Tender Stage Workflow v{}

  16 Stages • Role-Gated • Audited
"#,
        env!("CARGO_PKG_VERSION")
    );
}
