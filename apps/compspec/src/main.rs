//! # compspec
//!
//! Container image compatibility from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Images in the manifest that run on an x86_64 host
//! compspec match -i manifest.yaml -a io.archspec.cpu.target=x86_64
//!
//! # Reuse fetched artifacts and the built graph between runs
//! compspec match -i manifest.yaml --cache ./cache --graph graph.json -a ...
//!
//! # Describe this host and create an artifact from a request
//! compspec extract system[os,arch]
//! compspec create -i request.yaml -o artifact.json
//! ```

use clap::Parser;
use compspec::{cli, fetch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Initialize tracing (COMPSPEC_LOG_FORMAT=json for machine-parseable output)
    // Logs go to stderr so command output on stdout stays clean.
    let log_format = std::env::var("COMPSPEC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "compspec=debug"
    } else {
        "compspec=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Ctrl-C cancels in-flight fetches
    let (handle, cancel) = fetch::cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli, cancel).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the compspec startup banner to stderr.
fn print_banner() {
    eprintln!(
        r#"
   ___ ___  _ __ ___  _ __  ___ _ __   ___  ___
  / __/ _ \| '_ ` _ \| '_ \/ __| '_ \ / _ \/ __|
 | (_| (_) | | | | | | |_) \__ \ |_) |  __/ (__
  \___\___/|_| |_| |_| .__/|___/ .__/ \___|\___|
                     |_|       |_|

  Container Compatibility v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
