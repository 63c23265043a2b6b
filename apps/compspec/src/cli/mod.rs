//! # compspec CLI Module
//!
//! This module implements the CLI interface for compspec.
//!
//! ## Available Commands
//!
//! - `match` - Build the compatibility graph for a manifest and match constraints
//! - `check` - Report which artifacts in a manifest cannot be fetched
//! - `create` - Create a compatibility artifact from a request
//! - `extract` - Run extractors and print the host facts
//! - `list` - List plugins and their sections

mod commands;

use crate::config::Settings;
use crate::fetch::Cancellation;
use clap::{Args, Parser, Subcommand};
use compspec_core::CompspecError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// compspec - container image compatibility
///
/// Match container images to a host by the compatibility artifacts
/// published next to them, or describe the host to create those artifacts.
#[derive(Parser, Debug)]
#[command(name = "compspec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long = "json", global = true)]
    pub json_mode: bool,

    /// Settings file (TOML); defaults to $COMPSPEC_CONFIG
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Match images in a manifest against key=value constraints
    Match(MatchArgs),

    /// Check that every artifact in a manifest can be fetched
    Check {
        /// Manifest of images and their artifacts (YAML or JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Artifact cache directory (must exist)
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Media type of the artifact layer
        #[arg(long)]
        media_type: Option<String>,
    },

    /// Create a compatibility artifact from a request
    Create {
        /// Compatibility request (YAML or JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Custom field, extractor.section.field=value (repeatable)
        #[arg(short = 'a', long = "append", value_name = "FIELD=VALUE")]
        fields: Vec<String>,

        /// Write the artifact here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep going when an extractor fails
        #[arg(long)]
        allow_fail: bool,

        /// Fail if any attribute cannot be resolved
        #[arg(long)]
        strict: bool,
    },

    /// Run extractors and print what they find
    Extract {
        /// Extractors to run, as name or name[section,...] (default: all)
        names: Vec<String>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep going when an extractor fails
        #[arg(long)]
        allow_fail: bool,
    },

    /// List plugins and their sections
    List {
        /// Plugins to show, as name or name[section,...] (default: all)
        names: Vec<String>,
    },
}

/// Arguments of the `match` command.
#[derive(Args, Debug, Clone)]
pub struct MatchArgs {
    /// Manifest of images and their artifacts (YAML or JSON)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Constraint key=value with a fully qualified key (repeatable, ANDed)
    #[arg(short = 'a', long = "append", value_name = "KEY=VALUE")]
    pub constraints: Vec<String>,

    /// Artifact cache directory (must exist)
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Graph cache file: loaded if present, written if not
    #[arg(long)]
    pub graph: Option<PathBuf>,

    /// Media type of the artifact layer
    #[arg(long)]
    pub media_type: Option<String>,

    /// Skip images whose artifact cannot be fetched
    #[arg(long)]
    pub allow_fail: bool,

    /// Print the image to node mapping instead of matching
    #[arg(long)]
    pub print_mapping: bool,

    /// Print the graph instead of matching
    #[arg(long)]
    pub print_graph: bool,

    /// Shuffle the matches
    #[arg(long)]
    pub randomize: bool,

    /// Print only the first match
    #[arg(long)]
    pub single: bool,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli, cancel: Cancellation) -> Result<(), CompspecError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Match(args)) => {
            apply_fetch_flags(&mut settings, args.cache.clone(), args.media_type.clone());
            cmd_match(&settings, cancel, json_mode, args).await
        }
        Some(Commands::Check {
            input,
            cache,
            media_type,
        }) => {
            apply_fetch_flags(&mut settings, cache, media_type);
            cmd_check(&settings, cancel, json_mode, &input).await
        }
        Some(Commands::Create {
            input,
            fields,
            output,
            allow_fail,
            strict,
        }) => cmd_create(&settings, &input, fields, output.as_deref(), allow_fail, strict),
        Some(Commands::Extract {
            names,
            output,
            allow_fail,
        }) => cmd_extract(&settings, &names, output.as_deref(), allow_fail),
        Some(Commands::List { names }) => cmd_list(&settings, json_mode, &names),
        None => {
            // No subcommand - list plugins by default
            cmd_list(&settings, json_mode, &[])
        }
    }
}

fn apply_fetch_flags(settings: &mut Settings, cache: Option<PathBuf>, media_type: Option<String>) {
    if let Some(cache) = cache {
        settings.cache_dir = Some(cache);
    }
    if let Some(media_type) = media_type {
        settings.media_type = media_type;
    }
}
