//! # Geofile CLI
//!
//! Command-line interface for indexing and querying geospatial data files.
//!
//! ## Commands
//!
//! - `geofile index <data>` - Parse a data file and write its index file
//! - `geofile query <data> <mode> ...` - Query a data file through its index
//! - `geofile status <data>` - Show the index file and the indexes it holds
//! - `geofile clear <data>` - Remove the index file
//!
//! ## Example Usage
//!
//! ```bash
//! # Index a CSV with a header, longitude in column 1 and latitude in column 2
//! geofile index people.csv --attr name:prefix --attr name:fuzzy
//!
//! # Everything inside a box
//! geofile query people.csv bbox -- -10 40 10 50
//!
//! # Word-prefix search
//! geofile query people.csv prefix name "eliz que"
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use geofile_core::IndexDefinition;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Geofile - indexed random access to large geospatial files
#[derive(Parser)]
#[command(name = "geofile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the data lives and how to read it.
#[derive(clap::Args, Debug, Clone)]
pub struct DataArgs {
    /// Data file (CSV or GeoJSON)
    pub data: PathBuf,

    /// Data format, detected from the extension when omitted
    #[arg(short, long)]
    pub format: Option<String>,

    /// Index file, `<data>.idx` when omitted
    #[arg(short, long)]
    pub index: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a data file and write its index file
    Index {
        #[command(flatten)]
        data: DataArgs,

        /// Attribute index to build, as NAME:TYPE with TYPE one of
        /// ordered, fuzzy, prefix (repeatable)
        #[arg(short, long = "attr", value_name = "NAME:TYPE")]
        attrs: Vec<IndexDefinition>,

        /// Rebuild even if the index file exists
        #[arg(long)]
        force: bool,
    },

    /// Query a data file through its index
    Query {
        #[command(flatten)]
        data: DataArgs,

        /// Maximum number of features to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,

        #[command(subcommand)]
        mode: QueryMode,
    },

    /// Show the index file and the indexes it holds
    Status {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Remove the index file
    Clear {
        #[command(flatten)]
        data: DataArgs,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Query kinds, one per index.
#[derive(Subcommand, Debug, Clone)]
pub enum QueryMode {
    /// Features whose bounding box intersects MIN_X MIN_Y MAX_X MAX_Y
    #[command(allow_negative_numbers = true)]
    Bbox {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },

    /// Features at a point
    #[command(allow_negative_numbers = true)]
    Point { lon: f64, lat: f64 },

    /// The closest feature to a point
    #[command(allow_negative_numbers = true)]
    Nearest {
        lon: f64,
        lat: f64,

        /// Search radius, the configured expanding radii when omitted
        #[arg(short, long)]
        radius: Option<f64>,
    },

    /// Exact match on an ordered index
    Search {
        attribute: String,

        #[arg(required = true)]
        values: Vec<String>,

        /// Parse values as JSON (numbers, booleans, null)
        #[arg(long)]
        typed: bool,
    },

    /// Approximate text match on a fuzzy index
    Fuzzy {
        attribute: String,
        text: String,

        /// Drop matches farther than this edit distance
        #[arg(long)]
        max_distance: Option<usize>,
    },

    /// Word-prefix match on a prefix index
    Prefix { attribute: String, text: String },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Load configuration
    let config = match &cli.config {
        Some(path) => geofile_core::GeofileConfig::load_from(path)?,
        None => geofile_core::GeofileConfig::load()?,
    };

    // Execute command
    match cli.command {
        Commands::Index { data, attrs, force } => commands::index::run(config, data, attrs, force),
        Commands::Query {
            data,
            limit,
            output,
            mode,
        } => commands::query::run(config, data, mode, limit, output),
        Commands::Status { data } => commands::status::run(config, data),
        Commands::Clear { data, yes } => commands::clear::run(config, data, yes),
    }
}
