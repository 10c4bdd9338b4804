use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::lookup::DEFAULT_TAGFINDER_URL;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Derive a minimal imposm mapping from the SLD styles that render it",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild the mapping so it only loads what the configured styles use
    Remap(RemapArgs),
    /// Print what one or more SLD files require without touching a mapping
    Inspect(InspectArgs),
    /// Write a configuration skeleton listing every table of a mapping
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct RemapArgs {
    /// Configuration file (.json, .yaml or .yml)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Mapping file to narrow (overrides mapping_path)
    #[arg(short, long)]
    pub mapping: Option<PathBuf>,
    /// Directory receiving the rebuilt mapping (overrides mapping_out_path)
    #[arg(short = 'o', long = "out-dir")]
    pub out_dir: Option<PathBuf>,
    /// File name prefix of the rebuilt mapping (overrides mapping_prefix)
    #[arg(long)]
    pub prefix: Option<String>,
    /// Narrow mapping values even where a style does not filter them explicitly
    #[arg(long = "force-filtering")]
    pub force_filtering: bool,
    /// Look up unknown columns and mapping values in the tagfinder service
    #[arg(long = "allow-lookup")]
    pub allow_lookup: bool,
    /// Base URL of the tagfinder service
    #[arg(long = "lookup-url", default_value = DEFAULT_TAGFINDER_URL)]
    pub lookup_url: String,
    /// Generalized table tolerance as a percentage of the smallest min scale
    #[arg(long = "tolerance-scaling")]
    pub tolerance_scaling: Option<f64>,
    /// Abort when any style file cannot be analyzed
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// SLD files to analyze
    #[arg(required = true)]
    pub styles: Vec<PathBuf>,
    /// Name of the column holding the mapping value
    #[arg(long = "mapping-value-column")]
    pub mapping_value_column: Option<String>,
    /// Name of the column holding the mapping key
    #[arg(long = "mapping-key-column")]
    pub mapping_key_column: Option<String>,
    /// Treat unfiltered rules that only carry labels as explicit
    #[arg(long = "label-rules-explicit")]
    pub label_rules_explicit: bool,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Mapping file whose tables are listed
    #[arg(short, long)]
    pub mapping: PathBuf,
    /// Configuration file to create (.json, .yaml or .yml)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Output directory recorded in the skeleton (defaults to the mapping's directory)
    #[arg(short = 'o', long = "out-dir")]
    pub out_dir: Option<PathBuf>,
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}
