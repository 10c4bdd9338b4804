pub mod classify;
pub mod cli;
pub mod column_type;
pub mod config;
pub mod error;
pub mod extract;
pub mod lookup;
pub mod mapping;
pub mod rebuild;
pub mod remap;
pub mod report;
pub mod requirements;
pub mod rule;
pub mod sql_filter;
pub mod xml_tree;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::classify::NoFilterPolicy;
use crate::cli::{Cli, Commands};
use crate::config::RemapConfig;
use crate::mapping::MappingDocument;
use crate::requirements::MappingColumnNames;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sld_remap", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Remap(args) => handle_remap(&args),
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::Init(args) => handle_init(&args),
    }
}

fn handle_remap(args: &cli::RemapArgs) -> Result<()> {
    let mut config = RemapConfig::load(&args.config)
        .with_context(|| format!("Loading configuration {:?}", args.config))?;
    apply_overrides(&mut config, args);
    debug!("Effective configuration: {config:?}");

    let report = remap::execute(&config, Some(args.lookup_url.as_str()))?;
    for failure in &report.failures {
        warn!(
            "'{}': {:?} was skipped: {}",
            failure.table, failure.path, failure.message
        );
    }
    info!(
        "Mapping for {} style file(s) written to {:?}",
        report.styles_parsed, report.output_path
    );
    Ok(())
}

fn apply_overrides(config: &mut RemapConfig, args: &cli::RemapArgs) {
    if let Some(mapping) = &args.mapping {
        config.mapping_path = Some(mapping.clone());
    }
    if let Some(out_dir) = &args.out_dir {
        config.mapping_out_path = Some(out_dir.clone());
    }
    if let Some(prefix) = &args.prefix {
        config.mapping_prefix = prefix.clone();
    }
    if args.tolerance_scaling.is_some() {
        config.tolerance_scaling = args.tolerance_scaling;
    }
    config.force_filtering |= args.force_filtering;
    config.allow_research |= args.allow_lookup;
    config.strict |= args.strict;
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let columns = MappingColumnNames::new(
        args.mapping_key_column.as_deref(),
        args.mapping_value_column.as_deref(),
    );
    let policy = if args.label_rules_explicit {
        NoFilterPolicy::LabelRulesExplicit
    } else {
        NoFilterPolicy::NonExplicit
    };
    let styles = args
        .styles
        .iter()
        .map(|path| {
            extract::extract_requirements(path, &columns, policy)
                .with_context(|| format!("Analyzing style {path:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    print!("{}", report::inspect_table(&styles));
    Ok(())
}

fn handle_init(args: &cli::InitArgs) -> Result<()> {
    if args.config.exists() && !args.force {
        bail!(
            "configuration {:?} already exists (use --force to overwrite)",
            args.config
        );
    }
    let mapping = fs::canonicalize(&args.mapping)
        .with_context(|| format!("Resolving mapping path {:?}", args.mapping))?;
    let (document, _) = MappingDocument::load(&mapping)
        .with_context(|| format!("Loading mapping {mapping:?}"))?;

    let out_dir = match &args.out_dir {
        Some(dir) => fs::canonicalize(dir).unwrap_or_else(|_| dir.clone()),
        None => mapping
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let skeleton = RemapConfig::skeleton(&document, &mapping, &out_dir);
    skeleton
        .save(&args.config)
        .with_context(|| format!("Writing configuration {:?}", args.config))?;
    info!(
        "Configuration skeleton for {} table(s) and {} generalized table(s) written to {:?}",
        skeleton.tables.len(),
        skeleton.generalized_tables.len(),
        args.config
    );
    Ok(())
}
