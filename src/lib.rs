pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod cost;
pub mod data;
pub mod error;
pub mod fields;
pub mod filter;
pub mod io_utils;
pub mod pipeline;
pub mod resolver;
pub mod summary;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

pub use crate::{
    aggregate::{GroupRow, MetricSpec, ReduceOp, aggregate},
    config::{CostSettings, EngineConfig},
    cost::{NormalizedRecord, PercentageBasis, derive_costs},
    data::RawTable,
    error::{EngineError, EngineResult},
    fields::{GroupField, MetricField, SemanticField},
    filter::{FilterSpec, filter},
    pipeline::{Dataset, LoadOptions},
    resolver::{FieldResolution, resolve},
    summary::{CnqSummary, summarize},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("cnq_engine", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Resolve(args) => commands::resolve(&args),
        Commands::Normalize(args) => commands::normalize(&args),
        Commands::Summary(args) => commands::summary(&args),
        Commands::Aggregate(args) => commands::aggregate(&args),
        Commands::Options(args) => commands::options(&args),
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
