use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Compute cost of non-quality (CNQ) from inspection exports",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show which source column backs each semantic field
    Resolve(ResolveArgs),
    /// Emit the normalized fact table with derived cost columns
    Normalize(NormalizeArgs),
    /// Print headline CNQ figures for the (filtered) data
    Summary(SummaryArgs),
    /// Group the fact table and reduce cost metrics per group
    Aggregate(AggregateArgs),
    /// List distinct values of a categorical field and the date bounds
    Options(OptionsArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Quality export to read ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8, falling back to latin-1)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML file with cost settings and extra column aliases
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Multiplier applied to rework time × hourly rate (overrides the config file)
    #[arg(long = "rework-factor")]
    pub rework_factor: Option<f64>,
}

#[derive(Debug, Args, Default)]
pub struct FilterArgs {
    /// Keep records dated on or after this day
    #[arg(long = "from")]
    pub from: Option<String>,
    /// Keep records dated on or before this day
    #[arg(long = "to")]
    pub to: Option<String>,
    /// Record filters such as `chain=CH1,CH2`, `cnq>=100` or `quantity=10..50`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Only list fields that could not be resolved
    #[arg(long = "missing")]
    pub missing: bool,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter for the output file (defaults to the output extension, then the input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for the output file/stdout (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Render as an aligned table instead of CSV
    #[arg(long)]
    pub table: bool,
    /// Limit number of records emitted
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Emit the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Fields to group by, e.g. `chain`, `period`, `defect-type` (comma-separated or repeated)
    #[arg(short = 'g', long = "group-by", action = clap::ArgAction::Append)]
    pub group_by: Vec<String>,
    /// Metrics to reduce as `metric[:op]`, op in sum|mean|min|max|count (defaults to `cnq:sum`)
    #[arg(short = 'M', long = "metric", action = clap::ArgAction::Append)]
    pub metrics: Vec<String>,
    /// Sort groups by this metric label (e.g. `cnq_sum`); groups stay in key order otherwise
    #[arg(long)]
    pub sort: Option<String>,
    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,
    /// Keep only the first N groups after sorting
    #[arg(long)]
    pub top: Option<usize>,
    /// Output CSV file (table on stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter for the output file (defaults to the output extension, then the input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct OptionsArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Categorical field to list (chain, operation, operation-label, controller, category, defect-type)
    #[arg(short = 'f', long = "field")]
    pub field: String,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
