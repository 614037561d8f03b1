//! Subcommand handlers: load, derive, filter, then print or export.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::UTF_8;
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{
    aggregate::{self, MetricSpec},
    cli::{AggregateArgs, FilterArgs, InputArgs, NormalizeArgs, OptionsArgs, ResolveArgs, SummaryArgs},
    config::{CostSettings, EngineConfig, validate_rework_factor},
    cost::{NormalizedRecord, PercentageBasis},
    data::format_number,
    fields::{MetricField, SemanticField},
    filter::{self, FilterSpec, parse_date_bound},
    io_utils,
    pipeline::{Dataset, LoadOptions},
    printable_delimiter,
    summary::{self, CnqSummary},
    table,
};

const RECORD_DIMENSIONS: [SemanticField; 6] = [
    SemanticField::Chain,
    SemanticField::Operation,
    SemanticField::OperationLabel,
    SemanticField::Controller,
    SemanticField::Category,
    SemanticField::DefectType,
];

/// Reads the config (if any), applies the CLI rework factor and loads the
/// input once.
fn open_dataset(args: &InputArgs) -> Result<(Dataset, CostSettings)> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Loading configuration from {path:?}"))?,
        None => EngineConfig::default(),
    };
    let mut settings = config.settings;
    if let Some(factor) = args.rework_factor {
        validate_rework_factor(factor)?;
        settings = settings.with_rework_factor(factor);
    }
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    info!(
        "Reading '{}' with delimiter '{}' (rework factor {})",
        args.input.display(),
        printable_delimiter(delimiter),
        settings.rework_factor
    );
    let options = LoadOptions {
        delimiter: Some(delimiter),
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
        aliases: config.alias_table(),
    };
    let dataset = Dataset::load(&args.input, &options)?;
    Ok((dataset, settings))
}

fn filter_spec(args: &FilterArgs) -> Result<FilterSpec> {
    let start = args.from.as_deref().map(parse_date_bound).transpose()?;
    let end = args.to.as_deref().map(parse_date_bound).transpose()?;
    let spec = FilterSpec::from_clauses(&args.filters)?.with_date_range(start, end);
    spec.validate()?;
    Ok(spec)
}

fn filtered_records(
    dataset: &Dataset,
    settings: &CostSettings,
    args: &FilterArgs,
) -> Result<Vec<NormalizedRecord>> {
    let spec = filter_spec(args)?;
    let records = dataset.derive(settings);
    if spec.is_empty() {
        return Ok(records);
    }
    let kept = filter::filter(&records, &spec)?;
    info!("Filters kept {} of {} record(s)", kept.len(), records.len());
    Ok(kept)
}

pub fn resolve(args: &ResolveArgs) -> Result<()> {
    let (dataset, _) = open_dataset(&args.input)?;
    let resolution = dataset.resolution();
    let headers = vec![
        "field".to_string(),
        "column".to_string(),
        "position".to_string(),
    ];
    let rows = SemanticField::ALL
        .iter()
        .filter_map(|field| match resolution.get(*field) {
            Some(column) if !args.missing => Some(vec![
                field.to_string(),
                column.name.clone(),
                (column.index + 1).to_string(),
            ]),
            Some(_) => None,
            None => Some(vec![field.to_string(), "-".to_string(), "-".to_string()]),
        })
        .collect_vec();
    table::print_table(&headers, &rows);
    info!(
        "{} field(s) unresolved; percentage basis is {:?}",
        resolution.unresolved().len(),
        dataset.percentage_basis()
    );
    Ok(())
}

fn record_headers() -> Vec<String> {
    ["row", "date"]
        .iter()
        .map(|s| s.to_string())
        .chain(RECORD_DIMENSIONS.iter().map(|f| f.as_str().replace('-', "_")))
        .chain(MetricField::ALL.iter().map(|m| m.column_label()))
        .collect()
}

fn record_cells(record: &NormalizedRecord, render: fn(f64) -> String) -> Vec<String> {
    [
        record.row.to_string(),
        record
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
    ]
    .into_iter()
    .chain(
        RECORD_DIMENSIONS
            .iter()
            .map(|f| record.dimension(*f).unwrap_or_default().to_string()),
    )
    .chain(MetricField::ALL.iter().map(|m| render(record.metric(*m))))
    .collect()
}

pub fn normalize(args: &NormalizeArgs) -> Result<()> {
    let (dataset, settings) = open_dataset(&args.input)?;
    let mut records = filtered_records(&dataset, &settings, &args.filter)?;
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if args.table {
        let rows = records
            .iter()
            .map(|record| record_cells(record, format_number))
            .collect_vec();
        table::print_table(&record_headers(), &rows);
        return Ok(());
    }

    let input_delimiter = io_utils::resolve_input_delimiter(&args.input.input, args.input.delimiter);
    let output_path = args.output.as_deref();
    let delimiter =
        io_utils::resolve_output_delimiter(output_path, args.output_delimiter, input_delimiter);
    let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?.unwrap_or(UTF_8);
    let mut writer = io_utils::open_csv_writer(output_path, delimiter, encoding)?;
    writer
        .write_record(record_headers())
        .context("Writing normalized header")?;
    for record in &records {
        writer
            .write_record(record_cells(record, |v| v.to_string()))
            .with_context(|| format!("Writing normalized row {}", record.row))?;
    }
    writer.flush().context("Flushing normalized output")?;
    info!(
        "Wrote {} normalized record(s) to {}",
        records.len(),
        describe_output(output_path)
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct SummaryReport {
    percentage_basis: PercentageBasis,
    #[serde(flatten)]
    summary: CnqSummary,
}

pub fn summary(args: &SummaryArgs) -> Result<()> {
    let (dataset, settings) = open_dataset(&args.input)?;
    let records = filtered_records(&dataset, &settings, &args.filter)?;
    let report = SummaryReport {
        percentage_basis: dataset.percentage_basis(),
        summary: summary::summarize(&records, &settings),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Serializing summary")?;
        println!("{json}");
        return Ok(());
    }

    let s = &report.summary;
    let rows = vec![
        vec!["records".to_string(), s.records.to_string()],
        vec!["total_cnq".to_string(), format_number(s.total_cnq)],
        vec!["rework_cost".to_string(), format_number(s.rework_cost)],
        vec!["scrap_cost".to_string(), format_number(s.scrap_cost)],
        vec!["penalty_cost".to_string(), format_number(s.penalty_cost)],
        vec!["cnq_percentage".to_string(), format_number(s.cnq_percentage)],
        vec![
            "mean_rework_unit_cost".to_string(),
            format_number(s.mean_rework_unit_cost),
        ],
        vec![
            "mean_scrap_unit_cost".to_string(),
            format_number(s.mean_scrap_unit_cost),
        ],
    ];
    table::print_table(&["metric".to_string(), "value".to_string()], &rows);
    Ok(())
}

pub fn aggregate(args: &AggregateArgs) -> Result<()> {
    let group_by = aggregate::parse_group_fields(&args.group_by)?;
    let mut metrics = aggregate::parse_metric_specs(&args.metrics)?;
    if metrics.is_empty() {
        metrics.push(MetricSpec::sum(MetricField::Cnq));
    }
    let sort_index = args
        .sort
        .as_deref()
        .map(|label| sort_position(label, &metrics))
        .transpose()?;

    let (dataset, settings) = open_dataset(&args.input)?;
    let records = filtered_records(&dataset, &settings, &args.filter)?;
    let mut rows = aggregate::aggregate(&records, &group_by, &metrics);
    if let Some(index) = sort_index {
        aggregate::sort_rows(&mut rows, index, !args.ascending);
    }
    let rows = aggregate::top_n(rows, args.top.unwrap_or(0));
    info!(
        "Aggregated {} record(s) into {} group(s)",
        records.len(),
        rows.len()
    );

    let headers = aggregate::header_labels(&group_by, &metrics);
    let cells = rows.iter().map(|row| row.to_cells()).collect_vec();
    match args.output.as_deref() {
        None => table::print_table(&headers, &cells),
        Some(path) => {
            let input_delimiter =
                io_utils::resolve_input_delimiter(&args.input.input, args.input.delimiter);
            let delimiter = io_utils::resolve_output_delimiter(
                Some(path),
                args.output_delimiter,
                input_delimiter,
            );
            let mut writer = io_utils::open_csv_writer(Some(path), delimiter, UTF_8)?;
            writer
                .write_record(&headers)
                .context("Writing aggregate header")?;
            for row in &cells {
                writer.write_record(row).context("Writing aggregate row")?;
            }
            writer.flush().context("Flushing aggregate output")?;
            info!("Wrote {} group(s) to {}", cells.len(), describe_output(Some(path)));
        }
    }
    Ok(())
}

/// Resolves `--sort` to a metric position; `records` sorts by group size.
fn sort_position(label: &str, metrics: &[MetricSpec]) -> Result<usize> {
    let wanted = label.trim();
    if wanted.eq_ignore_ascii_case("records") {
        return Ok(metrics.len());
    }
    if let Some(index) = metrics.iter().position(|spec| spec.label() == wanted) {
        return Ok(index);
    }
    let spec: MetricSpec = wanted.parse()?;
    metrics
        .iter()
        .position(|candidate| *candidate == spec)
        .ok_or_else(|| {
            anyhow!(
                "Sort key '{wanted}' is not one of the requested metrics ({})",
                metrics.iter().map(|m| m.label()).join(", ")
            )
        })
}

pub fn options(args: &OptionsArgs) -> Result<()> {
    let field: SemanticField = args.field.parse()?;
    if !field.is_categorical() {
        bail!("Field '{field}' has no discrete values to list");
    }
    let (dataset, settings) = open_dataset(&args.input)?;
    let records = dataset.derive(&settings);
    let values = summary::distinct_values(&records, field)?;
    let rows = values.iter().map(|value| vec![value.clone()]).collect_vec();
    table::print_table(&[field.as_str().replace('-', "_")], &rows);
    match summary::date_bounds(&records) {
        Some((first, last)) => println!("dates: {first} .. {last}"),
        None => println!("dates: none"),
    }
    Ok(())
}

fn describe_output(path: Option<&Path>) -> String {
    match path {
        Some(p) if !io_utils::is_dash(p) => format!("{p:?}"),
        _ => "stdout".to_string(),
    }
}
