//! Group-by aggregation over normalized records.
//!
//! Records are partitioned by the tuple of their [`GroupField`] values and each
//! requested [`MetricSpec`] is reduced per partition. The dashboards only ever
//! sum, but mean, min, max and count are available for every metric.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::Datelike;
use itertools::Itertools;
use log::debug;
use serde::Serialize;

use crate::{
    cost::NormalizedRecord,
    data::{UNKNOWN, format_number},
    error::{EngineError, EngineResult},
    fields::{GroupField, MetricField, SemanticField},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ReduceOp {
    #[default]
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl ReduceOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Mean => "mean",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
            ReduceOp::Count => "count",
        }
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReduceOp {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" | "total" => Ok(ReduceOp::Sum),
            "mean" | "avg" | "average" => Ok(ReduceOp::Mean),
            "min" => Ok(ReduceOp::Min),
            "max" => Ok(ReduceOp::Max),
            "count" => Ok(ReduceOp::Count),
            _ => Err(EngineError::UnknownReduceOp(value.trim().to_string())),
        }
    }
}

/// A metric and the way it is reduced within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricSpec {
    pub metric: MetricField,
    pub op: ReduceOp,
}

impl MetricSpec {
    pub fn new(metric: MetricField, op: ReduceOp) -> Self {
        Self { metric, op }
    }

    pub fn sum(metric: MetricField) -> Self {
        Self::new(metric, ReduceOp::Sum)
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.metric.column_label(), self.op)
    }
}

impl FromStr for MetricSpec {
    type Err = EngineError;

    /// Accepts `metric` or `metric:op`, e.g. `cnq:sum`, `rework-cost:mean`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (metric, op) = match value.split_once(':') {
            Some((metric, op)) => (metric, op.parse()?),
            None => (value, ReduceOp::default()),
        };
        Ok(MetricSpec::new(metric.parse()?, op))
    }
}

/// Parses comma-separated group fields and metric specs from CLI arguments.
pub fn parse_group_fields(values: &[String]) -> EngineResult<Vec<GroupField>> {
    split_list(values).map(|s| s.parse()).collect()
}

pub fn parse_metric_specs(values: &[String]) -> EngineResult<Vec<MetricSpec>> {
    split_list(values).map(|s| s.parse()).collect()
}

fn split_list(values: &[String]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    /// One value per group-by field, in request order.
    pub keys: Vec<String>,
    /// One reduced value per metric spec, in request order.
    pub values: Vec<f64>,
    /// Number of records in the group.
    pub count: usize,
}

impl GroupRow {
    pub fn to_cells(&self) -> Vec<String> {
        self.keys
            .iter()
            .cloned()
            .chain(self.values.iter().map(|v| format_number(*v)))
            .chain(std::iter::once(self.count.to_string()))
            .collect_vec()
    }
}

/// Column labels matching [`GroupRow::to_cells`].
pub fn header_labels(group_by: &[GroupField], metrics: &[MetricSpec]) -> Vec<String> {
    group_by
        .iter()
        .map(|field| field.label())
        .chain(metrics.iter().map(|spec| spec.label()))
        .chain(std::iter::once("records".to_string()))
        .collect_vec()
}

/// The grouping value of `record` for `field`; undated records and other
/// missing values fall under [`UNKNOWN`].
pub fn group_value(record: &NormalizedRecord, field: GroupField) -> String {
    let date = record.date;
    match field {
        GroupField::Dimension(SemanticField::Date) => date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        GroupField::Dimension(semantic) => record
            .dimension(semantic)
            .unwrap_or(UNKNOWN)
            .to_string(),
        GroupField::Year => date.map(|d| d.year().to_string()).unwrap_or_else(|| UNKNOWN.to_string()),
        GroupField::Month => date
            .map(|d| format!("{:02}", d.month()))
            .unwrap_or_else(|| UNKNOWN.to_string()),
        GroupField::Quarter => date
            .map(|d| format!("Q{}", (d.month() - 1) / 3 + 1))
            .unwrap_or_else(|| UNKNOWN.to_string()),
        GroupField::Week => date
            .map(|d| {
                let week = d.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            })
            .unwrap_or_else(|| UNKNOWN.to_string()),
        GroupField::Period => date
            .map(|d| d.format("%Y-%m").to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        GroupField::Metric(metric) => format_number(record.metric(metric)),
    }
}

/// Partitions `records` by `group_by` and reduces `metrics` per partition.
///
/// An empty `group_by` yields a single global row, except on empty input,
/// which always yields no rows. Empty `metrics` yields the distinct key
/// tuples. Rows come back ordered by key.
pub fn aggregate(
    records: &[NormalizedRecord],
    group_by: &[GroupField],
    metrics: &[MetricSpec],
) -> Vec<GroupRow> {
    let mut groups: BTreeMap<Vec<String>, GroupAccumulator> = BTreeMap::new();
    for record in records {
        let key = group_by
            .iter()
            .map(|field| group_value(record, *field))
            .collect_vec();
        groups
            .entry(key)
            .or_insert_with(|| GroupAccumulator::new(metrics.len()))
            .ingest(record, metrics);
    }
    let rows = groups
        .into_iter()
        .map(|(keys, accumulator)| accumulator.finish(keys, metrics))
        .collect_vec();
    debug!(
        "Aggregated {} record(s) into {} group(s) by [{}]",
        records.len(),
        rows.len(),
        group_by.iter().join(", ")
    );
    rows
}

/// Orders rows by the metric at `metric_index` (or by record count when the
/// index is out of range), breaking ties by key.
pub fn sort_rows(rows: &mut [GroupRow], metric_index: usize, descending: bool) {
    rows.sort_by(|a, b| {
        let primary = match (a.values.get(metric_index), b.values.get(metric_index)) {
            (Some(x), Some(y)) => x.total_cmp(y),
            _ => a.count.cmp(&b.count),
        };
        let primary = if descending { primary.reverse() } else { primary };
        primary.then_with(|| a.keys.cmp(&b.keys))
    });
}

/// Keeps the first `n` rows; `0` keeps everything.
pub fn top_n(mut rows: Vec<GroupRow>, n: usize) -> Vec<GroupRow> {
    if n > 0 && rows.len() > n {
        rows.truncate(n);
    }
    rows
}

struct GroupAccumulator {
    count: usize,
    stats: Vec<MetricStats>,
}

impl GroupAccumulator {
    fn new(metric_count: usize) -> Self {
        Self {
            count: 0,
            stats: vec![MetricStats::default(); metric_count],
        }
    }

    fn ingest(&mut self, record: &NormalizedRecord, metrics: &[MetricSpec]) {
        self.count += 1;
        for (stats, spec) in self.stats.iter_mut().zip(metrics) {
            stats.add_value(record.metric(spec.metric));
        }
    }

    fn finish(self, keys: Vec<String>, metrics: &[MetricSpec]) -> GroupRow {
        let values = self
            .stats
            .iter()
            .zip(metrics)
            .map(|(stats, spec)| stats.reduce(spec.op))
            .collect_vec();
        GroupRow {
            keys,
            values,
            count: self.count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MetricStats {
    sum: f64,
    count: usize,
    min: Option<f64>,
    max: Option<f64>,
}

impl MetricStats {
    fn add_value(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |current| current.min(value)));
        self.max = Some(self.max.map_or(value, |current| current.max(value)));
    }

    fn reduce(&self, op: ReduceOp) -> f64 {
        match op {
            ReduceOp::Sum => self.sum,
            ReduceOp::Mean if self.count > 0 => self.sum / self.count as f64,
            ReduceOp::Mean => 0.0,
            ReduceOp::Min => self.min.unwrap_or(0.0),
            ReduceOp::Max => self.max.unwrap_or(0.0),
            ReduceOp::Count => self.count as f64,
        }
    }
}
