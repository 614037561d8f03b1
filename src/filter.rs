//! Record selection for the fact table.
//!
//! A [`FilterSpec`] combines a date range, categorical value sets and numeric
//! ranges. Every clause must hold, and all of them are checked in a single
//! pass over the records. Clauses can also be written as text such as
//! `chain=CH1,CH2` or `cnq>=100` and parsed with [`parse_clause`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::debug;

use crate::{
    cost::NormalizedRecord,
    data::{UNKNOWN, parse_naive_date, parse_number},
    error::{EngineError, EngineResult},
    fields::{MetricField, SemanticField},
};

/// Inclusive date bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_set(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Undated records never fall inside a bounded range.
    fn contains(&self, date: Option<NaiveDate>) -> bool {
        if !self.is_set() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// Inclusive numeric bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    /// Tightest range satisfying both `self` and `other`.
    pub fn intersect(self, other: NumericRange) -> NumericRange {
        let pick = |a: Option<f64>, b: Option<f64>, f: fn(f64, f64) -> f64| match (a, b) {
            (Some(a), Some(b)) => Some(f(a, b)),
            (a, b) => a.or(b),
        };
        NumericRange {
            min: pick(self.min, other.min, f64::max),
            max: pick(self.max, other.max, f64::min),
        }
    }
}

/// Row selection over the fact table. Every populated entry must hold for a
/// record to be kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub date_range: DateRange,
    pub categorical: BTreeMap<SemanticField, BTreeSet<String>>,
    pub numeric: BTreeMap<MetricField, NumericRange>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.date_range = DateRange { start, end };
        self
    }

    pub fn with_values<I, S>(mut self, field: SemanticField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categorical
            .entry(field)
            .or_default()
            .extend(values.into_iter().map(|v| v.into().trim().to_string()));
        self
    }

    pub fn with_range(mut self, metric: MetricField, min: Option<f64>, max: Option<f64>) -> Self {
        self.add_range(metric, NumericRange::new(min, max));
        self
    }

    /// Builds a spec from textual clauses such as `chain=CH1,CH2` or
    /// `cnq>=100`. Repeated value clauses on one field widen the accepted set;
    /// repeated bounds on one metric narrow the range.
    pub fn from_clauses(clauses: &[String]) -> EngineResult<Self> {
        let mut spec = FilterSpec::new();
        for clause in clauses {
            match parse_clause(clause)? {
                FilterClause::Values(field, values) => {
                    spec = spec.with_values(field, values);
                }
                FilterClause::Range(metric, range) => spec.add_range(metric, range),
            }
        }
        Ok(spec)
    }

    fn add_range(&mut self, metric: MetricField, range: NumericRange) {
        let merged = match self.numeric.get(&metric) {
            Some(existing) => existing.intersect(range),
            None => range,
        };
        self.numeric.insert(metric, merged);
    }

    pub fn is_empty(&self) -> bool {
        !self.date_range.is_set()
            && self.categorical.values().all(|values| values.is_empty())
            && self.numeric.is_empty()
    }

    pub fn validate(&self) -> EngineResult<()> {
        if let (Some(start), Some(end)) = (self.date_range.start, self.date_range.end)
            && start > end
        {
            return Err(EngineError::InvalidDateRange { start, end });
        }
        if let Some(field) = self.categorical.keys().find(|field| !field.is_categorical()) {
            return Err(EngineError::NotCategorical(*field));
        }
        for (metric, range) in &self.numeric {
            if let (Some(min), Some(max)) = (range.min, range.max)
                && min > max
            {
                return Err(EngineError::InvalidRange {
                    metric: *metric,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        if !self.date_range.contains(record.date) {
            return false;
        }
        let categorical_ok = self.categorical.iter().all(|(field, values)| {
            values.is_empty() || values.contains(record.dimension(*field).unwrap_or(UNKNOWN))
        });
        categorical_ok
            && self
                .numeric
                .iter()
                .all(|(metric, range)| range.contains(record.metric(*metric)))
    }
}

/// Keeps the records satisfying every entry of `spec`, preserving order.
pub fn filter(records: &[NormalizedRecord], spec: &FilterSpec) -> EngineResult<Vec<NormalizedRecord>> {
    spec.validate()?;
    if spec.is_empty() {
        return Ok(records.to_vec());
    }
    let kept = records
        .iter()
        .filter(|record| spec.matches(record))
        .cloned()
        .collect::<Vec<_>>();
    debug!("Filter kept {} of {} record(s)", kept.len(), records.len());
    Ok(kept)
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Values(SemanticField, BTreeSet<String>),
    Range(MetricField, NumericRange),
}

pub fn parse_clause(clause: &str) -> EngineResult<FilterClause> {
    let trimmed = clause.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidClause(clause.to_string()));
    }

    for needle in [">=", "<=", "="] {
        if let Some(idx) = trimmed.find(needle) {
            let left = trimmed[..idx].trim();
            let right = unquote(trimmed[idx + needle.len()..].trim());
            if left.is_empty() || right.is_empty() {
                return Err(EngineError::InvalidClause(trimmed.to_string()));
            }
            if needle == "=" && let Some(field) = categorical_field(left)? {
                let values = right
                    .split(',')
                    .map(|v| unquote(v.trim()).to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                return Ok(FilterClause::Values(field, values));
            }
            let metric = left.parse::<MetricField>()?;
            let range = match needle {
                ">=" => NumericRange::new(Some(number(right, trimmed)?), None),
                "<=" => NumericRange::new(None, Some(number(right, trimmed)?)),
                _ => match right.split_once("..") {
                    Some((low, high)) => NumericRange::new(
                        optional_number(low, trimmed)?,
                        optional_number(high, trimmed)?,
                    ),
                    None => {
                        let value = number(right, trimmed)?;
                        NumericRange::new(Some(value), Some(value))
                    }
                },
            };
            return Ok(FilterClause::Range(metric, range));
        }
    }

    Err(EngineError::InvalidClause(trimmed.to_string()))
}

/// Parses a CLI date bound.
pub fn parse_date_bound(value: &str) -> EngineResult<NaiveDate> {
    parse_naive_date(value).ok_or_else(|| EngineError::InvalidClause(value.to_string()))
}

/// `Some` for categorical fields; an error for semantic fields that have no
/// value filter, and `None` for names that only exist as metrics.
fn categorical_field(name: &str) -> EngineResult<Option<SemanticField>> {
    match name.parse::<SemanticField>() {
        Ok(field) if field.is_categorical() => Ok(Some(field)),
        Ok(field) if field.as_metric().is_some() => Ok(None),
        Ok(field) => Err(EngineError::NotCategorical(field)),
        Err(_) => Ok(None),
    }
}

fn number(value: &str, clause: &str) -> EngineResult<f64> {
    parse_number(value).ok_or_else(|| EngineError::InvalidClause(clause.to_string()))
}

fn optional_number(value: &str, clause: &str) -> EngineResult<Option<f64>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        number(value, clause).map(Some)
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}
