//! Headline figures for a (filtered) fact table.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    config::CostSettings,
    cost::{NormalizedRecord, cnq_ratio},
    error::{EngineError, EngineResult},
    fields::SemanticField,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CnqSummary {
    pub records: usize,
    pub total_cnq: f64,
    pub rework_cost: f64,
    pub scrap_cost: f64,
    pub penalty_cost: f64,
    /// Weighted ratio over the whole selection, capped like per-record ratios.
    pub cnq_percentage: f64,
    pub mean_rework_unit_cost: f64,
    pub mean_scrap_unit_cost: f64,
}

/// Totals the cost components and computes the selection-wide CNQ ratio.
///
/// The ratio divides total CNQ by total order value when that is positive,
/// otherwise by total quantity at the assumed unit price, and only averages
/// per-record ratios when neither denominator exists.
pub fn summarize(records: &[NormalizedRecord], settings: &CostSettings) -> CnqSummary {
    if records.is_empty() {
        return CnqSummary::default();
    }
    let count = records.len() as f64;

    let total_cnq = sum_of(records, |r| r.cnq);
    let order_value = sum_of(records, |r| r.order_value);
    let quantity = sum_of(records, |r| r.quantity);
    let cnq_percentage = if order_value > 0.0 {
        cnq_ratio(total_cnq, order_value, settings.percentage_cap)
    } else if quantity > 0.0 {
        cnq_ratio(
            total_cnq,
            quantity * settings.assumed_unit_price,
            settings.percentage_cap,
        )
    } else {
        (sum_of(records, |r| r.cnq_percentage) / count).min(settings.percentage_cap)
    };

    CnqSummary {
        records: records.len(),
        total_cnq,
        rework_cost: sum_of(records, |r| r.rework_cost),
        scrap_cost: sum_of(records, |r| r.scrap_cost),
        penalty_cost: sum_of(records, |r| r.penalty_cost),
        cnq_percentage,
        mean_rework_unit_cost: sum_of(records, |r| r.rework_unit_cost) / count,
        mean_scrap_unit_cost: sum_of(records, |r| r.scrap_unit_cost) / count,
    }
}

fn sum_of(records: &[NormalizedRecord], value: fn(&NormalizedRecord) -> f64) -> f64 {
    records.iter().map(value).sum()
}

/// Sorted distinct values of a categorical field, for filter pickers.
pub fn distinct_values(
    records: &[NormalizedRecord],
    field: SemanticField,
) -> EngineResult<Vec<String>> {
    if !field.is_categorical() {
        return Err(EngineError::NotCategorical(field));
    }
    let values = records
        .iter()
        .filter_map(|record| record.dimension(field))
        .map(|value| value.to_string())
        .collect::<BTreeSet<_>>();
    Ok(values.into_iter().collect())
}

/// Earliest and latest parsed dates, if any record is dated.
pub fn date_bounds(records: &[NormalizedRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = records.iter().filter_map(|record| record.date);
    let first = dates.next()?;
    Some(dates.fold((first, first), |(min, max), date| {
        (min.min(date), max.max(date))
    }))
}
