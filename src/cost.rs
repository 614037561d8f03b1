//! Cost-of-non-quality derivation.
//!
//! Turns raw inspection rows into [`NormalizedRecord`]s carrying the rework,
//! scrap and penalty components, their sum (CNQ) and the CNQ ratio. Each
//! component has an ideal formula and a flat-rate fallback for when the
//! columns it needs are absent:
//!
//! | component | ideal | fallback |
//! |-----------|-------|----------|
//! | rework    | defects × time × rate × factor | defects × flat rework cost |
//! | scrap     | second choice × unit price | second choice × flat scrap cost |
//! | penalty   | penalty amount | note × cost per point |
//!
//! Missing or malformed cells contribute zero, so every numeric output is
//! finite and present.

use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;

use crate::{
    config::CostSettings,
    data::{RawTable, UNKNOWN, categorical_value, finite_or_zero, parse_naive_date, parse_number},
    fields::{MetricField, SemanticField},
    resolver::FieldResolution,
};

/// One row of the fact table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    /// 1-based position of the source row.
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub chain: String,
    pub operation: String,
    pub operation_label: String,
    pub controller: String,
    pub category: String,
    pub defect_type: String,
    pub quantity: f64,
    pub quantity_inspected: f64,
    pub quantity_launched: f64,
    pub quantity_second_choice: f64,
    pub defect_count: f64,
    pub order_value: f64,
    pub rework_unit_cost: f64,
    pub rework_cost: f64,
    pub scrap_unit_cost: f64,
    pub scrap_cost: f64,
    pub penalty_cost: f64,
    pub cnq: f64,
    pub cnq_percentage: f64,
}

impl NormalizedRecord {
    /// Value of a categorical dimension; `None` for non-categorical fields.
    pub fn dimension(&self, field: SemanticField) -> Option<&str> {
        let value = match field {
            SemanticField::Chain => &self.chain,
            SemanticField::Operation => &self.operation,
            SemanticField::OperationLabel => &self.operation_label,
            SemanticField::Controller => &self.controller,
            SemanticField::Category => &self.category,
            SemanticField::DefectType => &self.defect_type,
            _ => return None,
        };
        Some(value.as_str())
    }

    pub fn metric(&self, metric: MetricField) -> f64 {
        match metric {
            MetricField::Quantity => self.quantity,
            MetricField::QuantityInspected => self.quantity_inspected,
            MetricField::QuantityLaunched => self.quantity_launched,
            MetricField::QuantitySecondChoice => self.quantity_second_choice,
            MetricField::DefectCount => self.defect_count,
            MetricField::OrderValue => self.order_value,
            MetricField::ReworkUnitCost => self.rework_unit_cost,
            MetricField::ReworkCost => self.rework_cost,
            MetricField::ScrapUnitCost => self.scrap_unit_cost,
            MetricField::ScrapCost => self.scrap_cost,
            MetricField::PenaltyCost => self.penalty_cost,
            MetricField::Cnq => self.cnq,
            MetricField::CnqPercentage => self.cnq_percentage,
        }
    }
}

/// Denominator used for the CNQ ratio of a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PercentageBasis {
    /// CNQ over the manufacturing-order value.
    OrderValue,
    /// CNQ over quantity × assumed unit price.
    Quantity,
    None,
}

impl PercentageBasis {
    /// Order value is only trusted when the column totals above zero.
    pub fn select(table: &RawTable, resolution: &FieldResolution) -> Self {
        if let Some(index) = resolution.index(SemanticField::OrderValue) {
            let total: f64 = (0..table.len())
                .filter_map(|row| parse_number(table.cell(row, index)))
                .sum();
            if total > 0.0 {
                return PercentageBasis::OrderValue;
            }
        }
        if resolution.is_resolved(SemanticField::Quantity) {
            PercentageBasis::Quantity
        } else {
            PercentageBasis::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReworkRule {
    TimeAndRate,
    FlatRate,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrapRule {
    UnitPrice,
    FlatRate,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PenaltyRule {
    Amount,
    Note,
    Absent,
}

/// Formula choices fixed once per dataset from the resolved columns.
#[derive(Debug, Clone, Copy)]
struct CostPlan {
    rework: ReworkRule,
    scrap: ScrapRule,
    penalty: PenaltyRule,
    basis: PercentageBasis,
}

impl CostPlan {
    fn new(table: &RawTable, resolution: &FieldResolution) -> Self {
        let has = |field| resolution.is_resolved(field);
        let rework = if has(SemanticField::ReworkUnitTime) && has(SemanticField::HourlyRate) {
            ReworkRule::TimeAndRate
        } else if has(SemanticField::DefectCount) {
            ReworkRule::FlatRate
        } else {
            ReworkRule::Absent
        };
        let scrap = if has(SemanticField::UnitPrice) {
            ScrapRule::UnitPrice
        } else if has(SemanticField::QuantitySecondChoice) {
            ScrapRule::FlatRate
        } else {
            ScrapRule::Absent
        };
        let penalty = if has(SemanticField::PenaltyAmount) {
            PenaltyRule::Amount
        } else if has(SemanticField::DefectNote) {
            PenaltyRule::Note
        } else {
            PenaltyRule::Absent
        };
        Self {
            rework,
            scrap,
            penalty,
            basis: PercentageBasis::select(table, resolution),
        }
    }
}

/// Derives the fact table, one record per input row, in input order.
pub fn derive_costs(
    table: &RawTable,
    resolution: &FieldResolution,
    settings: &CostSettings,
) -> Vec<NormalizedRecord> {
    let plan = CostPlan::new(table, resolution);
    debug!(
        "Cost plan: rework {:?}, scrap {:?}, penalty {:?}, ratio basis {:?}",
        plan.rework, plan.scrap, plan.penalty, plan.basis
    );
    let records = (0..table.len())
        .map(|row| {
            let cells = RowCells {
                table,
                resolution,
                row,
            };
            derive_record(&cells, &plan, settings)
        })
        .collect::<Vec<_>>();
    info!(
        "Derived CNQ for {} record(s) with rework factor {}",
        records.len(),
        settings.rework_factor
    );
    records
}

/// The ratio basis [`derive_costs`] would pick for this dataset.
pub fn percentage_basis(table: &RawTable, resolution: &FieldResolution) -> PercentageBasis {
    PercentageBasis::select(table, resolution)
}

struct RowCells<'a> {
    table: &'a RawTable,
    resolution: &'a FieldResolution,
    row: usize,
}

impl RowCells<'_> {
    fn raw(&self, field: SemanticField) -> Option<&str> {
        self.resolution
            .index(field)
            .map(|index| self.table.cell(self.row, index))
    }

    fn number(&self, field: SemanticField) -> f64 {
        self.raw(field).and_then(parse_number).unwrap_or(0.0)
    }

    fn text(&self, field: SemanticField) -> String {
        self.raw(field)
            .map(categorical_value)
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

fn derive_record(cells: &RowCells<'_>, plan: &CostPlan, settings: &CostSettings) -> NormalizedRecord {
    let defect_count = cells.number(SemanticField::DefectCount);
    let quantity = cells.number(SemanticField::Quantity);
    let quantity_second_choice = cells.number(SemanticField::QuantitySecondChoice);
    let order_value = cells.number(SemanticField::OrderValue);

    let rework_unit_cost = match plan.rework {
        ReworkRule::TimeAndRate => {
            cells.number(SemanticField::ReworkUnitTime)
                * cells.number(SemanticField::HourlyRate)
                * settings.rework_factor
        }
        ReworkRule::FlatRate => settings.rework_unit_cost_fallback,
        ReworkRule::Absent => 0.0,
    };
    let rework_unit_cost = finite_or_zero(rework_unit_cost);
    let rework_cost = finite_or_zero(defect_count * rework_unit_cost);

    let scrap_unit_cost = match plan.scrap {
        ScrapRule::UnitPrice => cells.number(SemanticField::UnitPrice),
        ScrapRule::FlatRate => settings.scrap_unit_cost_fallback,
        ScrapRule::Absent => 0.0,
    };
    let scrap_cost = finite_or_zero(quantity_second_choice * scrap_unit_cost);

    let penalty_cost = finite_or_zero(match plan.penalty {
        PenaltyRule::Amount => cells.number(SemanticField::PenaltyAmount),
        PenaltyRule::Note => cells.number(SemanticField::DefectNote) * settings.penalty_per_note,
        PenaltyRule::Absent => 0.0,
    });

    let cnq = finite_or_zero(rework_cost + scrap_cost + penalty_cost);
    let denominator = match plan.basis {
        PercentageBasis::OrderValue => order_value,
        PercentageBasis::Quantity => quantity * settings.assumed_unit_price,
        PercentageBasis::None => 0.0,
    };
    let cnq_percentage = cnq_ratio(cnq, denominator, settings.percentage_cap);

    NormalizedRecord {
        row: cells.row + 1,
        date: cells.raw(SemanticField::Date).and_then(parse_naive_date),
        chain: cells.text(SemanticField::Chain),
        operation: cells.text(SemanticField::Operation),
        operation_label: cells.text(SemanticField::OperationLabel),
        controller: cells.text(SemanticField::Controller),
        category: cells.text(SemanticField::Category),
        defect_type: cells.text(SemanticField::DefectType),
        quantity,
        quantity_inspected: cells.number(SemanticField::QuantityInspected),
        quantity_launched: cells.number(SemanticField::QuantityLaunched),
        quantity_second_choice,
        defect_count,
        order_value,
        rework_unit_cost,
        rework_cost,
        scrap_unit_cost,
        scrap_cost,
        penalty_cost,
        cnq,
        cnq_percentage,
    }
}

/// `100 × cnq / denominator`, zero when the denominator is not positive,
/// capped at `cap`.
pub fn cnq_ratio(cnq: f64, denominator: f64, cap: f64) -> f64 {
    if denominator.is_nan() || denominator <= 0.0 {
        return 0.0;
    }
    finite_or_zero(100.0 * cnq / denominator).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;

    fn derive(table: &RawTable) -> Vec<NormalizedRecord> {
        let resolution = resolve(&table.headers);
        derive_costs(table, &resolution, &CostSettings::default())
    }

    #[test]
    fn rework_uses_time_rate_and_factor() {
        let table = RawTable::from_rows(
            &["NbrReclamations", "temps", "tauxhoraire"],
            &[&["2", "1.0", "20"], &["0", "1.0", "20"], &["5", "1.0", "20"]],
        );
        let records = derive(&table);
        let rework: Vec<f64> = records.iter().map(|r| r.rework_cost).collect();
        assert_eq!(rework, vec![120.0, 0.0, 300.0]);
        assert!(records.iter().all(|r| r.rework_unit_cost == 60.0));
        let cnq: Vec<f64> = records.iter().map(|r| r.cnq).collect();
        assert_eq!(cnq, vec![120.0, 0.0, 300.0]);
    }

    #[test]
    fn rework_falls_back_to_flat_rate_without_rate_column() {
        let table = RawTable::from_rows(&["NbrReclamations", "temps"], &[&["3", "2"]]);
        let record = &derive(&table)[0];
        assert_eq!(record.rework_unit_cost, 50.0);
        assert_eq!(record.rework_cost, 150.0);
    }

    #[test]
    fn rework_factor_scales_unit_cost() {
        let table = RawTable::from_rows(
            &["NbrReclamations", "Temps", "TauxHoraire"],
            &[&["1", "0.5", "10"]],
        );
        let resolution = resolve(&table.headers);
        let settings = CostSettings::default().with_rework_factor(5.0);
        let record = &derive_costs(&table, &resolution, &settings)[0];
        assert_eq!(record.rework_unit_cost, 25.0);
    }

    #[test]
    fn scrap_falls_back_to_flat_unit_cost() {
        let table = RawTable::from_rows(&["DeuxiemeChoix"], &[&["4"]]);
        let record = &derive(&table)[0];
        assert_eq!(record.scrap_unit_cost, 100.0);
        assert_eq!(record.scrap_cost, 400.0);
    }

    #[test]
    fn scrap_uses_unit_price_when_present() {
        let table = RawTable::from_rows(&["DeuxiemeChoix", "prix"], &[&["4", "12,5"], &["2", ""]]);
        let records = derive(&table);
        assert_eq!(records[0].scrap_cost, 50.0);
        assert_eq!(records[1].scrap_cost, 0.0);
    }

    #[test]
    fn penalty_amount_is_taken_verbatim() {
        let table = RawTable::from_rows(&["MontantPenalite", "Note"], &[&["37.5", "4"]]);
        let record = &derive(&table)[0];
        assert_eq!(record.penalty_cost, 37.5);
        assert_eq!(record.cnq, 37.5);
    }

    #[test]
    fn penalty_falls_back_to_note_points() {
        let table = RawTable::from_rows(&["Note"], &[&["2"], &["x"]]);
        let records = derive(&table);
        assert_eq!(records[0].penalty_cost, 150.0);
        assert_eq!(records[1].penalty_cost, 0.0);
    }

    #[test]
    fn zero_order_value_total_switches_to_quantity_basis() {
        let table = RawTable::from_rows(
            &["ValeurOF", "Quantite", "Note"],
            &[&["0", "10", "1"], &["0", "0", "1"]],
        );
        let resolution = resolve(&table.headers);
        assert_eq!(
            percentage_basis(&table, &resolution),
            PercentageBasis::Quantity
        );
        let records = derive_costs(&table, &resolution, &CostSettings::default());
        // 75 / (10 × 100) × 100
        assert_eq!(records[0].cnq_percentage, 7.5);
        assert_eq!(records[1].cnq_percentage, 0.0);
        assert!(records.iter().all(|r| r.cnq_percentage.is_finite()));
    }

    #[test]
    fn order_value_basis_zero_rows_yield_zero_ratio() {
        let table = RawTable::from_rows(
            &["ValeurOF", "MontantPenalite"],
            &[&["1000", "50"], &["0", "50"], &["10", "500"]],
        );
        let records = derive(&table);
        assert_eq!(records[0].cnq_percentage, 5.0);
        assert_eq!(records[1].cnq_percentage, 0.0);
        assert_eq!(records[2].cnq_percentage, 100.0);
    }

    #[test]
    fn all_missing_inputs_produce_zeroed_records() {
        let table = RawTable::from_rows(&["foo", "bar"], &[&["1", "2"], &["", ""]]);
        let records = derive(&table);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.rework_cost, 0.0);
            assert_eq!(record.scrap_cost, 0.0);
            assert_eq!(record.penalty_cost, 0.0);
            assert_eq!(record.cnq, 0.0);
            assert_eq!(record.cnq_percentage, 0.0);
            assert_eq!(record.chain, UNKNOWN);
            assert_eq!(record.controller, UNKNOWN);
            assert_eq!(record.date, None);
        }
        assert_eq!(records[1].row, 2);
    }

    #[test]
    fn dimensions_and_dates_are_copied() {
        let table = RawTable::from_rows(
            &["DATE", "IDchainemontage", "IDOperation", "Libelle", "IDcontroleur", "Categorie"],
            &[&["2023-02-14 00:00:00", "CH1", "OP7", "Couture", "", "PRODUCTION FIN CHAINE"]],
        );
        let record = &derive(&table)[0];
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2023, 2, 14));
        assert_eq!(record.chain, "CH1");
        assert_eq!(record.operation, "OP7");
        assert_eq!(record.operation_label, "Couture");
        assert_eq!(record.controller, UNKNOWN);
        assert_eq!(record.category, "PRODUCTION FIN CHAINE");
        assert_eq!(record.defect_type, UNKNOWN);
    }

    #[test]
    fn negative_inputs_pass_through() {
        let table = RawTable::from_rows(&["NbrReclamations"], &[&["-2"]]);
        let record = &derive(&table)[0];
        assert_eq!(record.rework_cost, -100.0);
        assert_eq!(record.cnq, -100.0);
    }

    #[test]
    fn cnq_ratio_guards_denominator_and_cap() {
        assert_eq!(cnq_ratio(10.0, 0.0, 100.0), 0.0);
        assert_eq!(cnq_ratio(10.0, -5.0, 100.0), 0.0);
        assert_eq!(cnq_ratio(10.0, f64::NAN, 100.0), 0.0);
        assert_eq!(cnq_ratio(10.0, 200.0, 100.0), 5.0);
        assert_eq!(cnq_ratio(500.0, 100.0, 100.0), 100.0);
    }

    #[test]
    fn empty_table_yields_no_records() {
        let table = RawTable::from_rows(&["NbrReclamations"], &[]);
        assert!(derive(&table).is_empty());
    }
}
