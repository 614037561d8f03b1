//! Field vocabulary shared by every stage of the engine.
//!
//! [`SemanticField`] names what a source column *means*, independent of how a
//! given CSV revision spells it. [`MetricField`] names the numeric columns of a
//! normalized record, and [`GroupField`] is anything the aggregation engine can
//! partition on. All three parse leniently from user text: `QuantityInspected`,
//! `quantity_inspected` and `quantity-inspected` are the same field.

use std::{fmt, str::FromStr};

use heck::ToKebabCase;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SemanticField {
    Chain,
    Operation,
    OperationLabel,
    Controller,
    Date,
    Quantity,
    QuantityInspected,
    QuantityLaunched,
    QuantitySecondChoice,
    ReworkUnitTime,
    HourlyRate,
    UnitPrice,
    DefectCount,
    DefectType,
    DefectNote,
    PenaltyAmount,
    Category,
    OrderValue,
}

impl SemanticField {
    pub const ALL: [SemanticField; 18] = [
        SemanticField::Chain,
        SemanticField::Operation,
        SemanticField::OperationLabel,
        SemanticField::Controller,
        SemanticField::Date,
        SemanticField::Quantity,
        SemanticField::QuantityInspected,
        SemanticField::QuantityLaunched,
        SemanticField::QuantitySecondChoice,
        SemanticField::ReworkUnitTime,
        SemanticField::HourlyRate,
        SemanticField::UnitPrice,
        SemanticField::DefectCount,
        SemanticField::DefectType,
        SemanticField::DefectNote,
        SemanticField::PenaltyAmount,
        SemanticField::Category,
        SemanticField::OrderValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticField::Chain => "chain",
            SemanticField::Operation => "operation",
            SemanticField::OperationLabel => "operation-label",
            SemanticField::Controller => "controller",
            SemanticField::Date => "date",
            SemanticField::Quantity => "quantity",
            SemanticField::QuantityInspected => "quantity-inspected",
            SemanticField::QuantityLaunched => "quantity-launched",
            SemanticField::QuantitySecondChoice => "quantity-second-choice",
            SemanticField::ReworkUnitTime => "rework-unit-time",
            SemanticField::HourlyRate => "hourly-rate",
            SemanticField::UnitPrice => "unit-price",
            SemanticField::DefectCount => "defect-count",
            SemanticField::DefectType => "defect-type",
            SemanticField::DefectNote => "defect-note",
            SemanticField::PenaltyAmount => "penalty-amount",
            SemanticField::Category => "category",
            SemanticField::OrderValue => "order-value",
        }
    }

    /// Fields carried into a normalized record as strings.
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            SemanticField::Chain
                | SemanticField::Operation
                | SemanticField::OperationLabel
                | SemanticField::Controller
                | SemanticField::Category
                | SemanticField::DefectType
        )
    }

    /// The normalized-record metric that carries this field, if any.
    pub fn as_metric(&self) -> Option<MetricField> {
        match self {
            SemanticField::Quantity => Some(MetricField::Quantity),
            SemanticField::QuantityInspected => Some(MetricField::QuantityInspected),
            SemanticField::QuantityLaunched => Some(MetricField::QuantityLaunched),
            SemanticField::QuantitySecondChoice => Some(MetricField::QuantitySecondChoice),
            SemanticField::DefectCount => Some(MetricField::DefectCount),
            SemanticField::OrderValue => Some(MetricField::OrderValue),
            _ => None,
        }
    }
}

impl fmt::Display for SemanticField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticField {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = field_key(value);
        let french = match key.as_str() {
            "chaine" | "chaîne" => Some(SemanticField::Chain),
            "libelle" | "libellé" => Some(SemanticField::OperationLabel),
            "controleur" | "contrôleur" => Some(SemanticField::Controller),
            "categorie" | "catégorie" => Some(SemanticField::Category),
            "quantite" | "quantité" => Some(SemanticField::Quantity),
            "note" => Some(SemanticField::DefectNote),
            _ => None,
        };
        if let Some(field) = french {
            return Ok(field);
        }
        SemanticField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == key)
            .ok_or_else(|| EngineError::UnknownField(value.trim().to_string()))
    }
}

impl TryFrom<String> for SemanticField {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SemanticField> for String {
    fn from(field: SemanticField) -> Self {
        field.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricField {
    Quantity,
    QuantityInspected,
    QuantityLaunched,
    QuantitySecondChoice,
    DefectCount,
    OrderValue,
    ReworkUnitCost,
    ReworkCost,
    ScrapUnitCost,
    ScrapCost,
    PenaltyCost,
    Cnq,
    CnqPercentage,
}

impl MetricField {
    pub const ALL: [MetricField; 13] = [
        MetricField::Quantity,
        MetricField::QuantityInspected,
        MetricField::QuantityLaunched,
        MetricField::QuantitySecondChoice,
        MetricField::DefectCount,
        MetricField::OrderValue,
        MetricField::ReworkUnitCost,
        MetricField::ReworkCost,
        MetricField::ScrapUnitCost,
        MetricField::ScrapCost,
        MetricField::PenaltyCost,
        MetricField::Cnq,
        MetricField::CnqPercentage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::Quantity => "quantity",
            MetricField::QuantityInspected => "quantity-inspected",
            MetricField::QuantityLaunched => "quantity-launched",
            MetricField::QuantitySecondChoice => "quantity-second-choice",
            MetricField::DefectCount => "defect-count",
            MetricField::OrderValue => "order-value",
            MetricField::ReworkUnitCost => "rework-unit-cost",
            MetricField::ReworkCost => "rework-cost",
            MetricField::ScrapUnitCost => "scrap-unit-cost",
            MetricField::ScrapCost => "scrap-cost",
            MetricField::PenaltyCost => "penalty-cost",
            MetricField::Cnq => "cnq",
            MetricField::CnqPercentage => "cnq-percentage",
        }
    }

    /// Column label used in tables and CSV exports.
    pub fn column_label(&self) -> String {
        self.as_str().replace('-', "_")
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricField {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = field_key(value);
        let french = match key.as_str() {
            "retouche" => Some(MetricField::ReworkCost),
            "rebut" => Some(MetricField::ScrapCost),
            "penalite" | "pénalité" => Some(MetricField::PenaltyCost),
            "cout-retouche-unitaire" => Some(MetricField::ReworkUnitCost),
            "cout-rebut-unitaire" => Some(MetricField::ScrapUnitCost),
            "cnq-pct" | "pct-cnq" => Some(MetricField::CnqPercentage),
            "quantite" | "quantité" => Some(MetricField::Quantity),
            _ => None,
        };
        if let Some(metric) = french {
            return Ok(metric);
        }
        MetricField::ALL
            .iter()
            .copied()
            .find(|metric| metric.as_str() == key)
            .ok_or_else(|| EngineError::UnknownField(value.trim().to_string()))
    }
}

impl TryFrom<String> for MetricField {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricField> for String {
    fn from(metric: MetricField) -> Self {
        metric.as_str().to_string()
    }
}

/// A partition key for the aggregation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupField {
    /// A categorical dimension or the record date.
    Dimension(SemanticField),
    Year,
    Month,
    Quarter,
    /// ISO week as `YYYY-Www`; the year is the ISO week-numbering year.
    Week,
    /// `YYYY-MM` bucket of the record date.
    Period,
    Metric(MetricField),
}

impl GroupField {
    pub fn label(&self) -> String {
        match self {
            GroupField::Dimension(field) => field.as_str().replace('-', "_"),
            GroupField::Year => "year".to_string(),
            GroupField::Month => "month".to_string(),
            GroupField::Quarter => "quarter".to_string(),
            GroupField::Week => "week".to_string(),
            GroupField::Period => "period".to_string(),
            GroupField::Metric(metric) => metric.column_label(),
        }
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl TryFrom<SemanticField> for GroupField {
    type Error = EngineError;

    fn try_from(field: SemanticField) -> Result<Self, Self::Error> {
        if field.is_categorical() || field == SemanticField::Date {
            return Ok(GroupField::Dimension(field));
        }
        field
            .as_metric()
            .map(GroupField::Metric)
            .ok_or_else(|| EngineError::UnknownField(field.to_string()))
    }
}

impl From<MetricField> for GroupField {
    fn from(metric: MetricField) -> Self {
        GroupField::Metric(metric)
    }
}

impl FromStr for GroupField {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match field_key(value).as_str() {
            "year" | "annee" | "année" => return Ok(GroupField::Year),
            "month" | "mois" => return Ok(GroupField::Month),
            "quarter" | "trimestre" => return Ok(GroupField::Quarter),
            "week" | "semaine" => return Ok(GroupField::Week),
            "period" | "year-month" => return Ok(GroupField::Period),
            _ => {}
        }
        if let Ok(field) = value.parse::<SemanticField>() {
            return GroupField::try_from(field);
        }
        value
            .parse::<MetricField>()
            .map(GroupField::Metric)
            .map_err(|_| EngineError::UnknownField(value.trim().to_string()))
    }
}

fn field_key(value: &str) -> String {
    value.trim().to_kebab_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_field_parses_any_casing() {
        assert_eq!(
            "QuantityInspected".parse::<SemanticField>().unwrap(),
            SemanticField::QuantityInspected
        );
        assert_eq!(
            "quantity_inspected".parse::<SemanticField>().unwrap(),
            SemanticField::QuantityInspected
        );
        assert_eq!(
            " Chaine ".parse::<SemanticField>().unwrap(),
            SemanticField::Chain
        );
        assert!(matches!(
            "colour".parse::<SemanticField>(),
            Err(EngineError::UnknownField(name)) if name == "colour"
        ));
    }

    #[test]
    fn metric_field_accepts_dashboard_names() {
        assert_eq!("Retouche".parse::<MetricField>().unwrap(), MetricField::ReworkCost);
        assert_eq!("CNQ".parse::<MetricField>().unwrap(), MetricField::Cnq);
        assert_eq!(
            "CNQ_Percentage".parse::<MetricField>().unwrap(),
            MetricField::CnqPercentage
        );
    }

    #[test]
    fn group_field_rejects_non_groupable_inputs() {
        assert_eq!(
            "chain".parse::<GroupField>().unwrap(),
            GroupField::Dimension(SemanticField::Chain)
        );
        assert_eq!(
            "quantity".parse::<GroupField>().unwrap(),
            GroupField::Metric(MetricField::Quantity)
        );
        assert_eq!("mois".parse::<GroupField>().unwrap(), GroupField::Month);
        assert_eq!("Semaine".parse::<GroupField>().unwrap(), GroupField::Week);
        assert!("hourly-rate".parse::<GroupField>().is_err());
    }

    #[test]
    fn serde_round_trips_through_kebab_names() {
        let json = serde_json::to_string(&SemanticField::OrderValue).unwrap();
        assert_eq!(json, "\"order-value\"");
        let parsed: MetricField = serde_json::from_str("\"scrap_cost\"").unwrap();
        assert_eq!(parsed, MetricField::ScrapCost);
    }
}
