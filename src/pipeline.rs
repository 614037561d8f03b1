//! Loading a source file once and deriving fact tables from it.
//!
//! A [`Dataset`] keeps the raw table and its column resolution. Derivation is
//! cheap enough to redo from scratch whenever a cost setting changes, so no
//! derived state is cached here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{info, warn};

use crate::{
    config::CostSettings,
    cost::{NormalizedRecord, PercentageBasis, derive_costs},
    data::RawTable,
    fields::SemanticField,
    io_utils,
    resolver::{AliasTable, FieldResolution, resolve_with},
};

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Falls back to the file extension when unset.
    pub delimiter: Option<u8>,
    /// UTF-8 with a Latin-1 fallback when unset.
    pub encoding: Option<&'static Encoding>,
    pub aliases: AliasTable,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    source: Option<PathBuf>,
    table: RawTable,
    resolution: FieldResolution,
}

impl Dataset {
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
        let table = io_utils::load_table(path, delimiter, options.encoding)
            .with_context(|| format!("Loading quality export {path:?}"))?;
        let mut dataset = Self::from_table(table, &options.aliases);
        dataset.source = Some(path.to_path_buf());
        info!(
            "Loaded {} row(s) from {path:?}; {} of {} field(s) resolved",
            dataset.table.len(),
            dataset.resolution.resolved().count(),
            SemanticField::ALL.len()
        );
        Ok(dataset)
    }

    pub fn from_table(table: RawTable, aliases: &AliasTable) -> Self {
        let resolution = resolve_with(&table.headers, aliases);
        warn_on_missing_cost_inputs(&resolution);
        Self {
            source: None,
            table,
            resolution,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn table(&self) -> &RawTable {
        &self.table
    }

    pub fn resolution(&self) -> &FieldResolution {
        &self.resolution
    }

    pub fn percentage_basis(&self) -> PercentageBasis {
        PercentageBasis::select(&self.table, &self.resolution)
    }

    pub fn derive(&self, settings: &CostSettings) -> Vec<NormalizedRecord> {
        derive_costs(&self.table, &self.resolution, settings)
    }
}

fn warn_on_missing_cost_inputs(resolution: &FieldResolution) {
    let missing = [
        (
            vec![SemanticField::DefectCount],
            "No defect count column found; rework cost will be 0",
        ),
        (
            vec![SemanticField::QuantitySecondChoice],
            "No second-choice quantity column found; scrap cost will be 0",
        ),
        (
            vec![SemanticField::PenaltyAmount, SemanticField::DefectNote],
            "No penalty amount or note column found; penalty cost will be 0",
        ),
    ];
    for (fields, message) in missing {
        if fields.iter().all(|field| !resolution.is_resolved(*field)) {
            warn!("{message}");
        }
    }
}
