//! Schema resolution against unstable column names.
//!
//! Inspection exports have been renamed, re-cased and translated across
//! revisions, so every [`SemanticField`] carries an ordered alias list. The
//! resolver picks the first alias present in the headers, first by exact
//! comparison and then ignoring case. A field with no matching alias is simply
//! unresolved; the cost engine turns that into its documented fallback.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::fields::SemanticField;

/// Column names observed for each field, highest priority first.
fn builtin_aliases(field: SemanticField) -> &'static [&'static str] {
    match field {
        SemanticField::Chain => &[
            "IDChaineMontage",
            "IDchainemontage",
            "idchainemontage",
            "IDChaineMontage1",
            "IDChaineMontage2",
            "Chaine",
            "Chaîne",
        ],
        SemanticField::Operation => &[
            "IDOperation",
            "IDoperation",
            "idoperation",
            "IDOperation1",
            "Operation",
            "operation",
        ],
        SemanticField::OperationLabel => &["Libelle", "libelle", "Libellé", "OperationName"],
        SemanticField::Controller => &[
            "IDControleur",
            "IDcontroleur",
            "idcontroleur",
            "Controleur",
            "Contrôleur (se)",
            "Contrôleur",
        ],
        SemanticField::Date => &["DATE", "date", "Date"],
        SemanticField::Quantity => &["Quantite", "Qtte", "quantite", "qtte", "Qtte OF"],
        SemanticField::QuantityInspected => {
            &["QtteSondee", "qttesondee", "QteSondee", "qte_sondee"]
        }
        SemanticField::QuantityLaunched => &["QtteLct", "qttelct", "QteLancee", "qte_lancee"],
        SemanticField::QuantitySecondChoice => {
            &["DeuxiemeChoix", "deuxiemechoix", "Deuxieme_Choix", "QtteCoupee"]
        }
        SemanticField::ReworkUnitTime => {
            &["temps", "Temps", "TEMPS", "TempsRetouche", "tempsretouche"]
        }
        SemanticField::HourlyRate => &["tauxhoraire", "TauxHoraire", "TauxHorraire", "tauxhorraire"],
        SemanticField::UnitPrice => &["prix", "Prix", "PrixUnitaire", "prix_unitaire"],
        SemanticField::DefectCount => &["NbrReclamations", "nbrreclamations", "NbReclamations"],
        SemanticField::DefectType => &["TypeDefaut", "typedefaut", "Type_Defaut", "type_defaut"],
        SemanticField::DefectNote => &["Note", "note"],
        SemanticField::PenaltyAmount => &["MontantPenalite", "montantpenalite", "Penalite"],
        SemanticField::Category => &["Categorie", "categorie", "CATEGORIE", "Category", "category"],
        SemanticField::OrderValue => &["ValeurOF", "valeurof", "Valeur_OF"],
    }
}

/// Per-field alias lists: the built-in names plus any configured extras.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: BTreeMap<SemanticField, Vec<String>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        let aliases = SemanticField::ALL
            .iter()
            .map(|field| {
                let names = builtin_aliases(*field)
                    .iter()
                    .map(|name| name.to_string())
                    .collect();
                (*field, names)
            })
            .collect();
        Self { aliases }
    }
}

impl AliasTable {
    /// Appends `extra` aliases after the built-in ones for each field.
    pub fn with_extra(extra: &BTreeMap<SemanticField, Vec<String>>) -> Self {
        let mut table = AliasTable::default();
        for (field, names) in extra {
            let entry = table.aliases.entry(*field).or_default();
            for name in names {
                let name = name.trim();
                if !name.is_empty() && !entry.iter().any(|existing| existing == name) {
                    entry.push(name.to_string());
                }
            }
        }
        table
    }

    pub fn aliases(&self, field: SemanticField) -> &[String] {
        self.aliases
            .get(&field)
            .map(|names| names.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub name: String,
    pub index: usize,
}

/// Which column, if any, backs each semantic field for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldResolution {
    columns: BTreeMap<SemanticField, ResolvedColumn>,
}

impl FieldResolution {
    pub fn get(&self, field: SemanticField) -> Option<&ResolvedColumn> {
        self.columns.get(&field)
    }

    pub fn index(&self, field: SemanticField) -> Option<usize> {
        self.get(field).map(|column| column.index)
    }

    pub fn is_resolved(&self, field: SemanticField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn resolved(&self) -> impl Iterator<Item = (SemanticField, &ResolvedColumn)> {
        self.columns.iter().map(|(field, column)| (*field, column))
    }

    pub fn unresolved(&self) -> Vec<SemanticField> {
        SemanticField::ALL
            .iter()
            .copied()
            .filter(|field| !self.is_resolved(*field))
            .collect()
    }
}

pub fn resolve(columns: &[String]) -> FieldResolution {
    resolve_with(columns, &AliasTable::default())
}

pub fn resolve_with(columns: &[String], aliases: &AliasTable) -> FieldResolution {
    let mut resolution = FieldResolution::default();
    for field in SemanticField::ALL {
        if let Some(column) = find_column(columns, aliases.aliases(field)) {
            debug!(
                "Resolved {field} to column '{}' (position {})",
                column.name,
                column.index + 1
            );
            resolution.columns.insert(field, column);
        } else {
            debug!("No column found for {field}");
        }
    }
    resolution
}

fn find_column(columns: &[String], aliases: &[String]) -> Option<ResolvedColumn> {
    let exact = aliases.iter().find_map(|alias| {
        columns
            .iter()
            .position(|column| column.trim() == alias)
    });
    let index = exact.or_else(|| {
        aliases.iter().find_map(|alias| {
            let lowered = alias.to_lowercase();
            columns
                .iter()
                .position(|column| column.trim().to_lowercase() == lowered)
        })
    })?;
    Some(ResolvedColumn {
        name: columns[index].clone(),
        index,
    })
}
