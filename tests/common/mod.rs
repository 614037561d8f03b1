#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// A small inspection export in the semicolon-separated layout the plants use.
pub const INSPECTION_EXPORT: &str = "\
DATE;IDChaineMontage;IDOperation;IDControleur;Categorie;TypeDefaut;Quantite;NbrReclamations;temps;TauxHoraire;DeuxiemeChoix;Note
2023-01-10;CH1;OP1;C01;Pantalon;Couture;10;2;1;20;0;0
2023-01-20;CH2;OP2;C02;Veste;Tache;20;0;1;20;1;2
2023-02-05;CH1;OP1;C01;Pantalon;Couture;5;5;1;20;0;0
;CH3;OP3;C03;;;0;1;1;20;0;0
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}
