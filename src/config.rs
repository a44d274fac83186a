//
// config.rs
// HP-Stats-rs
//
// Run configuration consumed by the pipeline and built by the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_DENOMINATOR: &str = "01_pyrBy6";
pub const DEFAULT_OUTPUT_ROOT: &str = "StatsCollector/SegmentStatistics";
pub const DEFAULT_SCRATCH_DIR: &str = "StatsCollector/NrrdOutput";
pub const DEFAULT_VOLUME_EXTENSION: &str = "nrrd";
pub const CSV_DIR_NAME: &str = "CSV";
pub const SUMMARY_FILE_NAME: &str = "summary.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub root_path: PathBuf,
    pub excluded_folder_names: BTreeSet<String>,
    pub segmentation_path: PathBuf,
    /// Enables SNR mode when set.
    pub noise_segment_name: Option<String>,
    pub denominator_metabolite: String,
    pub output_root: PathBuf,
    pub output_folder_name: String,
    pub scratch_dir: PathBuf,
    pub volume_extension: String,
    pub retain_intermediate_files: bool,
    pub hide_auxiliary_sheets: bool,
    pub emit_csv: bool,
}

impl PipelineConfig {
    pub fn new(
        root_path: impl Into<PathBuf>,
        segmentation_path: impl Into<PathBuf>,
        output_folder_name: impl Into<String>,
    ) -> Self {
        Self {
            root_path: root_path.into(),
            excluded_folder_names: BTreeSet::new(),
            segmentation_path: segmentation_path.into(),
            noise_segment_name: None,
            denominator_metabolite: DEFAULT_DENOMINATOR.to_string(),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            output_folder_name: output_folder_name.into(),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            volume_extension: DEFAULT_VOLUME_EXTENSION.to_string(),
            retain_intermediate_files: false,
            hide_auxiliary_sheets: false,
            emit_csv: false,
        }
    }

    /// An empty denominator keeps the default series name.
    pub fn with_denominator(mut self, denominator: Option<String>) -> Self {
        if let Some(name) = denominator.filter(|d| !d.trim().is_empty()) {
            self.denominator_metabolite = name;
        }
        self
    }

    pub fn snr_enabled(&self) -> bool {
        self.noise_segment_name
            .as_deref()
            .map_or(false, |name| !name.is_empty())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(&self.output_folder_name)
    }

    pub fn workbook_path(&self, condition: &str) -> PathBuf {
        self.output_dir().join(format!("{}.xlsx", condition))
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.output_dir().join(CSV_DIR_NAME)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir().join(SUMMARY_FILE_NAME)
    }

    /// Checks the inputs that can be verified before any work is done.
    pub fn validate(&self) -> Result<()> {
        require_dir(&self.root_path, "scan root")?;
        if !self.segmentation_path.is_file() {
            return Err(PipelineError::Configuration(format!(
                "segmentation file not found: {}",
                self.segmentation_path.display()
            )));
        }
        if self.output_folder_name.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "output folder name must not be empty".into(),
            ));
        }
        if self.volume_extension.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "volume extension must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!(
            "{} directory not found: {}",
            what,
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_denominator_falls_back_to_default() {
        let config =
            PipelineConfig::new("root", "seg.nrrd", "run").with_denominator(Some("".into()));
        assert_eq!(config.denominator_metabolite, DEFAULT_DENOMINATOR);

        let config = PipelineConfig::new("root", "seg.nrrd", "run")
            .with_denominator(Some("02_lacBy6".into()));
        assert_eq!(config.denominator_metabolite, "02_lacBy6");
    }

    #[test]
    fn output_layout_follows_folder_save_name() {
        let mut config = PipelineConfig::new("root", "seg.nrrd", "Subj101");
        config.output_root = PathBuf::from("/out");

        assert_eq!(config.workbook_path("Cond100"), PathBuf::from("/out/Subj101/Cond100.xlsx"));
        assert_eq!(config.csv_dir(), PathBuf::from("/out/Subj101/CSV"));
    }

    #[test]
    fn snr_mode_requires_a_named_segment() {
        let mut config = PipelineConfig::new("root", "seg.nrrd", "run");
        assert!(!config.snr_enabled());
        config.noise_segment_name = Some(String::new());
        assert!(!config.snr_enabled());
        config.noise_segment_name = Some("BG".into());
        assert!(config.snr_enabled());
    }

    #[test]
    fn validate_rejects_missing_paths() {
        let dir = tempdir().expect("tempdir");
        let seg = dir.path().join("seg.nrrd");

        let config = PipelineConfig::new(dir.path().join("absent"), &seg, "run");
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));

        let config = PipelineConfig::new(dir.path(), &seg, "run");
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));

        std::fs::write(&seg, b"seg").expect("write seg");
        assert!(config.validate().is_ok());

        let config = PipelineConfig::new(dir.path(), &seg, "  ");
        assert!(config.validate().is_err());
    }
}
