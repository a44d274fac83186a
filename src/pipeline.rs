//
// pipeline.rs
// HP-Stats-rs
//
// Runs one collection end to end: discovery, conversion, statistics, workbook export, run
// summary and scratch cleanup.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::converter::VolumeConverter;
use crate::discovery;
use crate::error::{PipelineError, Result};
use crate::export::{LayoutMode, WorkbookAssembler};
use crate::models::{AcquisitionLeaf, ConditionGroup, NoiseSegment, RunSummary};
use crate::segmentation::{resolve_noise_segment, StatisticsProvider};
use crate::stats::StatisticsAggregator;
use crate::storage::ScratchStore;

/// Wires the gateways to one configuration. Nothing is shared between runs.
pub struct Pipeline<'a, C, P> {
    config: &'a PipelineConfig,
    converter: &'a C,
    provider: &'a P,
}

impl<'a, C: VolumeConverter, P: StatisticsProvider> Pipeline<'a, C, P> {
    pub fn new(config: &'a PipelineConfig, converter: &'a C, provider: &'a P) -> Self {
        Self {
            config,
            converter,
            provider,
        }
    }

    /// Any error stops the run and leaves the scratch directory in place for inspection.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let config = self.config;
        config.validate()?;

        let leaves = discovery::discover(&config.root_path, &config.excluded_folder_names)?;
        if leaves.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "no folders with .dcm or .ima files found under {}",
                config.root_path.display()
            )));
        }
        info!("found {} scan folder(s)", leaves.len());

        let noise = self.noise_segment()?;
        if noise.is_some() {
            check_denominators(&leaves, &config.denominator_metabolite)?;
        }

        let mut store = ScratchStore::new(&config.scratch_dir, &config.volume_extension)?;
        let outputs = leaves
            .iter()
            .map(|leaf| store.claim(leaf))
            .collect::<Result<Vec<_>>>()?;
        let groups = self.convert_all(&leaves, outputs).await?;

        let mut aggregator = StatisticsAggregator::new(self.provider, noise.clone());
        for group in &groups {
            for (metabolite, volumes) in &group.series {
                for volume in volumes {
                    aggregator
                        .compute_for_volume(&group.condition, metabolite, volume)
                        .await?;
                }
            }
        }
        let table = aggregator.into_table();

        let mode = match &noise {
            Some(noise) => LayoutMode::Snr {
                noise: noise.clone(),
                denominator: config.denominator_metabolite.clone(),
            },
            None => LayoutMode::Raw,
        };
        let workbooks = WorkbookAssembler::new(self.provider.segments(), mode)
            .hide_auxiliary_sheets(config.hide_auxiliary_sheets)
            .assemble(&table)?;

        let mut saved = Vec::with_capacity(workbooks.len());
        let mut csv_files = Vec::new();
        for (condition, workbook) in &workbooks {
            let path = config.workbook_path(condition);
            workbook.save(&path)?;
            info!("saved workbook {:?}", path);
            saved.push(path);

            if config.emit_csv {
                let written = workbook.write_csv(&config.csv_dir(), condition)?;
                debug!("wrote {} CSV file(s) for {}", written.len(), condition);
                csv_files.extend(written);
            }
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            root_path: config.root_path.clone(),
            snr_mode: noise.is_some(),
            denominator_metabolite: noise
                .as_ref()
                .map(|_| config.denominator_metabolite.clone()),
            noise_segment: noise,
            conditions: table.summarize(),
            workbooks: saved,
            csv_files,
        };
        write_summary(&config.summary_path(), &summary)?;

        if config.retain_intermediate_files {
            info!("kept intermediate volumes in {:?}", store.root());
        } else {
            store.remove()?;
        }
        Ok(summary)
    }

    fn noise_segment(&self) -> Result<Option<NoiseSegment>> {
        let name = match self.config.noise_segment_name.as_deref() {
            Some(name) if self.config.snr_enabled() => name,
            _ => return Ok(None),
        };
        let noise = resolve_noise_segment(self.provider.segments(), name)?;
        info!("SNR mode: noise segment '{}' ({})", noise.name, noise.id);
        Ok(Some(noise))
    }

    /// Converts every leaf into its claimed output in discovery order and groups the volumes
    /// by condition and metabolite. Timepoint order within a series follows that order.
    async fn convert_all(
        &self,
        leaves: &[AcquisitionLeaf],
        outputs: Vec<PathBuf>,
    ) -> Result<Vec<ConditionGroup>> {
        let mut groups: Vec<ConditionGroup> = Vec::new();
        for (leaf, output) in leaves.iter().zip(outputs) {
            let report = self.converter.convert(&leaf.path, &output).await;
            if !report.success {
                return Err(PipelineError::Conversion {
                    leaf: leaf.path.clone(),
                    reason: report
                        .message
                        .unwrap_or_else(|| "converter reported failure".into()),
                });
            }
            info!("converted scans in {:?} ({:.1?})", leaf.path, report.elapsed);

            let index = match groups.iter().position(|g| g.condition == leaf.condition) {
                Some(index) => index,
                None => {
                    groups.push(ConditionGroup::new(&leaf.condition));
                    groups.len() - 1
                }
            };
            groups[index].volumes_mut(&leaf.metabolite).push(output);
        }
        Ok(groups)
    }
}

/// Every condition needs a denominator series before SNR ratios can be built.
pub fn check_denominators(leaves: &[AcquisitionLeaf], denominator: &str) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    for leaf in leaves {
        if seen.contains(&leaf.condition.as_str()) {
            continue;
        }
        seen.push(&leaf.condition);
        if !discovery::metabolites_of(leaves, &leaf.condition).contains(denominator) {
            return Err(PipelineError::MissingDenominator {
                condition: leaf.condition.clone(),
                denominator: denominator.to_string(),
            });
        }
    }
    Ok(())
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::output(parent, e))?;
    }
    let json = serde_json::to_string_pretty(summary).map_err(io::Error::from);
    json.and_then(|json| fs::write(path, json))
        .map_err(|e| PipelineError::output(path, e))?;
    debug!("wrote run summary {:?}", path);
    Ok(())
}
