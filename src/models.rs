//
// models.rs
// HP-Stats-rs
//
// Data structures for discovered acquisitions, per-volume segment statistics, and the run summary.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric names every statistics engine must report.
pub const MEAN: &str = "mean";
pub const STDEV: &str = "stdev";
/// Derived metric added by the aggregator when a noise segment is configured.
pub const SNR: &str = "SNR";

/// A directory that directly holds scan files, decomposed by the folder convention
/// `<conditions parent>/<condition>/<metabolite>/<volume id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionLeaf {
    pub path: PathBuf,
    pub condition: String,
    pub metabolite: String,
    pub volume_id: String,
    pub conditions_parent: PathBuf,
}

/// One labeled region of the segmentation, in the segmentation's native order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub name: String,
}

/// Background region used as the SNR reference. Only names a segment, never owns statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseSegment {
    pub id: String,
    pub name: String,
}

/// `(segment id, metric name) -> value` table produced by a statistics engine.
///
/// Segment ids and metric names keep the order in which they were first inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTable {
    segment_ids: Vec<String>,
    metric_names: Vec<String>,
    values: HashMap<String, HashMap<String, f64>>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, segment_id: &str, metric: &str, value: f64) {
        if !self.values.contains_key(segment_id) {
            self.segment_ids.push(segment_id.to_string());
        }
        if !self.metric_names.iter().any(|m| m == metric) {
            self.metric_names.push(metric.to_string());
        }
        self.values
            .entry(segment_id.to_string())
            .or_default()
            .insert(metric.to_string(), value);
    }

    pub fn get(&self, segment_id: &str, metric: &str) -> Option<f64> {
        self.values.get(segment_id)?.get(metric).copied()
    }

    pub fn segment_ids(&self) -> &[String] {
        &self.segment_ids
    }

    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }
}

/// Statistics of every segment for one volume (one timepoint of a series).
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStatisticsSnapshot {
    /// Display name of the volume, taken from its file stem.
    pub volume_name: String,
    pub metrics: MetricTable,
}

impl SegmentStatisticsSnapshot {
    pub fn get(&self, segment_id: &str, metric: &str) -> Option<f64> {
        self.metrics.get(segment_id, metric)
    }
}

/// Timepoint-ordered snapshots of one metabolite series within a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStatistics {
    pub metabolite: String,
    pub snapshots: Vec<SegmentStatisticsSnapshot>,
}

impl SeriesStatistics {
    pub fn new(metabolite: impl Into<String>) -> Self {
        Self {
            metabolite: metabolite.into(),
            snapshots: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// All series of one condition, in first-seen metabolite order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionStatistics {
    pub condition: String,
    pub series: Vec<SeriesStatistics>,
}

impl ConditionStatistics {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            series: Vec::new(),
        }
    }

    pub fn series(&self, metabolite: &str) -> Option<&SeriesStatistics> {
        self.series.iter().find(|s| s.metabolite == metabolite)
    }

    /// Returns the series for `metabolite`, creating it at the end when absent.
    pub fn series_mut(&mut self, metabolite: &str) -> &mut SeriesStatistics {
        let index = match self.series.iter().position(|s| s.metabolite == metabolite) {
            Some(index) => index,
            None => {
                self.series.push(SeriesStatistics::new(metabolite));
                self.series.len() - 1
            }
        };
        &mut self.series[index]
    }
}

/// Accumulated statistics of a whole run, keyed by condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsTable {
    pub conditions: Vec<ConditionStatistics>,
}

impl StatisticsTable {
    pub fn condition(&self, name: &str) -> Option<&ConditionStatistics> {
        self.conditions.iter().find(|c| c.condition == name)
    }

    pub fn condition_mut(&mut self, name: &str) -> &mut ConditionStatistics {
        let index = match self.conditions.iter().position(|c| c.condition == name) {
            Some(index) => index,
            None => {
                self.conditions.push(ConditionStatistics::new(name));
                self.conditions.len() - 1
            }
        };
        &mut self.conditions[index]
    }
}

/// Converted volume files of one condition, grouped by metabolite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub condition: String,
    pub series: Vec<(String, Vec<PathBuf>)>,
}

impl ConditionGroup {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            series: Vec::new(),
        }
    }

    pub fn volumes_mut(&mut self, metabolite: &str) -> &mut Vec<PathBuf> {
        let index = match self.series.iter().position(|(m, _)| m == metabolite) {
            Some(index) => index,
            None => {
                self.series.push((metabolite.to_string(), Vec::new()));
                self.series.len() - 1
            }
        };
        &mut self.series[index].1
    }
}

/// Machine-readable record of a finished run, written next to the workbooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub root_path: PathBuf,
    pub snr_mode: bool,
    pub noise_segment: Option<NoiseSegment>,
    pub denominator_metabolite: Option<String>,
    pub conditions: Vec<ConditionSummary>,
    pub workbooks: Vec<PathBuf>,
    pub csv_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSummary {
    pub condition: String,
    pub series: Vec<SeriesSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub metabolite: String,
    pub timepoints: usize,
}

impl StatisticsTable {
    /// Condition and series names with their timepoint counts.
    pub fn summarize(&self) -> Vec<ConditionSummary> {
        self.conditions
            .iter()
            .map(|c| ConditionSummary {
                condition: c.condition.clone(),
                series: c
                    .series
                    .iter()
                    .map(|s| SeriesSummary {
                        metabolite: s.metabolite.clone(),
                        timepoints: s.len(),
                    })
                    .collect(),
            })
            .collect()
    }
}
