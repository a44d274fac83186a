//
// stats.rs
// HP-Stats-rs
//
// Collects per-volume segment statistics into condition / metabolite series and derives SNR
// against the background segment.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{
    MetricTable, NoiseSegment, SegmentStatisticsSnapshot, StatisticsTable, MEAN, SNR, STDEV,
};
use crate::segmentation::StatisticsProvider;

/// Owns the statistics of one run. Snapshots are appended in timepoint order and never
/// touched again.
pub struct StatisticsAggregator<'a, P: StatisticsProvider> {
    provider: &'a P,
    noise: Option<NoiseSegment>,
    table: StatisticsTable,
}

impl<'a, P: StatisticsProvider> StatisticsAggregator<'a, P> {
    pub fn new(provider: &'a P, noise: Option<NoiseSegment>) -> Self {
        Self {
            provider,
            noise,
            table: StatisticsTable::default(),
        }
    }

    /// Measures `volume` and appends the snapshot as the next timepoint of
    /// `(condition, metabolite)`.
    pub async fn compute_for_volume(
        &mut self,
        condition: &str,
        metabolite: &str,
        volume: &Path,
    ) -> Result<&SegmentStatisticsSnapshot> {
        let failure = |reason: String| PipelineError::Statistics {
            volume: volume.to_path_buf(),
            reason,
        };

        let mut metrics = self.provider.compute(volume).await?;
        for segment in self.provider.segments() {
            if !metrics.segment_ids().contains(&segment.id) {
                return Err(failure(format!(
                    "segment '{}' ({}) is missing from the statistics",
                    segment.name, segment.id
                )));
            }
        }
        if let Some(noise) = &self.noise {
            add_snr(&mut metrics, noise).map_err(failure)?;
        }

        let snapshot = SegmentStatisticsSnapshot {
            volume_name: volume_name(volume),
            metrics,
        };
        let series = self.table.condition_mut(condition).series_mut(metabolite);
        series.snapshots.push(snapshot);
        debug!(
            "{} / {} timepoint {}: statistics from {:?}",
            condition,
            metabolite,
            series.snapshots.len(),
            volume
        );

        let last = series.snapshots.len() - 1;
        Ok(&series.snapshots[last])
    }

    pub fn table(&self) -> &StatisticsTable {
        &self.table
    }

    pub fn into_table(self) -> StatisticsTable {
        self.table
    }
}

/// Adds `SNR = mean(segment) / stdev(noise)` to every segment except the noise segment.
///
/// A zero noise stdev yields a non-finite SNR, which is kept as is.
pub fn add_snr(metrics: &mut MetricTable, noise: &NoiseSegment) -> std::result::Result<(), String> {
    let noise_stdev = metrics
        .get(&noise.id, STDEV)
        .ok_or_else(|| format!("noise segment '{}' has no {} value", noise.name, STDEV))?;

    let targets: Vec<String> = metrics
        .segment_ids()
        .iter()
        .filter(|id| **id != noise.id)
        .cloned()
        .collect();
    for segment_id in targets {
        let mean = metrics
            .get(&segment_id, MEAN)
            .ok_or_else(|| format!("segment '{}' has no {} value", segment_id, MEAN))?;
        metrics.insert(&segment_id, SNR, mean / noise_stdev);
    }
    Ok(())
}

fn volume_name(volume: &Path) -> String {
    volume
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| volume.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Segment;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct TableProvider {
        segments: Vec<Segment>,
        tables: HashMap<PathBuf, MetricTable>,
    }

    impl StatisticsProvider for TableProvider {
        fn segments(&self) -> &[Segment] {
            &self.segments
        }

        async fn compute(&self, volume: &Path) -> Result<MetricTable> {
            self.tables
                .get(volume)
                .cloned()
                .ok_or_else(|| PipelineError::Statistics {
                    volume: volume.to_path_buf(),
                    reason: "geometry mismatch".into(),
                })
        }
    }

    fn segment(id: &str, name: &str) -> Segment {
        Segment {
            id: id.into(),
            name: name.into(),
        }
    }

    fn metrics(rows: &[(&str, f64, f64)]) -> MetricTable {
        let mut table = MetricTable::new();
        for (id, mean, stdev) in rows {
            table.insert(id, MEAN, *mean);
            table.insert(id, STDEV, *stdev);
        }
        table
    }

    fn provider() -> TableProvider {
        let mut tables = HashMap::new();
        tables.insert(
            PathBuf::from("/scratch/Cond100-MetaA_T1.nrrd"),
            metrics(&[("s1", 12.0, 3.0), ("s2", 6.0, 1.0), ("bg", 0.5, 2.0)]),
        );
        tables.insert(
            PathBuf::from("/scratch/Cond100-MetaA_T2.nrrd"),
            metrics(&[("s1", 9.0, 3.0), ("s2", 3.0, 1.0), ("bg", 0.5, 0.0)]),
        );
        TableProvider {
            segments: vec![segment("s1", "Tumor"), segment("s2", "Kidney"), segment("bg", "BG")],
            tables,
        }
    }

    fn noise() -> NoiseSegment {
        NoiseSegment {
            id: "bg".into(),
            name: "BG".into(),
        }
    }

    #[tokio::test]
    async fn snr_is_mean_over_noise_stdev() {
        let provider = provider();
        let mut aggregator = StatisticsAggregator::new(&provider, Some(noise()));

        let snapshot = aggregator
            .compute_for_volume("Cond100", "MetaA", Path::new("/scratch/Cond100-MetaA_T1.nrrd"))
            .await
            .expect("snapshot");
        assert_eq!(snapshot.volume_name, "Cond100-MetaA_T1");
        assert_eq!(snapshot.get("s1", SNR), Some(12.0 / 2.0));
        assert_eq!(snapshot.get("s2", SNR), Some(6.0 / 2.0));
        assert_eq!(snapshot.get("bg", SNR), None);
    }

    #[tokio::test]
    async fn zero_noise_stdev_passes_infinity_through() {
        let provider = provider();
        let mut aggregator = StatisticsAggregator::new(&provider, Some(noise()));

        let snapshot = aggregator
            .compute_for_volume("Cond100", "MetaA", Path::new("/scratch/Cond100-MetaA_T2.nrrd"))
            .await
            .expect("snapshot");
        let snr = snapshot.get("s1", SNR).expect("snr");
        assert!(snr.is_infinite() && snr.is_sign_positive());
    }

    #[tokio::test]
    async fn raw_mode_adds_no_snr() {
        let provider = provider();
        let mut aggregator = StatisticsAggregator::new(&provider, None);

        let snapshot = aggregator
            .compute_for_volume("Cond100", "MetaA", Path::new("/scratch/Cond100-MetaA_T1.nrrd"))
            .await
            .expect("snapshot");
        assert!(!snapshot.metrics.metric_names().iter().any(|m| m == SNR));
    }

    #[tokio::test]
    async fn snapshots_accumulate_in_timepoint_order() {
        let provider = provider();
        let mut aggregator = StatisticsAggregator::new(&provider, Some(noise()));
        for volume in ["Cond100-MetaA_T1.nrrd", "Cond100-MetaA_T2.nrrd"] {
            aggregator
                .compute_for_volume("Cond100", "MetaA", &Path::new("/scratch").join(volume))
                .await
                .expect("snapshot");
        }

        let table = aggregator.into_table();
        let series = table
            .condition("Cond100")
            .and_then(|c| c.series("MetaA"))
            .expect("series");
        assert_eq!(series.len(), 2);
        assert_eq!(series.snapshots[0].get("s1", MEAN), Some(12.0));
        assert_eq!(series.snapshots[1].get("s1", MEAN), Some(9.0));
    }

    #[tokio::test]
    async fn engine_failure_names_the_volume() {
        let provider = provider();
        let mut aggregator = StatisticsAggregator::new(&provider, None);

        let err = aggregator
            .compute_for_volume("Cond100", "MetaA", Path::new("/scratch/unknown.nrrd"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/scratch/unknown.nrrd"));
        assert!(aggregator.table().conditions.is_empty());
    }

    #[tokio::test]
    async fn missing_segment_is_a_statistics_failure() {
        let mut provider = provider();
        provider.segments.push(segment("s9", "Liver"));
        let mut aggregator = StatisticsAggregator::new(&provider, None);

        let err = aggregator
            .compute_for_volume("Cond100", "MetaA", Path::new("/scratch/Cond100-MetaA_T1.nrrd"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Statistics { .. }));
    }

    #[test]
    fn noise_segment_without_stdev_is_rejected() {
        let mut table = MetricTable::new();
        table.insert("s1", MEAN, 1.0);
        table.insert("bg", MEAN, 1.0);
        assert!(add_snr(&mut table, &noise()).is_err());
    }
}
