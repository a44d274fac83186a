//
// segmentation.rs
// HP-Stats-rs
//
// Boundary to the segment-statistics engine: the segment table of a segmentation and the
// per-segment metrics of a volume measured against it.
//
// Thales Matheus Mendonça Santos - November 2025

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{MetricTable, NoiseSegment, Segment, MEAN, STDEV};

/// Capability the aggregator needs from a volumetric statistics engine.
///
/// The provider is opened against one segmentation for the whole run; only the
/// `(segment id, metric) -> value` contract matters, not how volumes are represented.
#[allow(async_fn_in_trait)]
pub trait StatisticsProvider {
    /// Segments in the segmentation's native order.
    fn segments(&self) -> &[Segment];

    /// Per-segment metrics of `volume`, including at least `mean` and `stdev`.
    async fn compute(&self, volume: &Path) -> Result<MetricTable>;
}

/// Looks the noise segment up by name in the segment table.
pub fn resolve_noise_segment(segments: &[Segment], name: &str) -> Result<NoiseSegment> {
    segments
        .iter()
        .find(|s| s.name == name)
        .map(|s| NoiseSegment {
            id: s.id.clone(),
            name: s.name.clone(),
        })
        .ok_or_else(|| PipelineError::UnknownNoiseSegment {
            name: name.to_string(),
            available: segments.iter().map(|s| s.name.clone()).collect(),
        })
}

/// Drives an external engine executable:
///
/// * `<engine> segments --segmentation <seg>` prints `id,name` rows;
/// * `<engine> statistics --segmentation <seg> --volume <vol>` prints one row per segment,
///   segment id first, then one column per metric.
///
/// Every invocation is bounded by the optional timeout; a hung engine is killed.
#[derive(Debug, Clone)]
pub struct CommandStatisticsProvider {
    engine: PathBuf,
    launcher: Option<PathBuf>,
    timeout: Option<Duration>,
    segmentation: PathBuf,
    segments: Vec<Segment>,
}

impl CommandStatisticsProvider {
    pub async fn open(
        engine: impl Into<PathBuf>,
        segmentation: impl Into<PathBuf>,
        launcher: Option<PathBuf>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let engine = engine.into();
        let segmentation = segmentation.into();
        if !engine.exists() {
            return Err(PipelineError::Configuration(format!(
                "statistics engine not found: {}",
                engine.display()
            )));
        }
        if !segmentation.is_file() {
            return Err(PipelineError::Configuration(format!(
                "segmentation file not found: {}",
                segmentation.display()
            )));
        }

        let mut provider = Self {
            engine,
            launcher,
            timeout,
            segmentation,
            segments: Vec::new(),
        };

        let out = provider
            .run(&[
                OsStr::new("segments"),
                OsStr::new("--segmentation"),
                provider.segmentation.as_os_str(),
            ])
            .await
            .map_err(|reason| {
                PipelineError::Configuration(format!(
                    "segmentation {} could not be read: {}",
                    provider.segmentation.display(),
                    reason
                ))
            })?;
        if !out.status.success() {
            return Err(PipelineError::Configuration(format!(
                "segmentation {} could not be read: {}",
                provider.segmentation.display(),
                diagnostics(&out)
            )));
        }
        let segments = parse_segment_table(&out.stdout[..]).map_err(|reason| {
            PipelineError::Configuration(format!(
                "unreadable segment table for {}: {}",
                provider.segmentation.display(),
                reason
            ))
        })?;
        if segments.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "segmentation {} has no segments",
                provider.segmentation.display()
            )));
        }
        debug!("segmentation has {} segment(s)", segments.len());
        provider.segments = segments;
        Ok(provider)
    }

    async fn run(&self, args: &[&OsStr]) -> std::result::Result<Output, String> {
        let mut command = match &self.launcher {
            Some(launcher) => {
                let mut command = Command::new(launcher);
                command.arg(&self.engine);
                command
            }
            None => Command::new(&self.engine),
        };
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = command.output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| format!("engine timed out after {:?}", limit))?,
            None => run.await,
        };
        result.map_err(|e| format!("failed to launch {}: {}", self.engine.display(), e))
    }
}

impl StatisticsProvider for CommandStatisticsProvider {
    fn segments(&self) -> &[Segment] {
        &self.segments
    }

    async fn compute(&self, volume: &Path) -> Result<MetricTable> {
        let failure = |reason: String| PipelineError::Statistics {
            volume: volume.to_path_buf(),
            reason,
        };

        if !volume.is_file() {
            return Err(failure("volume could not be loaded: file not found".into()));
        }

        let out = self
            .run(&[
                OsStr::new("statistics"),
                OsStr::new("--segmentation"),
                self.segmentation.as_os_str(),
                OsStr::new("--volume"),
                volume.as_os_str(),
            ])
            .await
            .map_err(failure)?;
        if !out.status.success() {
            return Err(failure(diagnostics(&out)));
        }

        parse_metric_table(&out.stdout[..]).map_err(failure)
    }
}

fn diagnostics(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let detail = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&out.stdout)
    } else {
        stderr
    };
    format!("engine exited with {}: {}", out.status, detail.trim())
}

/// Parses `id,name` rows into the ordered segment table.
pub fn parse_segment_table<R: Read>(reader: R) -> std::result::Result<Vec<Segment>, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut segments = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        match (record.get(0), record.get(1)) {
            (Some(id), Some(name)) if !id.is_empty() => segments.push(Segment {
                id: id.to_string(),
                name: name.to_string(),
            }),
            _ => return Err(format!("malformed segment row: {:?}", record)),
        }
    }
    Ok(segments)
}

/// Parses an engine statistics table and checks that every segment reports mean and stdev.
pub fn parse_metric_table<R: Read>(reader: R) -> std::result::Result<MetricTable, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let metrics: Vec<String> = csv_reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .skip(1)
        .map(normalize_metric)
        .collect();
    if metrics.is_empty() {
        return Err("statistics table has no metric columns".into());
    }

    let mut table = MetricTable::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        let segment_id = match record.get(0) {
            Some(id) if !id.is_empty() => id,
            _ => continue,
        };
        for (metric, raw) in metrics.iter().zip(record.iter().skip(1)) {
            if raw.is_empty() {
                continue;
            }
            let value: f64 = raw.parse().map_err(|_| {
                format!(
                    "segment '{}': value '{}' for '{}' is not a number",
                    segment_id, raw, metric
                )
            })?;
            table.insert(segment_id, metric, value);
        }
    }

    if table.segment_ids().is_empty() {
        return Err("statistics table has no segments".into());
    }
    for segment_id in table.segment_ids() {
        for required in [MEAN, STDEV] {
            if table.get(segment_id, required).is_none() {
                return Err(format!("segment '{}' has no '{}' value", segment_id, required));
            }
        }
    }
    Ok(table)
}

/// `GS mean` -> `mean`: engines prefix grey-scale metrics.
fn normalize_metric(header: &str) -> String {
    let header = header.trim();
    header.strip_prefix("GS ").unwrap_or(header).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<Segment> {
        vec![
            Segment {
                id: "Segment_1".into(),
                name: "Tumor".into(),
            },
            Segment {
                id: "Segment_2".into(),
                name: "BG".into(),
            },
        ]
    }

    #[test]
    fn noise_segment_is_resolved_by_name() {
        let noise = resolve_noise_segment(&segments(), "BG").expect("noise");
        assert_eq!(noise.id, "Segment_2");

        match resolve_noise_segment(&segments(), "Background") {
            Err(PipelineError::UnknownNoiseSegment { name, available }) => {
                assert_eq!(name, "Background");
                assert_eq!(available, ["Tumor", "BG"]);
            }
            other => panic!("expected unknown segment, got {:?}", other),
        }
    }

    #[test]
    fn segment_table_keeps_native_order() {
        let csv = "id,name\nSegment_3,Kidney\nSegment_1, Tumor \n";
        let parsed = parse_segment_table(csv.as_bytes()).expect("segments");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "Segment_3");
        assert_eq!(parsed[1].name, "Tumor");
    }

    #[test]
    fn metric_table_normalizes_engine_prefixes() {
        let csv = "Segment,GS voxel count,GS mean,GS stdev\n\
                   Segment_1,120,10.5,2\n\
                   Segment_2,80,1,0.25\n";
        let table = parse_metric_table(csv.as_bytes()).expect("table");

        assert_eq!(table.segment_ids(), ["Segment_1", "Segment_2"]);
        assert_eq!(table.metric_names(), ["voxel count", MEAN, STDEV]);
        assert_eq!(table.get("Segment_1", MEAN), Some(10.5));
        assert_eq!(table.get("Segment_2", STDEV), Some(0.25));
    }

    #[test]
    fn metric_table_requires_mean_and_stdev() {
        let csv = "Segment,mean\nSegment_1,10\n";
        let err = parse_metric_table(csv.as_bytes()).unwrap_err();
        assert!(err.contains("stdev"));

        let csv = "Segment,mean,stdev\nSegment_1,ten,1\n";
        assert!(parse_metric_table(csv.as_bytes()).is_err());
    }

    #[cfg(unix)]
    mod command {
        use super::super::*;
        use std::fs;
        use tempfile::tempdir;

        const ENGINE: &str = r#"#!/bin/sh
case "$1" in
  segments)
    printf 'id,name\nSegment_1,Tumor\nSegment_2,BG\n' ;;
  statistics)
    [ -f "$5" ] || { echo "cannot load $5" >&2; exit 2; }
    printf 'Segment,GS mean,GS stdev\nSegment_1,10,2\nSegment_2,1,0.5\n' ;;
  *)
    exit 1 ;;
esac
"#;

        const HUNG_ENGINE: &str = r#"#!/bin/sh
if [ "$1" = segments ]; then printf 'id,name\nSegment_1,BG\n'; exit 0; fi
sleep 10
"#;

        fn write_inputs(dir: &Path, engine_script: &str) -> (PathBuf, PathBuf) {
            let engine = dir.join("engine.sh");
            fs::write(&engine, engine_script).expect("write engine");
            let seg = dir.join("seg.nrrd");
            fs::write(&seg, b"seg").expect("write seg");
            (engine, seg)
        }

        #[tokio::test]
        async fn engine_subcommands_drive_segments_and_statistics() {
            let dir = tempdir().expect("tempdir");
            let (engine, seg) = write_inputs(dir.path(), ENGINE);
            let volume = dir.path().join("Cond100-MetaA_T1.nrrd");
            fs::write(&volume, b"vol").expect("write volume");

            let provider = CommandStatisticsProvider::open(&engine, &seg, Some(sh()), None)
                .await
                .expect("open provider");
            assert_eq!(provider.segments().len(), 2);
            assert_eq!(provider.segments()[1].name, "BG");

            let table = provider.compute(&volume).await.expect("statistics");
            assert_eq!(table.get("Segment_1", MEAN), Some(10.0));
            assert_eq!(table.get("Segment_2", STDEV), Some(0.5));

            let missing = dir.path().join("missing.nrrd");
            match provider.compute(&missing).await {
                Err(PipelineError::Statistics { volume, .. }) => assert_eq!(volume, missing),
                other => panic!("expected statistics failure, got {:?}", other),
            }
        }

        fn sh() -> PathBuf {
            PathBuf::from("/bin/sh")
        }

        #[tokio::test]
        async fn hung_engine_is_stopped_by_timeout() {
            let dir = tempdir().expect("tempdir");
            let (engine, seg) = write_inputs(dir.path(), HUNG_ENGINE);
            let volume = dir.path().join("Cond100-MetaA_T1.nrrd");
            fs::write(&volume, b"vol").expect("write volume");

            let provider = CommandStatisticsProvider::open(
                &engine,
                &seg,
                Some(sh()),
                Some(Duration::from_millis(500)),
            )
            .await
            .expect("open provider");
            match provider.compute(&volume).await {
                Err(PipelineError::Statistics { reason, .. }) => {
                    assert!(reason.contains("timed out"), "{}", reason)
                }
                other => panic!("expected a timeout, got {:?}", other),
            }
        }
    }
}
