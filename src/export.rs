//
// export.rs
// HP-Stats-rs
//
// Lays accumulated statistics out as one workbook per condition: raw signal, SNR and
// SNR ratios against a denominator series, plus one auxiliary sheet per series.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::models::{
    ConditionStatistics, NoiseSegment, Segment, SegmentStatisticsSnapshot, SeriesStatistics,
    StatisticsTable, MEAN, SNR, STDEV,
};
use crate::workbook::{Cell, Sheet, Workbook};

pub const RAW_SIGNAL_SHEET: &str = "Raw Signal";
pub const SNR_SHEET: &str = "SNR";
pub const RATIOS_SHEET: &str = "Ratios";
pub const SUMMARY_SHEETS: [&str; 3] = [RAW_SIGNAL_SHEET, SNR_SHEET, RATIOS_SHEET];
pub const NOISE_STDEV_COLUMN: &str = "BG STDEV";

/// Raw mode writes only mean signal; SNR mode adds SNR and ratio sheets.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutMode {
    Raw,
    Snr {
        noise: NoiseSegment,
        denominator: String,
    },
}

pub struct WorkbookAssembler<'a> {
    segments: &'a [Segment],
    mode: LayoutMode,
    hide_auxiliary_sheets: bool,
}

impl<'a> WorkbookAssembler<'a> {
    pub fn new(segments: &'a [Segment], mode: LayoutMode) -> Self {
        Self {
            segments,
            mode,
            hide_auxiliary_sheets: false,
        }
    }

    pub fn hide_auxiliary_sheets(mut self, hide: bool) -> Self {
        self.hide_auxiliary_sheets = hide;
        self
    }

    /// One workbook per condition, in the table's condition order.
    pub fn assemble(&self, table: &StatisticsTable) -> Result<Vec<(String, Workbook)>> {
        table
            .conditions
            .iter()
            .map(|condition| {
                let workbook = self.assemble_condition(condition)?;
                Ok((condition.condition.clone(), workbook))
            })
            .collect()
    }

    pub fn assemble_condition(&self, condition: &ConditionStatistics) -> Result<Workbook> {
        let mut workbook = Workbook::new();
        match &self.mode {
            LayoutMode::Raw => self.write_raw(&mut workbook, condition)?,
            LayoutMode::Snr { noise, denominator } => {
                self.write_snr(&mut workbook, condition, noise, denominator)?
            }
        }
        self.write_auxiliary(&mut workbook, condition);

        workbook.remove_default_sheet();
        if self.hide_auxiliary_sheets {
            workbook.hide_sheets_except(&SUMMARY_SHEETS);
        }
        Ok(workbook)
    }

    fn write_raw(&self, workbook: &mut Workbook, condition: &ConditionStatistics) -> Result<()> {
        let segments: Vec<&Segment> = self.segments.iter().collect();
        let sheet = workbook.sheet_mut(RAW_SIGNAL_SHEET);

        for series in &condition.series {
            write_series_header(sheet, series, &segments, None);
            for (timepoint, snapshot) in series.snapshots.iter().enumerate() {
                let mut row = vec![Cell::from(timepoint + 1)];
                for segment in &segments {
                    row.push(metric(snapshot, &segment.id, MEAN)?.into());
                }
                sheet.append(row);
            }
        }
        Ok(())
    }

    fn write_snr(
        &self,
        workbook: &mut Workbook,
        condition: &ConditionStatistics,
        noise: &NoiseSegment,
        denominator: &str,
    ) -> Result<()> {
        let segments: Vec<&Segment> = self
            .segments
            .iter()
            .filter(|segment| segment.id != noise.id)
            .collect();
        let reference = condition.series(denominator).ok_or_else(|| {
            PipelineError::MissingDenominator {
                condition: condition.condition.clone(),
                denominator: denominator.to_string(),
            }
        })?;

        // Sheet order stays Raw Signal, SNR, Ratios regardless of content.
        for title in SUMMARY_SHEETS {
            workbook.sheet_mut(title);
        }

        for series in &condition.series {
            let ratio_series = series.metabolite != denominator;
            if ratio_series && series.len() != reference.len() {
                return Err(PipelineError::TimepointMismatch {
                    condition: condition.condition.clone(),
                    series: series.metabolite.clone(),
                    series_len: series.len(),
                    denominator: denominator.to_string(),
                    denominator_len: reference.len(),
                });
            }

            write_series_header(
                workbook.sheet_mut(RAW_SIGNAL_SHEET),
                series,
                &segments,
                Some(NOISE_STDEV_COLUMN),
            );
            write_series_header(workbook.sheet_mut(SNR_SHEET), series, &segments, None);
            if ratio_series {
                write_series_header(workbook.sheet_mut(RATIOS_SHEET), series, &segments, None);
            }

            for (timepoint, snapshot) in series.snapshots.iter().enumerate() {
                let mut raw_row = vec![Cell::from(timepoint + 1)];
                let mut snr_row = vec![Cell::from(timepoint + 1)];
                let mut ratio_row = vec![Cell::from(timepoint + 1)];

                for segment in &segments {
                    raw_row.push(metric(snapshot, &segment.id, MEAN)?.into());
                    let snr = metric(snapshot, &segment.id, SNR)?;
                    snr_row.push(snr.into());
                    if ratio_series {
                        let reference_snr =
                            metric(&reference.snapshots[timepoint], &segment.id, SNR)?;
                        ratio_row.push((snr / reference_snr).into());
                    }
                }
                raw_row.push(metric(snapshot, &noise.id, STDEV)?.into());

                workbook.sheet_mut(RAW_SIGNAL_SHEET).append(raw_row);
                workbook.sheet_mut(SNR_SHEET).append(snr_row);
                if ratio_series {
                    workbook.sheet_mut(RATIOS_SHEET).append(ratio_row);
                }
            }
        }
        Ok(())
    }

    /// Per-series dump of every engine metric, one block per volume. Titles never reuse a
    /// summary sheet name, so a series called `SNR` cannot leak into the summary layout.
    fn write_auxiliary(&self, workbook: &mut Workbook, condition: &ConditionStatistics) {
        for series in &condition.series {
            let sheet = workbook.add_sheet(&series.metabolite, &SUMMARY_SHEETS);
            for snapshot in &series.snapshots {
                let metrics = snapshot.metrics.metric_names();
                sheet.append(vec![snapshot.volume_name.as_str().into()]);

                let mut titles = vec![Cell::from("Segment")];
                titles.extend(metrics.iter().map(|m| Cell::from(m.as_str())));
                sheet.append(titles);

                for segment_id in snapshot.metrics.segment_ids() {
                    let mut row = vec![Cell::from(self.segment_name(segment_id))];
                    row.extend(metrics.iter().map(|m| {
                        snapshot
                            .get(segment_id, m)
                            .map_or(Cell::Empty, Cell::Number)
                    }));
                    sheet.append(row);
                }
            }
        }
    }

    fn segment_name<'s>(&'s self, segment_id: &'s str) -> &'s str {
        self.segments
            .iter()
            .find(|s| s.id == segment_id)
            .map_or(segment_id, |s| s.name.as_str())
    }
}

fn write_series_header(
    sheet: &mut Sheet,
    series: &SeriesStatistics,
    segments: &[&Segment],
    trailing: Option<&str>,
) {
    sheet.append(vec![series.metabolite.as_str().into()]);
    let mut index = vec![Cell::from("")];
    index.extend(segments.iter().map(|s| Cell::from(s.name.as_str())));
    if let Some(column) = trailing {
        index.push(column.into());
    }
    sheet.append(index);
}

fn metric(snapshot: &SegmentStatisticsSnapshot, segment_id: &str, name: &str) -> Result<f64> {
    snapshot
        .get(segment_id, name)
        .ok_or_else(|| PipelineError::Statistics {
            volume: PathBuf::from(&snapshot.volume_name),
            reason: format!("segment '{}' has no '{}' value", segment_id, name),
        })
}
