//
// converter.rs
// HP-Stats-rs
//
// Boundary to the external DICOM-to-volume converter. Each scan folder is converted by one
// independent process invocation into a caller-chosen output file.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, Result};

pub const DEFAULT_CONVERTER_NAME: &str = "DicomToNrrdConverter";

/// Outcome of converting one scan folder.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub success: bool,
    /// Converter diagnostics when the conversion failed.
    pub message: Option<String>,
    pub elapsed: Duration,
}

impl ConversionReport {
    fn failed(message: impl Into<String>, start: Instant) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            elapsed: start.elapsed(),
        }
    }
}

/// Converts the scans of one folder into a single volume file at `output`.
///
/// Implementations must not share mutable state between calls: every `(leaf, output)` pair
/// is independent of the others.
#[allow(async_fn_in_trait)]
pub trait VolumeConverter {
    async fn convert(&self, leaf: &Path, output: &Path) -> ConversionReport;
}

/// Converter executable expected next to the running binary.
pub fn default_converter_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let name = format!("{}{}", DEFAULT_CONVERTER_NAME, std::env::consts::EXE_SUFFIX);
    Some(exe.parent()?.join(name))
}

/// Runs `<converter> --inputDicomDirectory <leaf> --outputVolume <output>`, optionally
/// through a launcher program that prepares the converter's environment.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    executable: PathBuf,
    launcher: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandConverter {
    pub fn new(executable: impl Into<PathBuf>) -> Result<Self> {
        let executable = executable.into();
        if !executable.exists() {
            return Err(PipelineError::Configuration(format!(
                "converter executable not found: {}",
                executable.display()
            )));
        }
        Ok(Self {
            executable,
            launcher: None,
            timeout: None,
        })
    }

    pub fn with_launcher(mut self, launcher: Option<PathBuf>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, leaf: &Path, output: &Path) -> Command {
        let mut command = match &self.launcher {
            Some(launcher) => {
                let mut command = Command::new(launcher);
                command.arg(&self.executable);
                command
            }
            None => Command::new(&self.executable),
        };
        command
            .arg("--inputDicomDirectory")
            .arg(leaf)
            .arg("--outputVolume")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl VolumeConverter for CommandConverter {
    async fn convert(&self, leaf: &Path, output: &Path) -> ConversionReport {
        let start = Instant::now();

        // A volume left over from an earlier run must not pass for this conversion's output.
        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!("removed stale volume {:?}", output),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return ConversionReport::failed(
                    format!("cannot replace existing volume {}: {}", output.display(), e),
                    start,
                )
            }
        }

        let mut command = self.command(leaf, output);
        let run = command.output();

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                // Dropping the future kills the child (kill_on_drop).
                Err(_) => {
                    return ConversionReport::failed(
                        format!("converter timed out after {:?}", limit),
                        start,
                    )
                }
            },
            None => run.await,
        };

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                return ConversionReport::failed(
                    format!("failed to launch {}: {}", self.executable.display(), e),
                    start,
                )
            }
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stdout = String::from_utf8_lossy(&out.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            return ConversionReport::failed(
                format!("converter exited with {}: {}", out.status, detail.trim()),
                start,
            );
        }

        // A zero exit status alone is not trusted; the volume has to be on disk.
        if !output.is_file() {
            return ConversionReport::failed(
                format!("converter produced no volume at {}", output.display()),
                start,
            );
        }

        ConversionReport {
            success: true,
            message: None,
            elapsed: start.elapsed(),
        }
    }
}
