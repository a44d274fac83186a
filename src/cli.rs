//
// cli.rs
// HP-Stats-rs
//
// Defines the CLI surface with Clap and dispatches the selected command to the pipeline.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use crate::config::{PipelineConfig, DEFAULT_OUTPUT_ROOT, DEFAULT_SCRATCH_DIR};
use crate::converter::{default_converter_path, CommandConverter};
use crate::discovery;
use crate::pipeline::Pipeline;
use crate::segmentation::{CommandStatisticsProvider, StatisticsProvider};

#[derive(Parser)]
#[command(name = "hp-stats")]
#[command(about = "Segment statistics for hyperpolarized MRI series", long_about = None)]
pub struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert every scan folder, compute segment statistics and write one workbook per condition
    Collect(CollectArgs),
    /// List the scan folders a root resolves to, without converting anything
    Discover {
        #[arg(long)]
        path_to_dicoms: PathBuf,
        #[arg(long, num_args = 1..)]
        exclude_dirs: Vec<String>,
    },
    /// Print the segment table of a segmentation
    Segments {
        #[arg(long)]
        segmentation_file: PathBuf,
        #[arg(long)]
        statistics_engine: PathBuf,
    },
}

#[derive(Args)]
pub struct CollectArgs {
    /// Root folder laid out as <condition>/<metabolite>/<volume>/<scans>
    #[arg(long)]
    pub path_to_dicoms: PathBuf,
    #[arg(long)]
    pub segmentation_file: PathBuf,
    /// Name of the folder the workbooks are saved in
    #[arg(long)]
    pub folder_save_name: String,
    /// Keep the intermediate volumes after a successful run
    #[arg(long)]
    pub keep_nrrd_dir: bool,
    /// Noise segment name; enables the SNR and Ratios sheets
    #[arg(long, value_name = "SEGMENT")]
    pub get_snr: Option<String>,
    /// Series the SNR ratios are computed against
    #[arg(long)]
    pub denominator_metabolite: Option<String>,
    /// Scan folder names to ignore
    #[arg(long, num_args = 1..)]
    pub exclude_dirs: Vec<String>,
    /// Hide the per-series sheets, leaving the summary sheets visible
    #[arg(long)]
    pub hide_raw_sheets: bool,
    /// Also write every sheet as CSV
    #[arg(long)]
    pub csv: bool,
    /// Converter executable (defaults to the one next to this binary)
    #[arg(long)]
    pub converter: Option<PathBuf>,
    /// Program the converter is started through
    #[arg(long)]
    pub launcher: Option<PathBuf>,
    /// Seconds before a conversion is aborted, 0 waits forever
    #[arg(long, default_value_t = 600)]
    pub converter_timeout_secs: u64,
    #[arg(long)]
    pub statistics_engine: PathBuf,
    /// Seconds before one statistics computation is aborted, 0 waits forever
    #[arg(long, default_value_t = 600)]
    pub statistics_timeout_secs: u64,
    #[arg(long, default_value = DEFAULT_OUTPUT_ROOT)]
    pub output_root: PathBuf,
    #[arg(long, default_value = DEFAULT_SCRATCH_DIR)]
    pub scratch_dir: PathBuf,
}

impl CollectArgs {
    pub fn to_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(
            &self.path_to_dicoms,
            &self.segmentation_file,
            &self.folder_save_name,
        )
        .with_denominator(self.denominator_metabolite.clone());
        config.excluded_folder_names = self.exclude_dirs.iter().cloned().collect();
        config.noise_segment_name = self.get_snr.clone();
        config.output_root = self.output_root.clone();
        config.scratch_dir = self.scratch_dir.clone();
        config.retain_intermediate_files = self.keep_nrrd_dir;
        config.hide_auxiliary_sheets = self.hide_raw_sheets;
        config.emit_csv = self.csv;
        config
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Collect(args) => collect(&args).await?,
        Commands::Discover {
            path_to_dicoms,
            exclude_dirs,
        } => {
            let excluded = exclude_dirs.into_iter().collect();
            let leaves = discovery::discover(&path_to_dicoms, &excluded)?;
            for leaf in &leaves {
                println!(
                    "{} / {} / {} -> {:?}",
                    leaf.condition, leaf.metabolite, leaf.volume_id, leaf.path
                );
            }
            println!("{} scan folder(s)", leaves.len());
        }
        Commands::Segments {
            segmentation_file,
            statistics_engine,
        } => {
            let provider =
                CommandStatisticsProvider::open(&statistics_engine, &segmentation_file, None, None)
                    .await?;
            for segment in provider.segments() {
                println!("{}\t{}", segment.id, segment.name);
            }
        }
    }

    Ok(())
}

async fn collect(args: &CollectArgs) -> anyhow::Result<()> {
    let config = args.to_config();

    let executable = match &args.converter {
        Some(path) => path.clone(),
        None => default_converter_path()
            .ok_or_else(|| anyhow!("cannot locate the converter, pass --converter"))?,
    };
    let converter = CommandConverter::new(executable)?
        .with_launcher(args.launcher.clone())
        .with_timeout(timeout_from_secs(args.converter_timeout_secs));
    let provider = CommandStatisticsProvider::open(
        &args.statistics_engine,
        &config.segmentation_path,
        None,
        timeout_from_secs(args.statistics_timeout_secs),
    )
    .await
    .context("failed to open the segmentation")?;

    let summary = Pipeline::new(&config, &converter, &provider).run().await?;
    for workbook in &summary.workbooks {
        println!("Saved {:?}", workbook);
    }
    if !summary.csv_files.is_empty() {
        println!("{} CSV file(s) in {:?}", summary.csv_files.len(), config.csv_dir());
    }
    println!("Summary: {:?}", config.summary_path());
    Ok(())
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    // A subscriber may already be installed when embedded as a library.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}
