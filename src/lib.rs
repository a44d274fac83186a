//
// lib.rs
// HP-Stats-rs
//
// Exposes the pipeline modules and re-exports the CLI entry point for both binary and library
// consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Leaf-first: discovery and the two gateways feed the aggregator, whose table the exporter
// lays out.
pub mod cli;
pub mod config;
pub mod converter;
pub mod discovery;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod segmentation;
pub mod stats;
pub mod storage;
pub mod workbook;

pub use cli::{run as run_cli, Cli, Commands};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
