//
// main.rs
// HP-Stats-rs
//
// Tokio entry point that hands off execution to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use hp_stats::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
