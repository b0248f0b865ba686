use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use goalcast::config::PipelineConfig;
use goalcast::{csv_io, logging, pipeline};

const DEFAULT_OUT: &str = "predictions.csv";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init();

    let data_path = parse_path_arg("--data")
        .or_else(|| std::env::var("GOALCAST_DATA").ok().map(PathBuf::from))
        .ok_or_else(|| anyhow!("usage: goalcast --data <matches.csv> [--out <csv>] [--config <json>] [--mappings-out <json>]"))?;
    let out_path = parse_path_arg("--out").unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));

    let mut cfg = match parse_path_arg("--config") {
        Some(path) => PipelineConfig::from_json_file(&path)?,
        None => PipelineConfig::default(),
    };
    cfg.apply_env_overrides();

    let rows = csv_io::load_raw_rows(&data_path)?;
    log::info!("loaded {} rows from {}", rows.len(), data_path.display());

    let output = pipeline::run_rows(&rows, &cfg).context("pipeline run")?;

    csv_io::write_predictions(&out_path, &output.predictions())?;
    println!(
        "Wrote {} predictions to {} (divergent={}, max R-hat={:.3})",
        output.forecasts.len(),
        out_path.display(),
        output.report.divergent,
        output.report.max_rhat
    );

    if let Some(path) = parse_path_arg("--mappings-out") {
        let json = serde_json::to_string_pretty(&output.dataset.mappings)
            .context("serialize mappings")?;
        fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        println!("Wrote mappings to {}", path.display());
    }

    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next.trim()));
        }
    }
    None
}
