use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use goalcast::calibration::{self, CalibrationBin, ForecastReport, Outcome, Prob3};
use goalcast::config::PipelineConfig;
use goalcast::pipeline::{self, PipelineOutput};
use goalcast::posterior::SamplerReport;
use goalcast::{csv_io, logging};

const DEFAULT_BINS: usize = 10;
const TOP_TEAMS: usize = 10;

#[derive(Debug, Serialize)]
struct BacktestReport {
    train_matches: usize,
    test_matches: usize,
    forecast: ForecastReport,
    ece: f64,
    sampler: SamplerReport,
    home_bins: Vec<CalibrationBin>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init();

    let data_path = parse_path_arg("--data")
        .or_else(|| std::env::args().nth(1).filter(|a| !a.starts_with("--")).map(PathBuf::from))
        .or_else(|| std::env::var("GOALCAST_DATA").ok().map(PathBuf::from))
        .ok_or_else(|| anyhow!("usage: backtest --data <matches.csv> [--config <json>] [--bins N] [--report-out <json>]"))?;
    let bins = parse_usize_arg("--bins").unwrap_or(DEFAULT_BINS).clamp(2, 50);

    let mut cfg = match parse_path_arg("--config") {
        Some(path) => PipelineConfig::from_json_file(&path)?,
        None => PipelineConfig::default(),
    };
    cfg.apply_env_overrides();

    let rows = csv_io::load_raw_rows(&data_path)?;
    let output = pipeline::run_rows(&rows, &cfg).context("pipeline run")?;
    if output.forecasts.is_empty() {
        return Err(anyhow!(
            "no evaluation matches after {}; nothing to score",
            cfg.encoder.split_date
        ));
    }

    let test = &output.dataset.test;
    let forecast = calibration::evaluate_forecasts(&output.forecasts, test);
    let outcomes: Vec<Outcome> = (0..test.len())
        .map(|i| calibration::classify_outcome(test.home.goals[i], test.away.goals[i]))
        .collect();
    let probs: Vec<Prob3> = output.forecasts.iter().map(|f| f.probs).collect();
    let ece = ece_1x2(&probs, &outcomes, bins);

    println!("Rating model backtest");
    println!("Data: {}", data_path.display());
    println!(
        "train={} test={} split={} teams={} tournaments={} year_buckets={}",
        output.dataset.train.len(),
        test.len(),
        cfg.encoder.split_date,
        output.dataset.mappings.n_teams(),
        output.dataset.mappings.n_tournaments(),
        output.dataset.mappings.n_years()
    );
    println!();

    let s = &output.report;
    println!(
        "sampler chains={} draws/chain={} divergent={} max_rhat={:.3} min_ess={:.0} unsupported_cells={}",
        s.chains, s.draws_per_chain, s.divergent, s.max_rhat, s.min_ess, s.unsupported_skill_cells
    );
    for g in &s.global {
        println!(
            "  {:<12} mean={:+.4} sd={:.4} rhat={:.3} ess={:.0}",
            g.name, g.summary.mean, g.summary.sd, g.summary.rhat, g.summary.ess
        );
    }
    println!();

    println!(
        "forecast samples={} acc_sign={:.3} acc_argmax={:.3} ll={:.4} brier={:.4} ece={:.4}",
        forecast.samples,
        forecast.result_accuracy,
        forecast.favourite_accuracy,
        forecast.log_loss,
        forecast.brier,
        ece
    );
    println!(
        "goals mae_home={:.3} mae_away={:.3} exact_score={:.3} low_confidence={}",
        forecast.mae_home_goals, forecast.mae_away_goals, forecast.exact_score_rate, forecast.low_confidence
    );
    println!();

    let home_bins = calibration::calibration_bins(&probs, &outcomes, Outcome::Home, bins);
    println!("home-win calibration");
    for b in home_bins.iter().filter(|b| b.count > 0) {
        println!(
            "  [{:.2}, {:.2}) n={:<5} pred={:.3} actual={:.3}",
            b.bucket_start, b.bucket_end, b.count, b.avg_pred, b.actual_rate
        );
    }
    println!();

    print_top_teams(&output);

    if let Some(path) = parse_path_arg("--report-out") {
        let report = BacktestReport {
            train_matches: output.dataset.train.len(),
            test_matches: test.len(),
            forecast,
            ece,
            sampler: output.report.clone(),
            home_bins,
        };
        let json = serde_json::to_string_pretty(&report).context("serialize backtest report")?;
        fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        println!("Wrote report to {}", path.display());
    }

    Ok(())
}

/// Strongest teams in the most recent year bucket by posterior mean skill.
fn print_top_teams(output: &PipelineOutput) {
    let dims = output.params.dims;
    let Some(year) = dims.n_years.checked_sub(1) else {
        return;
    };
    let mut rows: Vec<(usize, f64)> = (0..dims.n_teams)
        .filter(|t| output.posterior.support.skill_support(year, *t) > 0)
        .map(|t| (t, output.params.skill(year, t)))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));

    println!("top skills (latest year bucket)");
    for (team, skill) in rows.into_iter().take(TOP_TEAMS) {
        println!(
            "  {:<24} skill={:+.3} sd={:.3} matches={}",
            output.dataset.mappings.team_name(team).unwrap_or("?"),
            skill,
            output.posterior.skill_sd(year, team),
            output.posterior.support.skill_support(year, team)
        );
    }
}

fn ece_1x2(probs: &[Prob3], outcomes: &[Outcome], bins: usize) -> f64 {
    let n = probs.len().min(outcomes.len());
    if n == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for class in calibration::OUTCOMES {
        for b in calibration::calibration_bins(probs, outcomes, class, bins) {
            total += b.count as f64 / n as f64 * (b.avg_pred - b.actual_rate).abs();
        }
    }
    total / 3.0
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

fn parse_usize_arg(name: &str) -> Option<usize> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
        }
    }
    None
}
