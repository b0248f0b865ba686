//! End-to-end run: records, encoded dataset, posterior, forecasts.

use std::time::Instant;

use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::features::{self, Dataset, EncodedMatchSet};
use crate::match_record::{self, MatchRecord, RawMatchRow, RecordError};
use crate::posterior::{RatingPosterior, SamplerReport};
use crate::rating_model::{ModelDims, RatingModel, RatingParams, SupportCounts};
use crate::sampler::{self, SamplerConfig};
use crate::simulate::{Forecast, Prediction, PredictiveSimulator, SimulateError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Simulate(#[from] SimulateError),
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dataset: Dataset,
    pub posterior: RatingPosterior,
    pub params: RatingParams,
    pub forecasts: Vec<Forecast>,
    pub report: SamplerReport,
}

impl PipelineOutput {
    /// Output table rows, in evaluation order.
    pub fn predictions(&self) -> Vec<Prediction> {
        self.forecasts.iter().map(|f| f.prediction).collect()
    }
}

/// Samples the rating posterior from the training partition.
pub fn fit(train: &EncodedMatchSet, dims: ModelDims, cfg: &SamplerConfig) -> RatingPosterior {
    let model = RatingModel::new(dims, train);
    let started = Instant::now();
    let draws = sampler::sample(&model, cfg);
    log::info!(
        "sampled {} chains x {} draws over {} parameters in {:.1}s",
        cfg.chains,
        cfg.draws,
        dims.dim(),
        started.elapsed().as_secs_f64()
    );
    RatingPosterior::new(dims, draws, SupportCounts::from_matches(dims, train))
}

pub fn run(records: &[MatchRecord], cfg: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    cfg.validate()?;

    let dataset = features::encode(records, &cfg.encoder);
    if dataset.train.is_empty() {
        log::warn!("training partition is empty; every parameter stays at its prior");
    }
    let dims = ModelDims::from_mappings(&dataset.mappings);

    let posterior = fit(&dataset.train, dims, &cfg.sampler);
    let report = posterior.report();
    let params = posterior.point_estimate();

    let simulator = PredictiveSimulator::new(params.clone(), cfg.simulation)
        .with_support(posterior.support.clone());
    let forecasts = simulator.predict(&dataset.test)?;
    log::info!("forecast {} evaluation matches", forecasts.len());

    Ok(PipelineOutput {
        dataset,
        posterior,
        params,
        forecasts,
        report,
    })
}

/// Validates raw table rows, then runs.
pub fn run_rows(rows: &[RawMatchRow], cfg: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    let records = match_record::parse_rows(rows)?;
    run(&records, cfg)
}
