use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::EncoderConfig;
use crate::sampler::SamplerConfig;
use crate::simulate::SimulationConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("target_accept must lie strictly between 0 and 1, got {0}")]
    TargetAccept(f64),
    #[error("init_jitter must be finite and non-negative, got {0}")]
    Jitter(f64),
}

/// Every tunable of one run. Missing JSON keys fall back to the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub encoder: EncoderConfig,
    pub sampler: SamplerConfig,
    pub simulation: SimulationConfig,
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<usize>("GOALCAST_CHAINS") {
            self.sampler.chains = v;
        }
        if let Some(v) = env_parse::<usize>("GOALCAST_WARMUP") {
            self.sampler.warmup = v;
        }
        if let Some(v) = env_parse::<usize>("GOALCAST_DRAWS") {
            self.sampler.draws = v;
        }
        if let Some(v) = env_parse::<u64>("GOALCAST_SEED") {
            self.sampler.seed = v;
        }
        if let Some(v) = env_parse::<usize>("GOALCAST_SIM_DRAWS") {
            self.simulation.draws = v;
        }
        if let Some(v) = std::env::var("GOALCAST_SPLIT_DATE")
            .ok()
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
        {
            self.encoder.split_date = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("encoder.year_bucket_width", self.encoder.year_bucket_width.max(0) as usize),
            ("encoder.form_window", self.encoder.form_window),
            ("sampler.chains", self.sampler.chains),
            ("sampler.draws", self.sampler.draws),
            ("sampler.max_tree_depth", self.sampler.max_tree_depth as usize),
            ("simulation.draws", self.simulation.draws),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*name));
        }
        let accept = self.sampler.target_accept;
        if !(accept > 0.0 && accept < 1.0) {
            return Err(ConfigError::TargetAccept(accept));
        }
        let jitter = self.sampler.init_jitter;
        if !(jitter.is_finite() && jitter >= 0.0) {
            return Err(ConfigError::Jitter(jitter));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}
