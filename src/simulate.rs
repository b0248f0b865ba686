use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::{self, Prob3};
use crate::features::EncodedMatchSet;
use crate::rating_model::{MatchFeatures, MatchRates, RatingParams, SupportCounts};
use crate::sampler::seeded_stream;

/// Goal rates above this are rejected before any table or draw buffer is sized by them.
pub const MAX_GOAL_RATE: f64 = 1000.0;
const MAX_TABLE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub draws: usize,
    pub seed: u64,
    /// Home and away draws reuse the same uniforms.
    pub paired_draws: bool,
    pub max_goals: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            draws: 5000,
            seed: 7,
            paired_draws: true,
            max_goals: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulateError {
    #[error("evaluation row {row}: non-finite goal rate (home {lambda_home}, away {lambda_away})")]
    NonFiniteRate {
        row: usize,
        lambda_home: f64,
        lambda_away: f64,
    },
    #[error("evaluation row {row}: goal rate out of range (home {lambda_home}, away {lambda_away})")]
    RateOutOfRange {
        row: usize,
        lambda_home: f64,
        lambda_away: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mean_home_goal: f64,
    pub mean_away_goal: f64,
    pub mode_home_goal: u32,
    pub mode_away_goal: u32,
    pub pred_result: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub prediction: Prediction,
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub probs: Prob3,
    pub low_confidence: bool,
}

#[derive(Debug, Clone)]
pub struct PredictiveSimulator {
    params: RatingParams,
    support: Option<SupportCounts>,
    cfg: SimulationConfig,
}

impl PredictiveSimulator {
    pub fn new(params: RatingParams, cfg: SimulationConfig) -> Self {
        Self {
            params,
            support: None,
            cfg,
        }
    }

    pub fn with_support(mut self, support: SupportCounts) -> Self {
        self.support = Some(support);
        self
    }

    pub fn params(&self) -> &RatingParams {
        &self.params
    }

    pub fn predict(&self, set: &EncodedMatchSet) -> Result<Vec<Forecast>, SimulateError> {
        let forecasts: Vec<Forecast> = (0..set.len())
            .into_par_iter()
            .map(|row| self.forecast(row, MatchFeatures::from_set(set, row)))
            .collect::<Result<_, _>>()?;

        let flagged = forecasts.iter().filter(|f| f.low_confidence).count();
        if flagged > 0 {
            log::warn!("{flagged} of {} forecasts rely on cells without training data", forecasts.len());
        }
        Ok(forecasts)
    }

    // `row` picks the RNG stream.
    pub fn forecast(&self, row: usize, m: MatchFeatures) -> Result<Forecast, SimulateError> {
        let rates = self.params.rates(m);
        if !rates.is_finite() {
            return Err(SimulateError::NonFiniteRate {
                row,
                lambda_home: rates.home,
                lambda_away: rates.away,
            });
        }
        if rates.home > MAX_GOAL_RATE || rates.away > MAX_GOAL_RATE {
            return Err(SimulateError::RateOutOfRange {
                row,
                lambda_home: rates.home,
                lambda_away: rates.away,
            });
        }

        let mut rng = seeded_stream(self.cfg.seed, row as u64);
        let (home, away) = if self.cfg.paired_draws {
            draw_paired(rates, self.cfg.draws, &mut rng)
        } else {
            draw_independent(rates, self.cfg.draws, &mut rng)
        };

        Ok(Forecast {
            prediction: summarize(&home, &away),
            lambda_home: rates.home,
            lambda_away: rates.away,
            probs: calibration::outcome_probs_poisson(rates.home, rates.away, self.cfg.max_goals),
            low_confidence: self
                .support
                .as_ref()
                .is_some_and(|s| s.is_low_confidence(m)),
        })
    }
}

pub fn summarize(home: &[u32], away: &[u32]) -> Prediction {
    let mean_home_goal = mean_goals(home);
    let mean_away_goal = mean_goals(away);
    Prediction {
        mean_home_goal,
        mean_away_goal,
        mode_home_goal: modal_value(home),
        mode_away_goal: modal_value(away),
        pred_result: result_sign(mean_home_goal, mean_away_goal),
    }
}

fn mean_goals(draws: &[u32]) -> f64 {
    if draws.is_empty() {
        return 0.0;
    }
    draws.iter().map(|g| *g as u64).sum::<u64>() as f64 / draws.len() as f64
}

/// Most frequent value; ties go to the smallest.
pub fn modal_value(draws: &[u32]) -> u32 {
    let Some(max) = draws.iter().max() else {
        return 0;
    };
    let mut counts = vec![0usize; *max as usize + 1];
    for g in draws {
        counts[*g as usize] += 1;
    }
    let mut best = 0usize;
    for (value, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = value;
        }
    }
    best as u32
}

pub fn result_sign(mean_home: f64, mean_away: f64) -> i8 {
    let diff = mean_home - mean_away;
    if diff > 0.0 {
        1
    } else if diff < 0.0 {
        -1
    } else {
        0
    }
}

/// Inverse-CDF table of a Poisson distribution, at most `MAX_TABLE_LEN` entries long.
#[derive(Debug, Clone)]
pub struct PoissonQuantiles {
    cdf: Vec<f64>,
}

impl PoissonQuantiles {
    pub fn new(lambda: f64) -> Self {
        let lambda = lambda.max(0.0);
        let ln_lambda = lambda.ln();
        let k_max = ((lambda + 50.0 * lambda.sqrt() + 50.0) as usize).min(MAX_TABLE_LEN - 1);

        let mut cdf = Vec::new();
        let mut log_pmf = -lambda;
        let mut cum = 0.0;
        for k in 0..=k_max {
            cum += log_pmf.exp();
            cdf.push(cum.min(1.0));
            if cum >= 1.0 - 1e-15 {
                break;
            }
            log_pmf += ln_lambda - ((k + 1) as f64).ln();
        }
        Self { cdf }
    }

    pub fn quantile(&self, u: f64) -> u32 {
        let k = self.cdf.partition_point(|c| *c < u);
        k.min(self.cdf.len() - 1) as u32
    }
}

fn draw_paired(rates: MatchRates, n: usize, rng: &mut ChaCha8Rng) -> (Vec<u32>, Vec<u32>) {
    let home_q = PoissonQuantiles::new(rates.home);
    let away_q = PoissonQuantiles::new(rates.away);
    let mut home = Vec::with_capacity(n);
    let mut away = Vec::with_capacity(n);
    for _ in 0..n {
        let u: f64 = rng.r#gen();
        home.push(home_q.quantile(u));
        away.push(away_q.quantile(u));
    }
    (home, away)
}

fn draw_independent(rates: MatchRates, n: usize, rng: &mut ChaCha8Rng) -> (Vec<u32>, Vec<u32>) {
    let home = poisson_draws(rates.home, n, rng);
    let away = poisson_draws(rates.away, n, rng);
    (home, away)
}

fn poisson_draws(lambda: f64, n: usize, rng: &mut ChaCha8Rng) -> Vec<u32> {
    match Poisson::new(lambda) {
        Ok(dist) => (0..n)
            .map(|_| {
                let g: f64 = dist.sample(rng);
                g as u32
            })
            .collect(),
        // only a zero (underflowed) rate
        Err(_) => vec![0; n],
    }
}
