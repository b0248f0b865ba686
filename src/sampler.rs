use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::adaptation::WarmupAdapter;
use crate::diagnostics;
use crate::nuts::{self, Metric, Point};

pub trait LogDensity: Sync {
    fn dim(&self) -> usize;

    /// Writes the gradient into `grad` (length `dim()`) and returns the log density.
    fn log_density_and_gradient(&self, theta: &[f64], grad: &mut [f64]) -> f64;

    fn log_density(&self, theta: &[f64]) -> f64 {
        let mut grad = vec![0.0; self.dim()];
        self.log_density_and_gradient(theta, &mut grad)
    }

    fn initial_point(&self) -> Vec<f64> {
        vec![0.0; self.dim()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub chains: usize,
    pub warmup: usize,
    pub draws: usize,
    pub target_accept: f64,
    pub max_tree_depth: u32,
    pub init_jitter: f64,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            warmup: 1000,
            draws: 1000,
            target_accept: 0.9,
            max_tree_depth: 10,
            init_jitter: 1.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawStats {
    pub accept_stat: f64,
    pub tree_depth: u32,
    pub n_leapfrog: u32,
    pub divergent: bool,
    pub log_density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDraws {
    pub chain: usize,
    pub dim: usize,
    /// Retained draws, row-major `[draw][param]`.
    pub values: Vec<f64>,
    pub stats: Vec<DrawStats>,
    pub step_size: f64,
    pub inv_metric: Vec<f64>,
    pub warmup_divergences: usize,
}

impl ChainDraws {
    pub fn n_draws(&self) -> usize {
        self.stats.len()
    }

    pub fn draw(&self, i: usize) -> &[f64] {
        &self.values[i * self.dim..(i + 1) * self.dim]
    }

    pub fn is_divergent(&self, i: usize) -> bool {
        self.stats[i].divergent
    }

    pub fn n_divergent(&self) -> usize {
        self.stats.iter().filter(|s| s.divergent).count()
    }

    pub fn mean_accept_stat(&self) -> f64 {
        if self.stats.is_empty() {
            return 0.0;
        }
        self.stats.iter().map(|s| s.accept_stat).sum::<f64>() / self.stats.len() as f64
    }

    pub fn trace(&self, param: usize) -> Vec<f64> {
        (0..self.n_draws()).map(|i| self.draw(i)[param]).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSummary {
    pub mean: f64,
    pub sd: f64,
    pub rhat: f64,
    pub ess: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraws {
    pub dim: usize,
    pub chains: Vec<ChainDraws>,
}

impl PosteriorDraws {
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn n_divergent(&self) -> usize {
        self.chains.iter().map(ChainDraws::n_divergent).sum()
    }

    pub fn n_draws(&self) -> usize {
        self.chains.iter().map(ChainDraws::n_draws).sum()
    }

    pub fn iter_draws(&self, skip_divergent: bool) -> impl Iterator<Item = &[f64]> + '_ {
        self.chains.iter().flat_map(move |c| {
            (0..c.n_draws())
                .filter(move |i| !(skip_divergent && c.is_divergent(*i)))
                .map(move |i| c.draw(i))
        })
    }

    /// Skips divergent draws unless every draw diverged.
    pub fn mean(&self) -> Vec<f64> {
        let skip = self.n_divergent() < self.n_draws();
        if !skip && self.n_draws() > 0 {
            log::warn!("every retained draw is divergent; reducing over all of them");
        }
        let mut sum = vec![0.0; self.dim];
        let mut n = 0usize;
        for draw in self.iter_draws(skip) {
            for (s, x) in sum.iter_mut().zip(draw) {
                *s += x;
            }
            n += 1;
        }
        if n > 0 {
            for s in &mut sum {
                *s /= n as f64;
            }
        }
        sum
    }

    pub fn sd(&self, param: usize) -> f64 {
        let skip = self.n_divergent() < self.n_draws();
        let xs: Vec<f64> = self.iter_draws(skip).map(|d| d[param]).collect();
        diagnostics::sample_sd(&xs)
    }

    pub fn traces(&self, param: usize) -> Vec<Vec<f64>> {
        self.chains.iter().map(|c| c.trace(param)).collect()
    }

    pub fn summary(&self, param: usize) -> ParamSummary {
        let traces = self.traces(param);
        let all: Vec<f64> = traces.iter().flatten().copied().collect();
        ParamSummary {
            mean: diagnostics::mean(&all),
            sd: diagnostics::sample_sd(&all),
            rhat: diagnostics::split_rhat(&traces),
            ess: diagnostics::effective_sample_size(&traces),
        }
    }

    // NaN entries are ignored.
    pub fn max_rhat(&self) -> f64 {
        (0..self.dim)
            .map(|p| diagnostics::split_rhat(&self.traces(p)))
            .filter(|r| r.is_finite())
            .fold(f64::NAN, f64::max)
    }

    pub fn min_ess(&self) -> f64 {
        (0..self.dim)
            .map(|p| diagnostics::effective_sample_size(&self.traces(p)))
            .filter(|e| e.is_finite())
            .fold(f64::NAN, f64::min)
    }
}

pub fn sample<D: LogDensity>(target: &D, cfg: &SamplerConfig) -> PosteriorDraws {
    let chains: Vec<ChainDraws> = (0..cfg.chains)
        .into_par_iter()
        .map(|chain| run_chain(target, cfg, chain))
        .collect();

    for c in &chains {
        log::info!(
            "chain {}: step_size={:.4} accept={:.3} divergent={} (warmup {})",
            c.chain,
            c.step_size,
            c.mean_accept_stat(),
            c.n_divergent(),
            c.warmup_divergences
        );
        if c.n_divergent() > 0 {
            log::warn!(
                "chain {} has {} divergent draws; they are excluded from reduction",
                c.chain,
                c.n_divergent()
            );
        }
    }

    PosteriorDraws {
        dim: target.dim(),
        chains,
    }
}

pub fn seeded_stream(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

const MAX_INIT_ATTEMPTS: usize = 100;

fn initial_state<D: LogDensity>(target: &D, cfg: &SamplerConfig, rng: &mut ChaCha8Rng) -> Point {
    let centre = target.initial_point();
    for _ in 0..MAX_INIT_ATTEMPTS {
        let theta: Vec<f64> = centre
            .iter()
            .map(|c| {
                if cfg.init_jitter > 0.0 {
                    c + rng.gen_range(-cfg.init_jitter..cfg.init_jitter)
                } else {
                    *c
                }
            })
            .collect();
        let point = Point::new(target, theta);
        if point.is_finite() {
            return point;
        }
    }
    log::warn!("no finite jittered start found; starting from the centre point");
    Point::new(target, centre)
}

fn run_chain<D: LogDensity>(target: &D, cfg: &SamplerConfig, chain: usize) -> ChainDraws {
    let mut rng = seeded_stream(cfg.seed, chain as u64);
    let dim = target.dim();
    let mut point = initial_state(target, cfg, &mut rng);
    let mut metric = Metric::unit(dim);

    let initial_step = nuts::find_reasonable_step_size(target, &point, &metric, 1.0, &mut rng);
    let mut adapter = WarmupAdapter::new(dim, cfg.warmup, cfg.target_accept, initial_step);
    let mut step_size = initial_step;
    let mut warmup_divergences = 0usize;

    for _ in 0..cfg.warmup {
        let t = nuts::transition(target, &mut point, step_size, &metric, cfg.max_tree_depth, &mut rng);
        if t.divergent {
            warmup_divergences += 1;
        }
        step_size = adapter.learn_step_size(t.accept_stat);
        if let Some(inv_metric) = adapter.learn_metric(&point.theta) {
            metric = Metric::diagonal(inv_metric);
            let restart = nuts::find_reasonable_step_size(target, &point, &metric, step_size, &mut rng);
            adapter.restart_step_size(restart);
            step_size = restart;
        }
    }
    if cfg.warmup > 0 {
        step_size = adapter.final_step_size();
    }
    log::debug!("chain {chain}: warm-up finished, step_size={step_size:.5}");

    let mut values = Vec::with_capacity(cfg.draws * dim);
    let mut stats = Vec::with_capacity(cfg.draws);
    for _ in 0..cfg.draws {
        let t = nuts::transition(target, &mut point, step_size, &metric, cfg.max_tree_depth, &mut rng);
        values.extend_from_slice(&point.theta);
        stats.push(DrawStats {
            accept_stat: t.accept_stat,
            tree_depth: t.tree_depth,
            n_leapfrog: t.n_leapfrog,
            divergent: t.divergent,
            log_density: point.log_density,
        });
    }

    ChainDraws {
        chain,
        dim,
        values,
        stats,
        step_size,
        inv_metric: metric.inv_mass,
        warmup_divergences,
    }
}
