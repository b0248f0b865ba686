use serde::{Deserialize, Serialize};

use crate::rating_model::{ModelDims, RatingParams, SupportCounts};
use crate::sampler::{ParamSummary, PosteriorDraws};

const RHAT_WARN: f64 = 1.05;

/// Sampler output tied back to the rating model's parameter layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingPosterior {
    pub dims: ModelDims,
    pub draws: PosteriorDraws,
    pub support: SupportCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSummary {
    pub name: String,
    #[serde(flatten)]
    pub summary: ParamSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerReport {
    pub chains: usize,
    pub draws_per_chain: usize,
    pub divergent: usize,
    pub max_rhat: f64,
    pub min_ess: f64,
    pub global: Vec<NamedSummary>,
    pub unsupported_skill_cells: usize,
}

impl RatingPosterior {
    pub fn new(dims: ModelDims, draws: PosteriorDraws, support: SupportCounts) -> Self {
        assert_eq!(dims.dim(), draws.dim, "posterior dimension");
        Self {
            dims,
            draws,
            support,
        }
    }

    /// Posterior mean over every chain, divergent draws excluded.
    pub fn point_estimate(&self) -> RatingParams {
        RatingParams::from_flat(self.dims, &self.draws.mean())
    }

    pub fn sd(&self, param: usize) -> f64 {
        self.draws.sd(param)
    }

    /// Spread of a skill cell. Cells no training match touched stay near the prior sd of 1.
    pub fn skill_sd(&self, year: usize, team: usize) -> f64 {
        self.sd(self.dims.skill_idx(year, team))
    }

    pub fn report(&self) -> SamplerReport {
        let global = (0..3)
            .map(|idx| NamedSummary {
                name: self.dims.param_name(idx),
                summary: self.draws.summary(idx),
            })
            .collect();
        let max_rhat = self.draws.max_rhat();
        if max_rhat > RHAT_WARN {
            log::warn!("max split R-hat {max_rhat:.3} exceeds {RHAT_WARN}; chains may not have mixed");
        }
        let unsupported = self.support.unsupported_skill_cells();
        if unsupported > 0 {
            log::warn!(
                "{unsupported} of {} skill cells have no training matches and stay at the prior",
                self.support.skill.len()
            );
        }
        SamplerReport {
            chains: self.draws.n_chains(),
            draws_per_chain: self.draws.chains.first().map_or(0, |c| c.n_draws()),
            divergent: self.draws.n_divergent(),
            max_rhat,
            min_ess: self.draws.min_ess(),
            global,
            unsupported_skill_cells: unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{ChainDraws, DrawStats};

    fn dims() -> ModelDims {
        ModelDims {
            n_teams: 1,
            n_tournaments: 1,
            n_years: 1,
        }
    }

    fn chain(chain: usize, rows: &[(f64, bool)]) -> ChainDraws {
        let dim = dims().dim();
        ChainDraws {
            chain,
            dim,
            values: rows.iter().flat_map(|(v, _)| vec![*v; dim]).collect(),
            stats: rows
                .iter()
                .map(|(_, divergent)| DrawStats {
                    accept_stat: 0.9,
                    tree_depth: 2,
                    n_leapfrog: 3,
                    divergent: *divergent,
                    log_density: -1.0,
                })
                .collect(),
            step_size: 0.5,
            inv_metric: vec![1.0; dim],
            warmup_divergences: 0,
        }
    }

    fn posterior(chains: Vec<ChainDraws>) -> RatingPosterior {
        let d = dims();
        let draws = PosteriorDraws { dim: d.dim(), chains };
        let support = SupportCounts {
            dims: d,
            skill: vec![0],
            tournament: vec![0],
        };
        RatingPosterior::new(d, draws, support)
    }

    #[test]
    fn point_estimate_skips_divergent_draws() {
        let post = posterior(vec![
            chain(0, &[(1.0, false), (100.0, true)]),
            chain(1, &[(3.0, false), (2.0, false)]),
        ]);
        let params = post.point_estimate();
        assert!((params.baseline - 2.0).abs() < 1e-12);
        assert!((params.skill(0, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn all_divergent_falls_back_to_every_draw() {
        let post = posterior(vec![chain(0, &[(1.0, true), (3.0, true)])]);
        assert!((post.point_estimate().baseline - 2.0).abs() < 1e-12);
    }

    #[test]
    fn report_keeps_chain_layout() {
        let post = posterior(vec![
            chain(0, &[(1.0, false), (2.0, false), (1.5, true), (1.2, false)]),
            chain(1, &[(1.1, false), (1.9, false), (1.4, false), (1.3, false)]),
        ]);
        let report = post.report();
        assert_eq!(report.chains, 2);
        assert_eq!(report.draws_per_chain, 4);
        assert_eq!(report.divergent, 1);
        assert_eq!(report.unsupported_skill_cells, 1);
        assert_eq!(report.global[0].name, "baseline");
        assert_eq!(report.global.len(), 3);
    }
}
