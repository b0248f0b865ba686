use serde::{Deserialize, Serialize};

use crate::features::{EncodedMatchSet, Mappings};
use crate::sampler::LogDensity;

const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPrior {
    pub mean: f64,
    pub sd: f64,
}

impl NormalPrior {
    pub const fn new(mean: f64, sd: f64) -> Self {
        Self { mean, sd }
    }

    pub fn log_density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.sd;
        -0.5 * z * z - self.sd.ln() - HALF_LN_2PI
    }

    pub fn grad(&self, x: f64) -> f64 {
        -(x - self.mean) / (self.sd * self.sd)
    }
}

pub const BASELINE_PRIOR: NormalPrior = NormalPrior::new(0.0, 1.0);
pub const FORM_PRIOR: NormalPrior = NormalPrior::new(0.2, 0.5);
pub const TOURNAMENT_PRIOR: NormalPrior = NormalPrior::new(0.0, 0.5);
pub const SKILL_PRIOR: NormalPrior = NormalPrior::new(0.0, 1.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDims {
    pub n_teams: usize,
    pub n_tournaments: usize,
    pub n_years: usize,
}

impl ModelDims {
    pub fn from_mappings(mappings: &Mappings) -> Self {
        Self {
            n_teams: mappings.n_teams(),
            n_tournaments: mappings.n_tournaments(),
            n_years: mappings.n_years(),
        }
    }

    pub fn dim(&self) -> usize {
        3 + self.n_tournaments + self.n_years * self.n_teams
    }

    pub const fn baseline_idx(&self) -> usize {
        0
    }

    pub const fn form_idx(&self, side: usize) -> usize {
        1 + side
    }

    pub fn tournament_idx(&self, k: usize) -> usize {
        3 + k
    }

    pub fn skill_idx(&self, year: usize, team: usize) -> usize {
        3 + self.n_tournaments + year * self.n_teams + team
    }

    pub fn param_name(&self, idx: usize) -> String {
        let skill_start = 3 + self.n_tournaments;
        match idx {
            0 => "baseline".to_string(),
            1 | 2 => format!("form[{}]", idx - 1),
            i if i < skill_start => format!("tournament_eff[{}]", i - 3),
            i => {
                let off = i - skill_start;
                format!("skill[{},{}]", off / self.n_teams.max(1), off % self.n_teams.max(1))
            }
        }
    }

    pub fn prior(&self, idx: usize) -> NormalPrior {
        match idx {
            0 => BASELINE_PRIOR,
            1 | 2 => FORM_PRIOR,
            i if i < 3 + self.n_tournaments => TOURNAMENT_PRIOR,
            _ => SKILL_PRIOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingParams {
    pub dims: ModelDims,
    pub baseline: f64,
    pub form_coeff: [f64; 2],
    pub tournament_eff: Vec<f64>,
    /// Row-major `[year][team]`.
    pub skill: Vec<f64>,
}

impl RatingParams {
    pub fn prior_means(dims: ModelDims) -> Self {
        Self {
            dims,
            baseline: BASELINE_PRIOR.mean,
            form_coeff: [FORM_PRIOR.mean; 2],
            tournament_eff: vec![TOURNAMENT_PRIOR.mean; dims.n_tournaments],
            skill: vec![SKILL_PRIOR.mean; dims.n_years * dims.n_teams],
        }
    }

    /// Layout: `[baseline, form_home, form_away, tournament_eff[K], skill[Y][T]]`.
    pub fn from_flat(dims: ModelDims, flat: &[f64]) -> Self {
        assert_eq!(flat.len(), dims.dim(), "parameter vector length");
        let skill_start = 3 + dims.n_tournaments;
        Self {
            dims,
            baseline: flat[0],
            form_coeff: [flat[1], flat[2]],
            tournament_eff: flat[3..skill_start].to_vec(),
            skill: flat[skill_start..].to_vec(),
        }
    }

    pub fn to_flat(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.dims.dim());
        out.push(self.baseline);
        out.extend_from_slice(&self.form_coeff);
        out.extend_from_slice(&self.tournament_eff);
        out.extend_from_slice(&self.skill);
        out
    }

    pub fn skill(&self, year: usize, team: usize) -> f64 {
        self.skill[year * self.dims.n_teams + team]
    }

    pub fn rates(&self, m: MatchFeatures) -> MatchRates {
        let form_effect = form_effect(self.form_coeff, m.home_form, m.away_form);
        let skill_diff = self.skill(m.year, m.home) - self.skill(m.year, m.away);
        MatchRates::from_log(log_rates(
            self.baseline,
            self.tournament_eff[m.tournament],
            form_effect,
            skill_diff,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchFeatures {
    pub home: usize,
    pub away: usize,
    pub tournament: usize,
    pub year: usize,
    pub home_form: f64,
    pub away_form: f64,
}

impl MatchFeatures {
    pub fn from_set(set: &EncodedMatchSet, i: usize) -> Self {
        Self {
            home: set.home.teams[i],
            away: set.away.teams[i],
            tournament: set.tournament[i],
            year: set.year[i],
            home_form: set.home.form[i],
            away_form: set.away.form[i],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchRates {
    pub home: f64,
    pub away: f64,
}

impl MatchRates {
    pub fn from_log((log_home, log_away): (f64, f64)) -> Self {
        Self {
            home: log_home.exp(),
            away: log_away.exp(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.home.is_finite() && self.away.is_finite()
    }
}

pub fn form_effect(form_coeff: [f64; 2], home_form: f64, away_form: f64) -> f64 {
    form_coeff[0] * home_form - form_coeff[1] * away_form
}

/// Negating `form_effect` and `skill_diff` swaps the two rates bit for bit.
pub fn log_rates(baseline: f64, tournament_eff: f64, form_effect: f64, skill_diff: f64) -> (f64, f64) {
    let shared = baseline + tournament_eff;
    let edge = form_effect + skill_diff;
    (shared + edge, shared - edge)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportCounts {
    pub dims: ModelDims,
    pub skill: Vec<usize>,
    pub tournament: Vec<usize>,
}

impl SupportCounts {
    pub fn from_matches(dims: ModelDims, data: &EncodedMatchSet) -> Self {
        let mut skill = vec![0usize; dims.n_years * dims.n_teams];
        let mut tournament = vec![0usize; dims.n_tournaments];
        for i in 0..data.len() {
            let y = data.year[i];
            skill[y * dims.n_teams + data.home.teams[i]] += 1;
            skill[y * dims.n_teams + data.away.teams[i]] += 1;
            tournament[data.tournament[i]] += 1;
        }
        Self {
            dims,
            skill,
            tournament,
        }
    }

    pub fn skill_support(&self, year: usize, team: usize) -> usize {
        self.skill[year * self.dims.n_teams + team]
    }

    pub fn tournament_support(&self, k: usize) -> usize {
        self.tournament[k]
    }

    /// True when any parameter the match depends on never met a likelihood term.
    pub fn is_low_confidence(&self, m: MatchFeatures) -> bool {
        self.skill_support(m.year, m.home) == 0
            || self.skill_support(m.year, m.away) == 0
            || self.tournament_support(m.tournament) == 0
    }

    pub fn unsupported_skill_cells(&self) -> usize {
        self.skill.iter().filter(|c| **c == 0).count()
    }
}

/// Posterior target: priors plus the Poisson likelihood of the training goals.
#[derive(Debug, Clone)]
pub struct RatingModel<'a> {
    dims: ModelDims,
    data: &'a EncodedMatchSet,
    log_factorials: f64,
}

impl<'a> RatingModel<'a> {
    pub fn new(dims: ModelDims, data: &'a EncodedMatchSet) -> Self {
        let log_factorials = data
            .home
            .goals
            .iter()
            .chain(&data.away.goals)
            .map(|g| ln_factorial(*g))
            .sum();
        Self {
            dims,
            data,
            log_factorials,
        }
    }

    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    fn log_prior(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let mut lp = 0.0;
        for (idx, (x, g)) in theta.iter().zip(grad.iter_mut()).enumerate() {
            let prior = self.dims.prior(idx);
            lp += prior.log_density(*x);
            *g = prior.grad(*x);
        }
        lp
    }
}

impl LogDensity for RatingModel<'_> {
    fn dim(&self) -> usize {
        self.dims.dim()
    }

    fn initial_point(&self) -> Vec<f64> {
        RatingParams::prior_means(self.dims).to_flat()
    }

    fn log_density_and_gradient(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let mut lp = self.log_prior(theta, grad);

        let d = &self.dims;
        let baseline = theta[d.baseline_idx()];
        let coeff = [theta[d.form_idx(0)], theta[d.form_idx(1)]];
        let data = self.data;

        for i in 0..data.len() {
            let m = MatchFeatures::from_set(data, i);
            let h_idx = d.skill_idx(m.year, m.home);
            let a_idx = d.skill_idx(m.year, m.away);
            let t_idx = d.tournament_idx(m.tournament);

            let (eta_h, eta_a) = log_rates(
                baseline,
                theta[t_idx],
                form_effect(coeff, m.home_form, m.away_form),
                theta[h_idx] - theta[a_idx],
            );
            let lam_h = eta_h.exp();
            let lam_a = eta_a.exp();
            let y_h = data.home.goals[i] as f64;
            let y_a = data.away.goals[i] as f64;

            lp += y_h * eta_h - lam_h + y_a * eta_a - lam_a;

            // d/d eta of each Poisson log-likelihood term.
            let r_h = y_h - lam_h;
            let r_a = y_a - lam_a;
            let common = r_h + r_a;
            let edge = r_h - r_a;

            grad[d.baseline_idx()] += common;
            grad[t_idx] += common;
            grad[d.form_idx(0)] += edge * m.home_form;
            grad[d.form_idx(1)] -= edge * m.away_form;
            grad[h_idx] += edge;
            grad[a_idx] -= edge;
        }

        lp - self.log_factorials
    }
}

fn ln_factorial(n: u32) -> f64 {
    (2..=n).map(|k| (k as f64).ln()).sum()
}
