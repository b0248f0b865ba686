use goalcast::sampler::{self, LogDensity, SamplerConfig};

/// Independent normals with the given means and standard deviations.
struct DiagonalNormal {
    mean: Vec<f64>,
    sd: Vec<f64>,
}

impl LogDensity for DiagonalNormal {
    fn dim(&self) -> usize {
        self.mean.len()
    }

    fn log_density_and_gradient(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let mut lp = 0.0;
        for i in 0..self.dim() {
            let z = (theta[i] - self.mean[i]) / self.sd[i];
            lp -= 0.5 * z * z;
            grad[i] = -z / self.sd[i];
        }
        lp
    }
}

/// `theta ~ N(0, 1)`, `y_i ~ Poisson(exp(theta))`, summarised by `n` and `sum(y)`.
struct NormalPoisson {
    n: f64,
    total: f64,
}

impl NormalPoisson {
    fn unnormalised(&self, t: f64) -> f64 {
        -0.5 * t * t + self.total * t - self.n * t.exp()
    }
}

impl LogDensity for NormalPoisson {
    fn dim(&self) -> usize {
        1
    }

    fn log_density_and_gradient(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let t = theta[0];
        grad[0] = -t + self.total - self.n * t.exp();
        self.unnormalised(t)
    }
}

/// Standard normal cut off at 1; beyond the cut the density is not finite.
struct TruncatedNormal;

impl LogDensity for TruncatedNormal {
    fn dim(&self) -> usize {
        1
    }

    fn log_density_and_gradient(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let x = theta[0];
        if x >= 1.0 {
            grad[0] = 0.0;
            return f64::NEG_INFINITY;
        }
        grad[0] = -x;
        -0.5 * x * x
    }
}

fn small_config(seed: u64) -> SamplerConfig {
    SamplerConfig {
        chains: 4,
        warmup: 500,
        draws: 1000,
        seed,
        ..SamplerConfig::default()
    }
}

#[test]
fn recovers_diagonal_normal_moments() {
    let target = DiagonalNormal {
        mean: vec![1.0, -2.0],
        sd: vec![1.0, 3.0],
    };
    let draws = sampler::sample(&target, &small_config(11));

    assert_eq!(draws.n_chains(), 4);
    assert!(draws.chains.iter().all(|c| c.n_draws() == 1000));
    assert_eq!(draws.n_divergent(), 0);

    let mean = draws.mean();
    assert!((mean[0] - 1.0).abs() < 0.15, "mean0={}", mean[0]);
    assert!((mean[1] + 2.0).abs() < 0.4, "mean1={}", mean[1]);
    assert!((draws.sd(0) - 1.0).abs() < 0.15, "sd0={}", draws.sd(0));
    assert!((draws.sd(1) - 3.0).abs() < 0.45, "sd1={}", draws.sd(1));
    assert!(draws.max_rhat() < 1.05);

    // The adapted metric should have picked up the scale difference.
    for c in &draws.chains {
        assert!(c.inv_metric[1] > 2.0 * c.inv_metric[0], "{:?}", c.inv_metric);
    }
}

#[test]
fn matches_quadrature_on_normal_poisson_posterior() {
    let target = NormalPoisson {
        n: 20.0,
        total: 30.0,
    };

    // Reference moments on a fine grid.
    let (lo, hi, steps) = (-3.0, 3.0, 60_000);
    let h = (hi - lo) / steps as f64;
    let grid: Vec<f64> = (0..=steps).map(|i| lo + i as f64 * h).collect();
    let peak = grid
        .iter()
        .map(|t| target.unnormalised(*t))
        .fold(f64::NEG_INFINITY, f64::max);
    let w: Vec<f64> = grid.iter().map(|t| (target.unnormalised(*t) - peak).exp()).collect();
    let z: f64 = w.iter().sum();
    let exact_mean: f64 = grid.iter().zip(&w).map(|(t, w)| t * w).sum::<f64>() / z;
    let exact_var: f64 = grid
        .iter()
        .zip(&w)
        .map(|(t, w)| (t - exact_mean).powi(2) * w)
        .sum::<f64>()
        / z;

    let draws = sampler::sample(&target, &small_config(5));
    let mean = draws.mean()[0];
    let sd = draws.sd(0);
    assert!((mean - exact_mean).abs() < 0.03, "mean={mean} exact={exact_mean}");
    assert!(
        (sd - exact_var.sqrt()).abs() < 0.03,
        "sd={sd} exact={}",
        exact_var.sqrt()
    );
}

#[test]
fn non_finite_region_is_flagged_and_never_entered() {
    let draws = sampler::sample(&TruncatedNormal, &small_config(3));
    assert!(draws.n_divergent() > 0);
    for c in &draws.chains {
        for i in 0..c.n_draws() {
            assert!(c.draw(i)[0] < 1.0);
            assert!(c.stats[i].log_density.is_finite());
        }
    }
    assert!(draws.mean()[0] < 0.0);
}

#[test]
fn fixed_seed_reproduces_every_chain() {
    let target = DiagonalNormal {
        mean: vec![0.0, 0.5, -0.5],
        sd: vec![1.0, 0.5, 2.0],
    };
    let cfg = SamplerConfig {
        chains: 3,
        warmup: 100,
        draws: 100,
        seed: 99,
        ..SamplerConfig::default()
    };
    let a = sampler::sample(&target, &cfg);
    let b = sampler::sample(&target, &cfg);
    assert_eq!(a, b);
    assert_ne!(a.chains[0].values, a.chains[1].values);

    let other = sampler::sample(&target, &SamplerConfig { seed: 100, ..cfg });
    assert_ne!(a.chains[0].values, other.chains[0].values);
}

#[test]
fn zero_warmup_still_samples() {
    let target = DiagonalNormal {
        mean: vec![0.0],
        sd: vec![1.0],
    };
    let cfg = SamplerConfig {
        chains: 2,
        warmup: 0,
        draws: 50,
        ..SamplerConfig::default()
    };
    let draws = sampler::sample(&target, &cfg);
    assert_eq!(draws.n_draws(), 100);
    assert!(draws.chains.iter().all(|c| c.inv_metric == [1.0]));
}
