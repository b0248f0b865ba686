//! Convergence checks over per-chain traces.

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn sample_variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

pub fn sample_sd(xs: &[f64]) -> f64 {
    sample_variance(xs).sqrt()
}

/// Halves every chain (dropping the middle draw of odd lengths) so that
/// within-chain drift shows up as between-chain disagreement.
fn split_chains(chains: &[Vec<f64>]) -> Vec<&[f64]> {
    let mut out = Vec::with_capacity(chains.len() * 2);
    for c in chains {
        let half = c.len() / 2;
        out.push(&c[..half]);
        out.push(&c[c.len() - half..]);
    }
    out
}

/// Split potential scale reduction. 1.0 means the chains agree; NaN when
/// there are not enough draws to tell.
pub fn split_rhat(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let n = split.iter().map(|c| c.len()).min().unwrap_or(0);
    if split.len() < 2 || n < 2 {
        return f64::NAN;
    }

    let means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let w = mean(&split.iter().map(|c| sample_variance(c)).collect::<Vec<_>>());
    let b_over_n = sample_variance(&means);
    if w <= 0.0 {
        // Constant chains: identical constants agree, different ones never will.
        return if b_over_n <= 0.0 { 1.0 } else { f64::INFINITY };
    }
    let n = n as f64;
    let var_plus = (n - 1.0) / n * w + b_over_n;
    (var_plus / w).sqrt()
}

fn autocovariance(xs: &[f64], m: f64, lag: usize) -> f64 {
    let n = xs.len();
    if lag >= n {
        return 0.0;
    }
    xs[..n - lag]
        .iter()
        .zip(&xs[lag..])
        .map(|(a, b)| (a - m) * (b - m))
        .sum::<f64>()
        / n as f64
}

/// Effective sample size over split chains using Geyer's initial monotone
/// sequence of paired autocorrelations.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let n = split.iter().map(|c| c.len()).min().unwrap_or(0);
    let m = split.len();
    if m == 0 || n < 4 {
        return f64::NAN;
    }
    let split: Vec<&[f64]> = split.into_iter().map(|c| &c[..n]).collect();
    let total = (m * n) as f64;

    let means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let mean_var = mean(&split.iter().map(|c| sample_variance(c)).collect::<Vec<_>>());
    let nf = n as f64;
    let var_plus = mean_var * (nf - 1.0) / nf
        + if m > 1 {
            sample_variance(&means)
        } else {
            0.0
        };
    if !(var_plus > 0.0) {
        return total;
    }

    let rho = |lag: usize| {
        let acov = split
            .iter()
            .zip(&means)
            .map(|(c, mu)| autocovariance(c, *mu, lag))
            .sum::<f64>()
            / m as f64;
        1.0 - (mean_var - acov) / var_plus
    };

    let mut tau = -1.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0usize;
    while lag + 1 < n {
        let even = if lag == 0 { 1.0 } else { rho(lag) };
        let pair = even + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        tau += 2.0 * pair;
        prev_pair = pair;
        lag += 2;
    }

    // Antithetic chains can push tau below one; cap as Stan does.
    let tau = tau.max(1.0 / total.log10().max(1.0));
    total / tau
}
