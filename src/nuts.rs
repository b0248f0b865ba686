//! No-U-Turn Hamiltonian transition (slice variant) with a diagonal metric.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::sampler::LogDensity;

/// Energy error beyond which a trajectory is declared divergent.
pub const MAX_ENERGY_ERROR: f64 = 1000.0;

const MIN_STEP_SIZE: f64 = 1e-10;
const MAX_STEP_SIZE: f64 = 1e7;
const MAX_STEP_SEARCH: usize = 100;

/// Diagonal Euclidean metric stored as the inverse mass (posterior variance estimate).
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub inv_mass: Vec<f64>,
}

impl Metric {
    pub fn unit(dim: usize) -> Self {
        Self {
            inv_mass: vec![1.0; dim],
        }
    }

    pub fn diagonal(inv_mass: Vec<f64>) -> Self {
        Self { inv_mass }
    }

    pub fn kinetic_energy(&self, p: &[f64]) -> f64 {
        0.5 * p
            .iter()
            .zip(&self.inv_mass)
            .map(|(p, m)| m * p * p)
            .sum::<f64>()
    }

    pub fn sample_momentum<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        self.inv_mass
            .iter()
            .map(|m| {
                let z: f64 = rng.sample(StandardNormal);
                z / m.sqrt()
            })
            .collect()
    }

    fn velocity_dot(&self, d: &[f64], p: &[f64]) -> f64 {
        d.iter()
            .zip(p)
            .zip(&self.inv_mass)
            .map(|((d, p), m)| d * m * p)
            .sum()
    }
}

/// A position with its cached log density and gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub theta: Vec<f64>,
    pub grad: Vec<f64>,
    pub log_density: f64,
}

impl Point {
    pub fn new<D: LogDensity + ?Sized>(target: &D, theta: Vec<f64>) -> Self {
        let mut grad = vec![0.0; theta.len()];
        let log_density = target.log_density_and_gradient(&theta, &mut grad);
        Self {
            theta,
            grad,
            log_density,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.log_density.is_finite() && self.grad.iter().all(|g| g.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub accept_stat: f64,
    pub tree_depth: u32,
    pub n_leapfrog: u32,
    pub divergent: bool,
}

/// One leapfrog step of size `eps` (negative to integrate backwards).
pub fn leapfrog<D: LogDensity + ?Sized>(
    target: &D,
    point: &Point,
    p: &[f64],
    eps: f64,
    metric: &Metric,
) -> (Point, Vec<f64>) {
    let mut p_half: Vec<f64> = p
        .iter()
        .zip(&point.grad)
        .map(|(p, g)| p + 0.5 * eps * g)
        .collect();
    let theta: Vec<f64> = point
        .theta
        .iter()
        .zip(&p_half)
        .zip(&metric.inv_mass)
        .map(|((q, p), m)| q + eps * m * p)
        .collect();
    let next = Point::new(target, theta);
    for (p, g) in p_half.iter_mut().zip(&next.grad) {
        *p += 0.5 * eps * g;
    }
    (next, p_half)
}

fn joint(point: &Point, p: &[f64], metric: &Metric) -> f64 {
    let h = point.log_density - metric.kinetic_energy(p);
    if h.is_nan() { f64::NEG_INFINITY } else { h }
}

/// Doubles or halves `initial` until a single leapfrog step crosses an
/// acceptance probability of one half.
pub fn find_reasonable_step_size<D: LogDensity + ?Sized, R: Rng>(
    target: &D,
    point: &Point,
    metric: &Metric,
    initial: f64,
    rng: &mut R,
) -> f64 {
    let mut eps = initial.clamp(MIN_STEP_SIZE, MAX_STEP_SIZE);
    let p0 = metric.sample_momentum(rng);
    let h0 = joint(point, &p0, metric);

    let log_ratio = |eps: f64| {
        let (next, p) = leapfrog(target, point, &p0, eps, metric);
        let h = joint(&next, &p, metric);
        if h.is_finite() { h - h0 } else { f64::NEG_INFINITY }
    };

    let mut ratio = log_ratio(eps);
    let direction = if ratio > 0.5f64.ln() { 1.0 } else { -1.0 };
    for _ in 0..MAX_STEP_SEARCH {
        // Stop once the acceptance ratio crosses 1/2 in the search direction.
        if direction * ratio <= -direction * std::f64::consts::LN_2 {
            break;
        }
        let next = eps * 2f64.powf(direction);
        if !(MIN_STEP_SIZE..=MAX_STEP_SIZE).contains(&next) {
            break;
        }
        eps = next;
        ratio = log_ratio(eps);
    }
    eps
}

struct Edge {
    point: Point,
    p: Vec<f64>,
}

struct Subtree {
    minus: Edge,
    plus: Edge,
    proposal: Point,
    n_valid: f64,
    keep_going: bool,
    sum_accept: f64,
    n_steps: u32,
    divergent: bool,
}

struct TreeContext<'a, D: LogDensity + ?Sized> {
    target: &'a D,
    metric: &'a Metric,
    eps: f64,
    log_slice: f64,
    joint0: f64,
}

fn no_u_turn(minus: &Edge, plus: &Edge, metric: &Metric) -> bool {
    let span: Vec<f64> = plus
        .point
        .theta
        .iter()
        .zip(&minus.point.theta)
        .map(|(a, b)| a - b)
        .collect();
    metric.velocity_dot(&span, &minus.p) >= 0.0 && metric.velocity_dot(&span, &plus.p) >= 0.0
}

fn build_tree<D: LogDensity + ?Sized, R: Rng>(
    ctx: &TreeContext<'_, D>,
    from: &Edge,
    direction: f64,
    depth: u32,
    rng: &mut R,
) -> Subtree {
    if depth == 0 {
        let (point, p) = leapfrog(ctx.target, &from.point, &from.p, direction * ctx.eps, ctx.metric);
        let h = if point.is_finite() {
            joint(&point, &p, ctx.metric)
        } else {
            f64::NEG_INFINITY
        };
        let divergent = !(h > ctx.log_slice - MAX_ENERGY_ERROR);
        let n_valid = if ctx.log_slice <= h { 1.0 } else { 0.0 };
        let accept = if h.is_finite() {
            (h - ctx.joint0).exp().min(1.0)
        } else {
            0.0
        };
        let edge = Edge {
            point: point.clone(),
            p: p.clone(),
        };
        return Subtree {
            minus: Edge {
                point: point.clone(),
                p,
            },
            plus: edge,
            proposal: point,
            n_valid,
            keep_going: !divergent,
            sum_accept: accept,
            n_steps: 1,
            divergent,
        };
    }

    let mut first = build_tree(ctx, from, direction, depth - 1, rng);
    if !first.keep_going {
        return first;
    }

    let outer = if direction < 0.0 { &first.minus } else { &first.plus };
    let second = build_tree(ctx, outer, direction, depth - 1, rng);

    let total = first.n_valid + second.n_valid;
    if total > 0.0 && rng.r#gen::<f64>() < second.n_valid / total {
        first.proposal = second.proposal;
    }
    if direction < 0.0 {
        first.minus = second.minus;
    } else {
        first.plus = second.plus;
    }
    first.n_valid = total;
    first.sum_accept += second.sum_accept;
    first.n_steps += second.n_steps;
    first.divergent |= second.divergent;
    first.keep_going = second.keep_going && no_u_turn(&first.minus, &first.plus, ctx.metric);
    first
}

/// Advances `current` by one NUTS transition.
pub fn transition<D: LogDensity + ?Sized, R: Rng>(
    target: &D,
    current: &mut Point,
    eps: f64,
    metric: &Metric,
    max_depth: u32,
    rng: &mut R,
) -> Transition {
    let p0 = metric.sample_momentum(rng);
    let joint0 = joint(current, &p0, metric);
    // u ~ Uniform(0, exp(joint0)], kept in log space.
    let log_slice = joint0 + (1.0 - rng.r#gen::<f64>()).ln();

    let ctx = TreeContext {
        target,
        metric,
        eps,
        log_slice,
        joint0,
    };

    let mut minus = Edge {
        point: current.clone(),
        p: p0.clone(),
    };
    let mut plus = Edge {
        point: current.clone(),
        p: p0,
    };
    let mut proposal: Option<Point> = None;
    let mut n_valid = 1.0;
    let mut depth = 0u32;
    let mut sum_accept = 0.0;
    let mut n_steps = 0u32;
    let mut divergent = false;

    while depth < max_depth {
        let direction = if rng.r#gen::<bool>() { 1.0 } else { -1.0 };
        let sub = if direction < 0.0 {
            build_tree(&ctx, &minus, direction, depth, rng)
        } else {
            build_tree(&ctx, &plus, direction, depth, rng)
        };
        sum_accept += sub.sum_accept;
        n_steps += sub.n_steps;
        divergent |= sub.divergent;
        depth += 1;

        if !sub.keep_going {
            break;
        }
        if rng.r#gen::<f64>() < (sub.n_valid / n_valid).min(1.0) {
            proposal = Some(sub.proposal);
        }
        n_valid += sub.n_valid;
        if direction < 0.0 {
            minus = sub.minus;
        } else {
            plus = sub.plus;
        }
        if !no_u_turn(&minus, &plus, metric) {
            break;
        }
    }

    if let Some(next) = proposal {
        *current = next;
    }

    Transition {
        accept_stat: if n_steps > 0 {
            sum_accept / n_steps as f64
        } else {
            0.0
        },
        tree_depth: depth,
        n_leapfrog: n_steps,
        divergent,
    }
}
