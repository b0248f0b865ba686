//! Warm-up tuning: dual-averaging step size and windowed diagonal metric.

const GAMMA: f64 = 0.05;
const T0: f64 = 10.0;
const KAPPA: f64 = 0.75;

const INIT_BUFFER: usize = 75;
const TERM_BUFFER: usize = 50;
const BASE_WINDOW: usize = 25;
/// Below this many warm-up iterations only the step size is tuned.
const MIN_METRIC_WARMUP: usize = 20;

#[derive(Debug, Clone)]
pub struct DualAveraging {
    target_accept: f64,
    mu: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    counter: f64,
}

impl DualAveraging {
    pub fn new(target_accept: f64, initial_step: f64) -> Self {
        let mut da = Self {
            target_accept,
            mu: 0.0,
            log_eps: 0.0,
            log_eps_bar: 0.0,
            h_bar: 0.0,
            counter: 0.0,
        };
        da.restart(initial_step);
        da
    }

    pub fn restart(&mut self, step: f64) {
        self.mu = (10.0 * step).ln();
        self.log_eps = step.ln();
        self.log_eps_bar = 0.0;
        self.h_bar = 0.0;
        self.counter = 0.0;
    }

    /// Feeds one acceptance statistic and returns the next step size to try.
    pub fn update(&mut self, accept_stat: f64) -> f64 {
        let accept = if accept_stat.is_finite() {
            accept_stat.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.counter += 1.0;
        let eta = 1.0 / (self.counter + T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.target_accept - accept);
        self.log_eps = self.mu - self.counter.sqrt() / GAMMA * self.h_bar;
        let w = self.counter.powf(-KAPPA);
        self.log_eps_bar = w * self.log_eps + (1.0 - w) * self.log_eps_bar;
        self.log_eps.exp()
    }

    pub fn current(&self) -> f64 {
        self.log_eps.exp()
    }

    pub fn averaged(&self) -> f64 {
        if self.counter > 0.0 {
            self.log_eps_bar.exp()
        } else {
            self.current()
        }
    }
}

/// Per-coordinate running mean and variance.
#[derive(Debug, Clone)]
pub struct Welford {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl Welford {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    pub fn add(&mut self, x: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for ((mean, m2), x) in self.mean.iter_mut().zip(&mut self.m2).zip(x) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn variance(&self) -> Vec<f64> {
        if self.n < 2 {
            return vec![1.0; self.mean.len()];
        }
        let denom = (self.n - 1) as f64;
        self.m2.iter().map(|m2| m2 / denom).collect()
    }

    pub fn reset(&mut self) {
        self.n = 0;
        self.mean.iter_mut().for_each(|m| *m = 0.0);
        self.m2.iter_mut().for_each(|m| *m = 0.0);
    }
}

/// Slow-window schedule: a fast initial buffer, doubling metric windows, then a
/// terminal buffer where only the step size moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSchedule {
    warmup: usize,
    init_buffer: usize,
    term_buffer: usize,
    window_size: usize,
    next_window_end: usize,
    adapt_metric: bool,
}

impl WindowSchedule {
    pub fn new(warmup: usize) -> Self {
        let (mut init_buffer, mut term_buffer, mut base_window) = (INIT_BUFFER, TERM_BUFFER, BASE_WINDOW);
        let adapt_metric = warmup >= MIN_METRIC_WARMUP;
        if adapt_metric && init_buffer + base_window + term_buffer > warmup {
            init_buffer = (0.15 * warmup as f64) as usize;
            term_buffer = (0.1 * warmup as f64) as usize;
            base_window = warmup - (init_buffer + term_buffer);
        }
        Self {
            warmup,
            init_buffer,
            term_buffer,
            window_size: base_window,
            next_window_end: init_buffer + base_window - 1,
            adapt_metric,
        }
    }

    pub fn in_window(&self, iteration: usize) -> bool {
        self.adapt_metric
            && iteration >= self.init_buffer
            && iteration + self.term_buffer < self.warmup
    }

    pub fn is_window_end(&self, iteration: usize) -> bool {
        self.adapt_metric && iteration == self.next_window_end && iteration < self.warmup
    }

    fn last_window_end(&self) -> usize {
        self.warmup - self.term_buffer - 1
    }

    /// Moves to the next (doubled) window; the last window stretches to the terminal buffer.
    pub fn advance(&mut self, iteration: usize) {
        if self.next_window_end == self.last_window_end() {
            return;
        }
        self.window_size *= 2;
        self.next_window_end = iteration + self.window_size;
        if self.next_window_end + 2 * self.window_size >= self.warmup - self.term_buffer {
            self.next_window_end = self.last_window_end();
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarmupAdapter {
    step: DualAveraging,
    schedule: WindowSchedule,
    estimator: Welford,
    iteration: usize,
}

impl WarmupAdapter {
    pub fn new(dim: usize, warmup: usize, target_accept: f64, initial_step: f64) -> Self {
        Self {
            step: DualAveraging::new(target_accept, initial_step),
            schedule: WindowSchedule::new(warmup),
            estimator: Welford::new(dim),
            iteration: 0,
        }
    }

    pub fn learn_step_size(&mut self, accept_stat: f64) -> f64 {
        self.step.update(accept_stat)
    }

    /// Records the post-transition position. Returns a new inverse metric at
    /// the end of each slow window.
    pub fn learn_metric(&mut self, theta: &[f64]) -> Option<Vec<f64>> {
        let i = self.iteration;
        self.iteration += 1;

        if self.schedule.in_window(i) {
            self.estimator.add(theta);
        }
        if !self.schedule.is_window_end(i) {
            return None;
        }

        self.schedule.advance(i);
        let n = self.estimator.count() as f64;
        // Shrink towards a small unit-scale metric when the window is short.
        let var = self
            .estimator
            .variance()
            .into_iter()
            .map(|v| (n / (n + 5.0)) * v + 1e-3 * (5.0 / (n + 5.0)))
            .collect();
        self.estimator.reset();
        Some(var)
    }

    pub fn restart_step_size(&mut self, step: f64) {
        self.step.restart(step);
    }

    pub fn final_step_size(&self) -> f64 {
        self.step.averaged()
    }
}
