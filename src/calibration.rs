use serde::{Deserialize, Serialize};

use crate::features::EncodedMatchSet;
use crate::simulate::Forecast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn sign(self) -> i8 {
        match self {
            Outcome::Home => 1,
            Outcome::Draw => 0,
            Outcome::Away => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    /// Share of matches whose most probable outcome happened.
    pub favourite_accuracy: f64,
    pub result_accuracy: f64,
    pub mae_home_goals: f64,
    pub mae_away_goals: f64,
    pub exact_score_rate: f64,
    pub low_confidence: usize,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn of(self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Ties resolve towards the home side, then the draw.
    pub fn favourite(self) -> Outcome {
        OUTCOMES
            .into_iter()
            .fold(Outcome::Home, |best, o| if self.of(o) > self.of(best) { o } else { best })
    }
}

pub const OUTCOMES: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

pub fn classify_outcome(home_goals: u32, away_goals: u32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// Home/draw/away probabilities of two independent Poisson scores, truncated at `max_goals`.
pub fn outcome_probs_poisson(lambda_home: f64, lambda_away: f64, max_goals: u32) -> Prob3 {
    let pmf_h = poisson_pmf(lambda_home, max_goals);
    let pmf_a = poisson_pmf(lambda_away, max_goals);

    let mut p_home = 0.0;
    let mut p_draw = 0.0;
    let mut p_away = 0.0;
    for (i, p_i) in pmf_h.iter().enumerate() {
        for (j, p_j) in pmf_a.iter().enumerate() {
            let p = p_i * p_j;
            if i > j {
                p_home += p;
            } else if i < j {
                p_away += p;
            } else {
                p_draw += p;
            }
        }
    }

    let sum = p_home + p_draw + p_away;
    if sum > 0.0 && sum.is_finite() {
        Prob3 {
            home: p_home / sum,
            draw: p_draw / sum,
            away: p_away / sum,
        }
    } else {
        Prob3::uniform()
    }
}

/// PMF over `0..=max_k`; the tail mass is folded into the last bucket.
pub fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let mut out = vec![0.0; max_k + 1];
    let lambda = lambda.max(0.0);

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}

/// Scores `forecasts` against the realised goals of `actual` (same row order).
pub fn evaluate_forecasts(forecasts: &[Forecast], actual: &EncodedMatchSet) -> ForecastReport {
    let n = forecasts.len().min(actual.len());
    if n == 0 {
        return ForecastReport::default();
    }

    let mut report = ForecastReport {
        samples: n,
        ..ForecastReport::default()
    };
    let (mut favourite_hits, mut sign_hits, mut exact) = (0usize, 0usize, 0usize);
    for (i, f) in forecasts[..n].iter().enumerate() {
        let (home_goals, away_goals) = (actual.home.goals[i], actual.away.goals[i]);
        let outcome = classify_outcome(home_goals, away_goals);

        report.brier += OUTCOMES
            .iter()
            .map(|o| {
                let hit = if *o == outcome { 1.0 } else { 0.0 };
                (f.probs.of(*o) - hit).powi(2)
            })
            .sum::<f64>();
        report.log_loss -= f.probs.of(outcome).clamp(1e-12, 1.0).ln();
        favourite_hits += usize::from(f.probs.favourite() == outcome);

        let row = &f.prediction;
        sign_hits += usize::from(row.pred_result == outcome.sign());
        exact += usize::from(row.mode_home_goal == home_goals && row.mode_away_goal == away_goals);
        report.mae_home_goals += (row.mean_home_goal - home_goals as f64).abs();
        report.mae_away_goals += (row.mean_away_goal - away_goals as f64).abs();
        report.low_confidence += usize::from(f.low_confidence);
    }

    let nf = n as f64;
    report.brier /= nf;
    report.log_loss /= nf;
    report.mae_home_goals /= nf;
    report.mae_away_goals /= nf;
    report.favourite_accuracy = favourite_hits as f64 / nf;
    report.result_accuracy = sign_hits as f64 / nf;
    report.exact_score_rate = exact as f64 / nf;
    report
}

/// Reliability table for one outcome: forecasts grouped by the probability they gave it.
pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let width = 1.0 / bins as f64;
    let mut table: Vec<CalibrationBin> = (0..bins)
        .map(|i| CalibrationBin {
            bucket_start: i as f64 * width,
            bucket_end: (i + 1) as f64 * width,
            count: 0,
            avg_pred: 0.0,
            actual_rate: 0.0,
        })
        .collect();

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let prob = p.of(class).clamp(0.0, 1.0);
        let bin = &mut table[((prob * bins as f64) as usize).min(bins - 1)];
        bin.count += 1;
        bin.avg_pred += prob;
        if *outcome == class {
            bin.actual_rate += 1.0;
        }
    }
    for bin in table.iter_mut().filter(|b| b.count > 0) {
        bin.avg_pred /= bin.count as f64;
        bin.actual_rate /= bin.count as f64;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{Prediction, result_sign};

    fn forecast(probs: Prob3, mean: (f64, f64), mode: (u32, u32)) -> Forecast {
        Forecast {
            prediction: Prediction {
                mean_home_goal: mean.0,
                mean_away_goal: mean.1,
                mode_home_goal: mode.0,
                mode_away_goal: mode.1,
                pred_result: result_sign(mean.0, mean.1),
            },
            lambda_home: mean.0,
            lambda_away: mean.1,
            probs,
            low_confidence: false,
        }
    }

    fn actual(scores: &[(u32, u32)]) -> EncodedMatchSet {
        let mut set = EncodedMatchSet::default();
        for (h, a) in scores {
            set.home.goals.push(*h);
            set.away.goals.push(*a);
            set.tournament.push(0);
        }
        set
    }

    #[test]
    fn certain_and_correct_forecasts_score_perfectly() {
        let certain = |o: Outcome| Prob3 {
            home: if o == Outcome::Home { 1.0 } else { 0.0 },
            draw: if o == Outcome::Draw { 1.0 } else { 0.0 },
            away: if o == Outcome::Away { 1.0 } else { 0.0 },
        };
        let forecasts = vec![
            forecast(certain(Outcome::Home), (2.0, 0.0), (2, 0)),
            forecast(certain(Outcome::Draw), (1.0, 1.0), (1, 1)),
            forecast(certain(Outcome::Away), (0.0, 3.0), (0, 3)),
        ];
        let r = evaluate_forecasts(&forecasts, &actual(&[(2, 0), (1, 1), (0, 3)]));
        assert_eq!(r.samples, 3);
        assert!(r.brier < 1e-12);
        assert!(r.log_loss < 1e-9);
        assert_eq!(r.favourite_accuracy, 1.0);
        assert_eq!(r.result_accuracy, 1.0);
        assert_eq!(r.exact_score_rate, 1.0);
        assert_eq!(r.mae_home_goals, 0.0);
    }

    #[test]
    fn uniform_forecast_scores_like_a_coin() {
        let forecasts = vec![forecast(Prob3::uniform(), (1.2, 1.0), (1, 1)); 2];
        let r = evaluate_forecasts(&forecasts, &actual(&[(0, 1), (3, 1)]));
        assert!((r.brier - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.log_loss - 3f64.ln()).abs() < 1e-12);
        assert_eq!(r.favourite_accuracy, 0.5);
        assert_eq!(r.result_accuracy, 0.5);
        assert_eq!(r.exact_score_rate, 0.0);
        assert!((r.mae_home_goals - 1.5).abs() < 1e-12);
        assert!((r.mae_away_goals - 0.0).abs() < 1e-12);
    }

    #[test]
    fn empty_forecasts_give_an_empty_report() {
        assert_eq!(
            evaluate_forecasts(&[], &actual(&[(1, 0)])),
            ForecastReport::default()
        );
    }

    #[test]
    fn favourite_prefers_home_then_draw_on_ties() {
        assert_eq!(Prob3::uniform().favourite(), Outcome::Home);
        let p = Prob3 {
            home: 0.2,
            draw: 0.4,
            away: 0.4,
        };
        assert_eq!(p.favourite(), Outcome::Draw);
    }

    #[test]
    fn equal_rates_give_symmetric_outcome_probs() {
        let p = outcome_probs_poisson(1.3, 1.3, 10);
        assert!((p.home - p.away).abs() < 1e-12);
        assert!((p.home + p.draw + p.away - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stronger_home_rate_favours_home() {
        let p = outcome_probs_poisson(2.4, 0.7, 10);
        assert!(p.home > 0.6);
        assert!(p.away < 0.15);
    }

    #[test]
    fn pmf_sums_to_one_with_tail_folded() {
        let pmf = poisson_pmf(3.0, 4);
        let sum: f64 = pmf.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(pmf[4] > pmf[3]);
    }

    #[test]
    fn calibration_bins_cover_unit_interval() {
        let preds = vec![Prob3::uniform(); 4];
        let outcomes = vec![Outcome::Home, Outcome::Away, Outcome::Draw, Outcome::Home];
        let bins = calibration_bins(&preds, &outcomes, Outcome::Home, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins[1].count, 4);
        assert!((bins[1].actual_rate - 0.5).abs() < 1e-12);
    }
}
