use chrono::{Duration, NaiveDate};
use rand::Rng;
use rand_distr::{Distribution, Poisson};

use goalcast::config::PipelineConfig;
use goalcast::match_record::MatchRecord;
use goalcast::pipeline;
use goalcast::sampler::seeded_stream;
use goalcast::simulate::result_sign;

const TEAMS: [&str; 6] = ["Alba", "Borea", "Cantra", "Delmar", "Estria", "Fenwick"];
/// True log-strength per team; Alba is far ahead, Fenwick far behind.
const STRENGTH: [f64; 6] = [0.8, 0.3, 0.1, -0.1, -0.3, -0.8];

fn synthetic_league(n: usize) -> Vec<MatchRecord> {
    let mut rng = seeded_stream(77, 0);
    let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
    (0..n)
        .map(|i| {
            let home = rng.gen_range(0..TEAMS.len());
            let away = (home + rng.gen_range(1..TEAMS.len())) % TEAMS.len();
            let diff = STRENGTH[home] - STRENGTH[away];
            let h: f64 = Poisson::new((0.2 + diff).exp()).unwrap().sample(&mut rng);
            let a: f64 = Poisson::new((0.2 - diff).exp()).unwrap().sample(&mut rng);
            MatchRecord {
                date: start + Duration::days(2 * i as i64),
                home_team: TEAMS[home].to_string(),
                away_team: TEAMS[away].to_string(),
                tournament: "League".to_string(),
                home_score: h as u32,
                away_score: a as u32,
            }
        })
        .collect()
}

fn config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    // One match every two days from 2018: roughly 210 train and 50 test matches,
    // all inside one decade bucket.
    cfg.encoder.split_date = NaiveDate::from_ymd_opt(2019, 3, 1).unwrap();
    cfg.encoder.year_bucket_width = 10;
    cfg.sampler.chains = 2;
    cfg.sampler.warmup = 200;
    cfg.sampler.draws = 200;
    cfg.simulation.draws = 2000;
    cfg
}

#[test]
fn recovers_team_ordering() {
    let records = synthetic_league(260);
    let out = pipeline::run(&records, &config()).unwrap();
    let m = &out.dataset.mappings;
    let skill = |name: &str| out.params.skill(0, m.team[name]);

    assert!(skill("Alba") > skill("Cantra"));
    assert!(skill("Cantra") > skill("Fenwick"));
    assert!(skill("Alba") - skill("Fenwick") > 0.8);
    assert!(out.report.divergent < 5, "divergent={}", out.report.divergent);
    assert!(out.report.max_rhat < 1.15, "rhat={}", out.report.max_rhat);
}

#[test]
fn strong_home_side_is_predicted_to_win() {
    let out = pipeline::run(&synthetic_league(260), &config()).unwrap();
    let m = &out.dataset.mappings;
    let test = &out.dataset.test;
    assert!(!test.is_empty());

    for (i, f) in out.forecasts.iter().enumerate() {
        let p = f.prediction;
        assert_eq!(p.pred_result, result_sign(p.mean_home_goal, p.mean_away_goal));
        if test.home.teams[i] == m.team["Alba"] && test.away.teams[i] == m.team["Fenwick"] {
            assert_eq!(p.pred_result, 1);
        }
    }
}

#[test]
fn fixed_seeds_reproduce_the_whole_run() {
    let records = synthetic_league(120);
    let mut cfg = config();
    cfg.encoder.split_date = NaiveDate::from_ymd_opt(2018, 6, 1).unwrap();
    cfg.sampler.warmup = 60;
    cfg.sampler.draws = 60;
    let a = pipeline::run(&records, &cfg).unwrap();
    let b = pipeline::run(&records, &cfg).unwrap();
    assert_eq!(a.params, b.params);
    assert_eq!(a.forecasts, b.forecasts);
    assert_eq!(a.posterior.draws, b.posterior.draws);
    assert!(!a.forecasts.is_empty());

    cfg.simulation.seed += 1;
    let c = pipeline::run(&records, &cfg).unwrap();
    assert_eq!(a.params, c.params);
}
