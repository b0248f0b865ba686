use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::{Duration, NaiveDate};
use rand::Rng;
use rand_distr::{Distribution, Poisson};

use goalcast::features::{self, EncoderConfig};
use goalcast::match_record::MatchRecord;
use goalcast::rating_model::{ModelDims, RatingModel, RatingParams};
use goalcast::sampler::{LogDensity, seeded_stream};
use goalcast::simulate::{PredictiveSimulator, SimulationConfig};

const TEAMS: usize = 40;

/// Round-robin style fixture list from 2001 onwards with Poisson scores.
fn synthetic_records(n: usize) -> Vec<MatchRecord> {
    let mut rng = seeded_stream(2024, 0);
    let start = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
    let strength: Vec<f64> = (0..TEAMS).map(|_| rng.gen_range(-0.5..0.5)).collect();
    (0..n)
        .map(|i| {
            let home = rng.gen_range(0..TEAMS);
            let away = (home + rng.gen_range(1..TEAMS)) % TEAMS;
            let diff = strength[home] - strength[away];
            let h: f64 = Poisson::new((0.3 + diff).exp()).unwrap().sample(&mut rng);
            let a: f64 = Poisson::new((0.3 - diff).exp()).unwrap().sample(&mut rng);
            MatchRecord {
                date: start + Duration::days((i / 4) as i64),
                home_team: format!("Team {home:02}"),
                away_team: format!("Team {away:02}"),
                tournament: if i % 3 == 0 { "Friendly" } else { "Qualifier" }.to_string(),
                home_score: h as u32,
                away_score: a as u32,
            }
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let records = synthetic_records(20_000);
    let cfg = EncoderConfig::default();
    c.bench_function("encode_20k", |b| {
        b.iter(|| {
            let ds = features::encode(black_box(&records), &cfg);
            black_box(ds.train.len());
        })
    });
}

fn bench_gradient(c: &mut Criterion) {
    let records = synthetic_records(20_000);
    let ds = features::encode(&records, &EncoderConfig::default());
    let dims = ModelDims::from_mappings(&ds.mappings);
    let model = RatingModel::new(dims, &ds.train);
    let theta = model.initial_point();
    let mut grad = vec![0.0; model.dim()];
    c.bench_function("log_density_gradient_20k", |b| {
        b.iter(|| {
            let lp = model.log_density_and_gradient(black_box(&theta), &mut grad);
            black_box(lp);
        })
    });
}

fn bench_simulate(c: &mut Criterion) {
    let records = synthetic_records(20_000);
    let cfg = EncoderConfig {
        split_date: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
        ..EncoderConfig::default()
    };
    let ds = features::encode(&records, &cfg);
    let dims = ModelDims::from_mappings(&ds.mappings);
    let simulator =
        PredictiveSimulator::new(RatingParams::prior_means(dims), SimulationConfig::default());
    c.bench_function("simulate_test_set", |b| {
        b.iter(|| {
            let forecasts = simulator.predict(black_box(&ds.test)).unwrap();
            black_box(forecasts.len());
        })
    });
}

criterion_group!(benches, bench_encode, bench_gradient, bench_simulate);
criterion_main!(benches);
