use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::match_record::MatchRecord;

// Euro 2024 kickoff
pub const DEFAULT_SPLIT_DATE: (i32, u32, u32) = (2024, 6, 14);

pub const COLD_START_FORM: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    // exclusive
    pub train_start_year: i32,
    pub year_bucket_width: i32,
    pub split_date: NaiveDate,
    pub form_window: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        let (y, m, d) = DEFAULT_SPLIT_DATE;
        Self {
            train_start_year: 2000,
            year_bucket_width: 3,
            split_date: NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default(),
            form_window: 5,
        }
    }
}

impl EncoderConfig {
    pub fn year_bucket(&self, year: i32) -> i32 {
        year.div_euclid(self.year_bucket_width.max(1))
    }
}

/// Dense zero-based encodings, built over the full filtered corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mappings {
    pub team: BTreeMap<String, usize>,
    pub tournament: BTreeMap<String, usize>,
    pub year: BTreeMap<i32, usize>,
}

impl Mappings {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a MatchRecord>,
        cfg: &EncoderConfig,
    ) -> Self {
        let mut teams = BTreeSet::new();
        let mut tournaments = BTreeSet::new();
        let mut buckets = BTreeSet::new();
        for r in records {
            teams.insert(r.home_team.as_str());
            teams.insert(r.away_team.as_str());
            tournaments.insert(r.tournament.as_str());
            buckets.insert(cfg.year_bucket(r.year()));
        }
        Self {
            team: enumerate_sorted(teams.into_iter().map(str::to_string)),
            tournament: enumerate_sorted(tournaments.into_iter().map(str::to_string)),
            year: enumerate_sorted(buckets.into_iter()),
        }
    }

    pub fn n_teams(&self) -> usize {
        self.team.len()
    }

    pub fn n_tournaments(&self) -> usize {
        self.tournament.len()
    }

    pub fn n_years(&self) -> usize {
        self.year.len()
    }

    pub fn team_name(&self, idx: usize) -> Option<&str> {
        self.team
            .iter()
            .find(|(_, i)| **i == idx)
            .map(|(name, _)| name.as_str())
    }
}

fn enumerate_sorted<K: Ord>(sorted: impl Iterator<Item = K>) -> BTreeMap<K, usize> {
    sorted.enumerate().map(|(i, k)| (k, i)).collect()
}

#[derive(Debug, Clone)]
pub struct FormWindow {
    slots: Vec<bool>,
    next: usize,
    len: usize,
}

impl FormWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![false; capacity.max(1)],
            next: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, won: bool) {
        self.slots[self.next] = won;
        self.next = (self.next + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        // The filled slots are the whole buffer once it wrapped, otherwise the prefix.
        let wins = self.slots[..self.len].iter().filter(|w| **w).count();
        Some(wins as f64 / self.len as f64)
    }
}

#[derive(Debug, Clone)]
pub struct FormState {
    windows: Vec<FormWindow>,
}

impl FormState {
    pub fn new(n_teams: usize, window: usize) -> Self {
        Self {
            windows: vec![FormWindow::new(window); n_teams],
        }
    }

    pub fn form(&self, team: usize) -> f64 {
        self.windows[team].win_rate().unwrap_or(COLD_START_FORM)
    }

    /// Draws credit neither side.
    pub fn record(&mut self, home: usize, away: usize, home_goals: u32, away_goals: u32) {
        self.windows[home].push(home_goals > away_goals);
        self.windows[away].push(away_goals > home_goals);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodedSide {
    pub teams: Vec<usize>,
    pub goals: Vec<u32>,
    pub form: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodedMatchSet {
    pub home: EncodedSide,
    pub away: EncodedSide,
    pub tournament: Vec<usize>,
    pub year: Vec<usize>,
    pub dates: Vec<NaiveDate>,
}

impl EncodedMatchSet {
    pub fn len(&self) -> usize {
        self.tournament.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tournament.is_empty()
    }

    fn push(&mut self, m: &EncodedMatch) {
        self.home.teams.push(m.home);
        self.home.goals.push(m.home_goals);
        self.home.form.push(m.home_form);
        self.away.teams.push(m.away);
        self.away.goals.push(m.away_goals);
        self.away.form.push(m.away_form);
        self.tournament.push(m.tournament);
        self.year.push(m.year);
        self.dates.push(m.date);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub train: EncodedMatchSet,
    pub test: EncodedMatchSet,
    pub mappings: Mappings,
}

#[derive(Debug, Clone, Copy)]
struct EncodedMatch {
    date: NaiveDate,
    home: usize,
    away: usize,
    home_goals: u32,
    away_goals: u32,
    home_form: f64,
    away_form: f64,
    tournament: usize,
    year: usize,
}

pub fn encode(records: &[MatchRecord], cfg: &EncoderConfig) -> Dataset {
    let mut kept: Vec<&MatchRecord> = records
        .iter()
        .filter(|r| r.year() > cfg.train_start_year)
        .collect();
    // Stable: same-day matches keep their table order.
    kept.sort_by_key(|r| r.date);

    let mappings = Mappings::from_records(kept.iter().copied(), cfg);
    let encoded = encode_with_form(&kept, &mappings, cfg);

    let mut train = EncodedMatchSet::default();
    let mut test = EncodedMatchSet::default();
    let mut on_boundary = 0usize;
    for m in &encoded {
        if m.date < cfg.split_date {
            train.push(m);
        } else if m.date > cfg.split_date {
            test.push(m);
        } else {
            on_boundary += 1;
        }
    }

    log::info!(
        "encoded {} matches ({} dropped before {}): teams={} tournaments={} year_buckets={} train={} test={} on_split_date={}",
        kept.len(),
        records.len() - kept.len(),
        cfg.train_start_year + 1,
        mappings.n_teams(),
        mappings.n_tournaments(),
        mappings.n_years(),
        train.len(),
        test.len(),
        on_boundary
    );

    Dataset {
        train,
        test,
        mappings,
    }
}

/// `records` must already be in chronological order.
fn encode_with_form(
    records: &[&MatchRecord],
    mappings: &Mappings,
    cfg: &EncoderConfig,
) -> Vec<EncodedMatch> {
    let mut form = FormState::new(mappings.n_teams(), cfg.form_window);
    let mut out = Vec::with_capacity(records.len());

    for r in records {
        // Mappings were built from these same records, so every lookup hits.
        let home = mappings.team[&r.home_team];
        let away = mappings.team[&r.away_team];
        let tournament = mappings.tournament[&r.tournament];
        let year = mappings.year[&cfg.year_bucket(r.year())];

        out.push(EncodedMatch {
            date: r.date,
            home,
            away,
            home_goals: r.home_score,
            away_goals: r.away_score,
            home_form: form.form(home),
            away_form: form.form(away),
            tournament,
            year,
        });
        form.record(home, away, r.home_score, r.away_score);
    }

    out
}
