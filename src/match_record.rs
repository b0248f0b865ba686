use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("row {row}: unparseable date {value:?}")]
    InvalidDate { row: usize, value: String },
    #[error("row {row}: year is not an integer ({value:?})")]
    InvalidYear { row: usize, value: String },
    #[error("row {row}: {field} is not a non-negative integer ({value:?})")]
    InvalidScore {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {row}: {field} is empty")]
    EmptyField { row: usize, field: &'static str },
    #[error("row {row}: year column {year} disagrees with date {date}")]
    YearMismatch {
        row: usize,
        year: i32,
        date: NaiveDate,
    },
}

/// One row as it comes off the table, before any validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMatchRow {
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: String,
    pub away_score: String,
    pub tournament: String,
    #[serde(default)]
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub tournament: String,
    pub home_score: u32,
    pub away_score: u32,
}

impl MatchRecord {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// +1 home win, 0 draw, -1 away win.
    pub fn result_sign(&self) -> i8 {
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
        }
    }
}

impl RawMatchRow {
    /// Validates the row. `row` is only used to point at the offending record.
    pub fn parse(&self, row: usize) -> Result<MatchRecord, RecordError> {
        let date = parse_date(row, &self.date)?;

        if let Some(raw_year) = self.year.as_deref().map(str::trim)
            && !raw_year.is_empty()
        {
            let year = raw_year
                .parse::<i32>()
                .map_err(|_| RecordError::InvalidYear {
                    row,
                    value: raw_year.to_string(),
                })?;
            if year != date.year() {
                return Err(RecordError::YearMismatch { row, year, date });
            }
        }

        Ok(MatchRecord {
            date,
            home_team: non_empty(row, "home_team", &self.home_team)?,
            away_team: non_empty(row, "away_team", &self.away_team)?,
            tournament: non_empty(row, "tournament", &self.tournament)?,
            home_score: parse_score(row, "home_score", &self.home_score)?,
            away_score: parse_score(row, "away_score", &self.away_score)?,
        })
    }
}

pub fn parse_rows(rows: &[RawMatchRow]) -> Result<Vec<MatchRecord>, RecordError> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| row.parse(idx))
        .collect()
}

fn parse_date(row: usize, raw: &str) -> Result<NaiveDate, RecordError> {
    let s = raw.trim();
    // Some exports carry a time part; only the calendar date matters.
    let day = s.split(['T', ' ']).next().unwrap_or(s);
    NaiveDate::parse_from_str(day, DATE_FORMAT).map_err(|_| RecordError::InvalidDate {
        row,
        value: raw.to_string(),
    })
}

fn parse_score(row: usize, field: &'static str, raw: &str) -> Result<u32, RecordError> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<u32>() {
        return Ok(v);
    }
    // pandas writes integer columns with NaNs as floats ("2.0").
    if let Some(int_part) = s.strip_suffix(".0")
        && let Ok(v) = int_part.parse::<u32>()
    {
        return Ok(v);
    }
    Err(RecordError::InvalidScore {
        row,
        field,
        value: raw.to_string(),
    })
}

fn non_empty(row: usize, field: &'static str, raw: &str) -> Result<String, RecordError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(RecordError::EmptyField { row, field });
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, home: &str, away: &str) -> RawMatchRow {
        RawMatchRow {
            date: date.to_string(),
            home_team: "Spain".to_string(),
            away_team: "Italy".to_string(),
            home_score: home.to_string(),
            away_score: away.to_string(),
            tournament: "Friendly".to_string(),
            year: None,
        }
    }

    #[test]
    fn parses_valid_row() {
        let rec = row("2021-06-11", "3", "0").parse(0).unwrap();
        assert_eq!(rec.year(), 2021);
        assert_eq!(rec.home_score, 3);
        assert_eq!(rec.result_sign(), 1);
    }

    #[test]
    fn accepts_float_formatted_scores_and_timestamps() {
        let rec = row("2021-06-11T18:00:00", "2.0", "2").parse(0).unwrap();
        assert_eq!(rec.home_score, 2);
        assert_eq!(rec.result_sign(), 0);
    }

    #[test]
    fn rejects_bad_date_with_row_index() {
        let err = row("11/06/2021", "1", "0").parse(7).unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidDate {
                row: 7,
                value: "11/06/2021".to_string()
            }
        );
    }

    #[test]
    fn rejects_negative_or_fractional_scores() {
        assert!(matches!(
            row("2021-06-11", "-1", "0").parse(0),
            Err(RecordError::InvalidScore {
                field: "home_score",
                ..
            })
        ));
        assert!(matches!(
            row("2021-06-11", "1", "0.5").parse(0),
            Err(RecordError::InvalidScore {
                field: "away_score",
                ..
            })
        ));
    }

    #[test]
    fn rejects_year_column_disagreeing_with_date() {
        let mut r = row("2021-06-11", "1", "0");
        r.year = Some("2020".to_string());
        assert!(matches!(r.parse(0), Err(RecordError::YearMismatch { .. })));
    }

    #[test]
    fn unparseable_year_names_the_year_field() {
        let mut r = row("2021-06-11", "1", "0");
        r.year = Some(" 20x1 ".to_string());
        assert_eq!(
            r.parse(4),
            Err(RecordError::InvalidYear {
                row: 4,
                value: "20x1".to_string()
            })
        );
        r.year = Some(" ".to_string());
        assert!(r.parse(4).is_ok());
    }

    #[test]
    fn rejects_empty_team() {
        let mut r = row("2021-06-11", "1", "0");
        r.away_team = "  ".to_string();
        assert_eq!(
            r.parse(3),
            Err(RecordError::EmptyField {
                row: 3,
                field: "away_team"
            })
        );
    }
}
