//! Table adapters: raw match rows in, prediction rows out.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::match_record::RawMatchRow;
use crate::simulate::Prediction;

/// Reads `date,home_team,away_team,home_score,away_score,tournament[,year,...]`.
/// Unknown columns are ignored.
pub fn load_raw_rows(path: &Path) -> Result<Vec<RawMatchRow>> {
    let file = File::open(path).with_context(|| format!("open match table {}", path.display()))?;
    read_raw_rows(file).with_context(|| format!("read match table {}", path.display()))
}

pub fn read_raw_rows<R: Read>(reader: R) -> Result<Vec<RawMatchRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<RawMatchRow>().enumerate() {
        let row = record.with_context(|| format!("row {idx}"))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_predictions(path: &Path, rows: &[Prediction]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("create predictions {}", path.display()))?;
    write_predictions_to(file, rows)
}

/// Header `mean_home_goal,mean_away_goal,mode_home_goal,mode_away_goal,pred_result`.
pub fn write_predictions_to<W: Write>(out: W, rows: &[Prediction]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row).context("serialize prediction row")?;
    }
    writer.flush().context("flush predictions")?;
    Ok(())
}
