use std::{fs, path::Path};

use ::csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;

use super::record::{
    CITY_COLUMN, ENV_FEATURES, Record, TARGET, TEXT_FEATURE, WEARABLE_FEATURES,
};
use crate::{MlErr, Result};

/// Column positions of every field a `Record` is made of.
struct Columns {
    city: usize,
    env: [usize; ENV_FEATURES.len()],
    text: usize,
    wearable: [usize; WEARABLE_FEATURES.len()],
    target: usize,
}

impl Columns {
    fn resolve(header: &[&str]) -> Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|col| *col == name)
                .ok_or_else(|| MlErr::MissingColumn(name.to_string()))
        };

        let mut env = [0; ENV_FEATURES.len()];
        for (slot, name) in env.iter_mut().zip(ENV_FEATURES) {
            *slot = find(name)?;
        }

        let mut wearable = [0; WEARABLE_FEATURES.len()];
        for (slot, name) in wearable.iter_mut().zip(WEARABLE_FEATURES) {
            *slot = find(name)?;
        }

        Ok(Self {
            city: find(CITY_COLUMN)?,
            env,
            text: find(TEXT_FEATURE)?,
            wearable,
            target: find(TARGET)?,
        })
    }
}

fn cell<'a>(row: &'a StringRecord, at: usize, line: usize, column: &str) -> Result<&'a str> {
    row.get(at).ok_or_else(|| MlErr::InvalidCell {
        line,
        column: column.to_string(),
        value: String::new(),
    })
}

fn number(row: &StringRecord, at: usize, line: usize, column: &str) -> Result<f64> {
    let raw = cell(row, at, line, column)?;
    raw.parse().map_err(|_| MlErr::InvalidCell {
        line,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Reads every record of the CSV file at `path`.
///
/// The file is decoded lossily so that stray non UTF-8 bytes in unused columns don't
/// reject the whole dataset.
///
/// # Arguments
/// * `path` - The CSV file, with a header row.
///
/// # Returns
/// The records in file order or an error naming the offending line and column.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let records = parse_csv(&String::from_utf8_lossy(&bytes))?;

    debug!(records = records.len(); "read dataset from {}", path.display());
    Ok(records)
}

/// Parses CSV text with a header row into records, blank lines are skipped.
///
/// Fields may be quoted, a quoted field keeps its commas.
pub fn parse_csv(text: &str) -> Result<Vec<Record>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let header = reader.headers()?.clone();
    if header.iter().all(str::is_empty) {
        return Err(MlErr::MissingColumn(CITY_COLUMN.to_string()));
    }

    let header: Vec<_> = header.iter().collect();
    let cols = Columns::resolve(&header)?;

    let mut records = Vec::new();
    let mut row = StringRecord::new();

    while reader.read_record(&mut row)? {
        if row.iter().all(str::is_empty) {
            continue;
        }

        let line = row.position().map_or(0, |pos| pos.line() as usize);

        let mut env = [0.; ENV_FEATURES.len()];
        for ((slot, &at), name) in env.iter_mut().zip(&cols.env).zip(ENV_FEATURES) {
            *slot = number(&row, at, line, name)?;
        }

        let mut wearable = [0.; WEARABLE_FEATURES.len()];
        for ((slot, &at), name) in wearable.iter_mut().zip(&cols.wearable).zip(WEARABLE_FEATURES) {
            *slot = number(&row, at, line, name)?;
        }

        records.push(Record {
            city: cell(&row, cols.city, line, CITY_COLUMN)?.to_string(),
            env,
            population_density: cell(&row, cols.text, line, TEXT_FEATURE)?.to_string(),
            wearable,
            hospital_admissions: number(&row, cols.target, line, TARGET)?,
        });
    }

    Ok(records)
}
