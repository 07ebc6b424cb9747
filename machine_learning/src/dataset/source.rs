use std::path::{Path, PathBuf};

use super::{City, Record, read_csv};
use crate::{MlErr, Result};

/// Where a client's records come from.
pub trait PartitionSource: Send + Sync {
    /// Loads every record of the dataset.
    fn load_all(&self) -> Result<Vec<Record>>;

    /// Loads the records that belong to `city`.
    ///
    /// # Returns
    /// The records in dataset order or `MlErr::NoDataForClient` if there are none.
    fn load_partition(&self, city: City) -> Result<Vec<Record>> {
        let records: Vec<_> = self
            .load_all()?
            .into_iter()
            .filter(|record| record.city == city.as_str())
            .collect();

        if records.is_empty() {
            return Err(MlErr::NoDataForClient(city.to_string()));
        }

        Ok(records)
    }
}

/// A dataset kept in a CSV file, read on every load.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PartitionSource for CsvSource {
    fn load_all(&self) -> Result<Vec<Record>> {
        read_csv(&self.path)
    }
}

/// A dataset already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl PartitionSource for MemorySource {
    fn load_all(&self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(city: &str) -> Record {
        Record {
            city: city.to_string(),
            env: [0.; 9],
            population_density: "Urban".to_string(),
            wearable: [0.; 6],
            hospital_admissions: 1.,
        }
    }

    #[test]
    fn partition_keeps_only_the_city_rows() {
        let source = MemorySource::new(vec![
            record("Delhi"),
            record("Beijing"),
            record("Delhi"),
            record("Mexico City"),
        ]);

        assert_eq!(source.load_partition(City::Delhi).unwrap().len(), 2);
        assert_eq!(source.load_partition(City::MexicoCity).unwrap().len(), 1);
    }

    #[test]
    fn empty_partition_is_no_data_for_client() {
        let source = MemorySource::new(vec![record("Delhi")]);

        assert!(matches!(
            source.load_partition(City::LosAngeles),
            Err(MlErr::NoDataForClient(city)) if city == "Los Angeles"
        ));
    }
}
