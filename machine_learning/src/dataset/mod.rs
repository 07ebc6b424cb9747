//! Tabular health records: the fixed schema, CSV loading, per-city partitions and
//! the train/test split every client applies to its partition.

mod city;
mod csv;
mod record;
mod samples;
mod source;
mod split;

pub use city::City;
pub use csv::{parse_csv, read_csv};
pub use record::{
    CITY_COLUMN, ENV_FEATURES, POPULATION_CLASSES, Record, TARGET, TEXT_FEATURE,
    WEARABLE_FEATURES,
};
pub use samples::Samples;
pub use source::{CsvSource, MemorySource, PartitionSource};
pub use split::{SPLIT_SEED, TEST_FRACTION, train_test_split};

/// Where the dataset is read from when no path is configured.
pub const DEFAULT_DATA_PATH: &str = "data/MLOPs_data.csv";
