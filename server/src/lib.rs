pub mod aggregation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod persistence;
pub mod proxy;
pub mod registry;
pub mod remote;
mod run;

pub use config::ServerConfig;
pub use error::{AggregationErr, CoordinatorErr, PersistErr, ProxyErr, Result};
pub use run::{RunOutcome, run_server};
