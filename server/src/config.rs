use std::path::PathBuf;

use comms::specs::training::FitSpec;
use machine_learning::{City, dataset::DEFAULT_DATA_PATH};
use tokio::time::Duration;

use crate::{CoordinatorErr, Result, coordinator::RoundConfig};

/// Everything a server run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rounds: usize,
    pub min_clients: usize,
    pub data: PathBuf,
    pub model_dir: PathBuf,
    pub round_timeout: Duration,
    pub join_timeout: Duration,
    pub fit: FitSpec,
    /// Seed of the initial global parameters.
    pub seed: u64,
    pub roster: Vec<City>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9090,
            rounds: 3,
            min_clients: City::ALL.len(),
            data: PathBuf::from(DEFAULT_DATA_PATH),
            model_dir: PathBuf::from("model"),
            round_timeout: Duration::from_secs(600),
            join_timeout: Duration::from_secs(300),
            fit: FitSpec::default(),
            seed: 42,
            roster: City::ALL.to_vec(),
        }
    }
}

impl ServerConfig {
    /// Rejects configurations no run could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(invalid("at least one round is required"));
        }

        if self.min_clients == 0 {
            return Err(invalid("min_clients must be at least 1"));
        }

        if self.min_clients > self.roster.len() {
            return Err(invalid(format!(
                "min_clients is {} but the roster only has {} clients",
                self.min_clients,
                self.roster.len()
            )));
        }

        if self.fit.local_epochs == 0 || self.fit.batch_size == 0 {
            return Err(invalid("local epochs and batch size must be positive"));
        }

        if !(0.0..1.0).contains(&self.fit.validation_split) {
            return Err(invalid("the validation split must be in [0, 1)"));
        }

        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The coordinator's share of the configuration, for a bundle with `fingerprint`.
    pub fn round_config(&self, fingerprint: &str) -> RoundConfig {
        RoundConfig {
            rounds: self.rounds,
            min_clients: self.min_clients,
            round_timeout: self.round_timeout,
            fit: self.fit,
            fingerprint: fingerprint.to_string(),
        }
    }
}

fn invalid<S: Into<String>>(reason: S) -> CoordinatorErr {
    CoordinatorErr::Config(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn min_clients_above_the_roster_is_rejected() {
        let config = ServerConfig {
            min_clients: 5,
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(CoordinatorErr::Config(_))));
    }

    #[test]
    fn zero_rounds_is_rejected() {
        let config = ServerConfig {
            rounds: 0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
