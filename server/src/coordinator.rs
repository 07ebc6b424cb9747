//! Sequential federated rounds over a set of clients.

use comms::specs::training::FitSpec;
use futures::future;
use log::{info, warn};
use machine_learning::ParameterVector;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Duration};

use crate::{
    CoordinatorErr, ProxyErr, Result,
    aggregation::{aggregate, weighted_mean},
    proxy::{ClientEvaluation, ClientProxy, ClientUpdate},
};

/// The knobs of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    pub rounds: usize,
    pub min_clients: usize,
    /// Upper bound of every single client call.
    pub round_timeout: Duration,
    pub fit: FitSpec,
    /// Fingerprint of the preprocessor bundle every update must have been trained with.
    pub fingerprint: String,
}

/// A client that failed a request without breaking the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFailure {
    pub client: String,
    pub reason: String,
}

/// The federated evaluation of one round's aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEvaluation {
    pub loss: f32,
    pub mae: Option<f32>,
    pub sample_count: usize,
    pub participants: Vec<String>,
    pub failures: Vec<ClientFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: usize,
    pub participants: Vec<String>,
    pub failures: Vec<ClientFailure>,
    pub train_samples: usize,
    pub evaluation: Option<RoundEvaluation>,
}

/// What happened in every round of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub rounds: Vec<RoundRecord>,
}

/// Notified once the final round succeeded, before the clients are released.
pub trait CompletionListener {
    fn on_complete(&mut self, params: &ParameterVector, history: &TrainingHistory) -> Result<()>;
}

impl<F> CompletionListener for F
where
    F: FnMut(&ParameterVector, &TrainingHistory) -> Result<()>,
{
    fn on_complete(&mut self, params: &ParameterVector, history: &TrainingHistory) -> Result<()> {
        self(params, history)
    }
}

/// Drives the fit, aggregate and evaluate cycle over the connected clients.
pub struct RoundCoordinator<C: ClientProxy> {
    config: RoundConfig,
    clients: Vec<C>,
    history: TrainingHistory,
}

impl<C: ClientProxy> RoundCoordinator<C> {
    /// Creates a new `RoundCoordinator`.
    ///
    /// # Arguments
    /// * `config` - The configuration of the run.
    /// * `clients` - Every client that joined, in any order.
    ///
    /// # Returns
    /// A coordinator or `ClientShortfall` if fewer than `min_clients` joined.
    pub fn new(config: RoundConfig, mut clients: Vec<C>) -> Result<Self> {
        if config.rounds == 0 {
            return Err(CoordinatorErr::Config("at least one round is required".into()));
        }

        if config.min_clients == 0 {
            return Err(CoordinatorErr::Config("min_clients must be at least 1".into()));
        }

        if clients.len() < config.min_clients {
            return Err(CoordinatorErr::ClientShortfall {
                joined: clients.len(),
                required: config.min_clients,
            });
        }

        clients.sort_by(|a, b| a.id().cmp(b.id()));

        Ok(Self {
            config,
            clients,
            history: TrainingHistory::default(),
        })
    }

    /// Runs every round starting from `initial`.
    ///
    /// `listener` is only called if every round succeeded. The clients are told to
    /// disconnect whatever the outcome.
    ///
    /// # Returns
    /// The final global parameters and the history of the run.
    pub async fn run<L>(
        mut self,
        initial: ParameterVector,
        listener: &mut L,
    ) -> Result<(ParameterVector, TrainingHistory)>
    where
        L: CompletionListener,
    {
        let res = self.rounds(initial).await;

        let res = res.and_then(|global| {
            listener.on_complete(&global, &self.history)?;
            Ok(global)
        });

        self.disconnect_all().await;

        let global = res?;
        info!(rounds = self.config.rounds; "run complete");
        Ok((global, self.history))
    }

    async fn rounds(&mut self, initial: ParameterVector) -> Result<ParameterVector> {
        let shapes = initial.shapes();
        let mut global = initial;

        for round in 1..=self.config.rounds {
            info!(round = round, clients = self.clients.len(); "starting round");

            let (next, mut record) = self.fit_round(round, &global, &shapes).await?;
            global = next;
            record.evaluation = self.evaluate_round(round, &global).await;

            self.history.rounds.push(record);
        }

        Ok(global)
    }

    async fn fit_round(
        &mut self,
        round: usize,
        global: &ParameterVector,
        shapes: &[Vec<usize>],
    ) -> Result<(ParameterVector, RoundRecord)> {
        let timeout = self.config.round_timeout;
        let config = &self.config.fit;

        let outcomes = future::join_all(self.clients.iter_mut().map(|client| async move {
            match time::timeout(timeout, client.fit(round, global, config)).await {
                Ok(res) => res,
                Err(_) => Err(ProxyErr::Timeout),
            }
        }))
        .await;

        let mut updates = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut lost = Vec::new();

        for (client, outcome) in self.clients.iter().zip(outcomes) {
            let id = client.id().to_string();

            match outcome {
                Ok(update) => {
                    self.check_contract(round, &id, &update, shapes)?;
                    updates.push(update);
                }
                Err(ProxyErr::Contract(reason)) => {
                    return Err(CoordinatorErr::ContractViolation {
                        client: id,
                        round,
                        reason,
                    });
                }
                Err(e) => {
                    warn!(client = id.as_str(), round = round; "fit failed: {e}");

                    if !e.is_recoverable() {
                        lost.push(id.clone());
                    }

                    failures.push(ClientFailure {
                        client: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.drop_clients(&lost);

        if updates.len() < self.config.min_clients {
            return Err(CoordinatorErr::Quorum {
                round,
                succeeded: updates.len(),
                required: self.config.min_clients,
            });
        }

        updates.sort_by(|a, b| a.client_id.cmp(&b.client_id));

        let weighted: Vec<_> = updates.iter().map(|u| (&u.params, u.sample_count)).collect();
        let next = aggregate(&weighted)?;

        let train_samples: usize = updates.iter().map(|u| u.sample_count).sum();
        info!(round = round, participants = updates.len(), samples = train_samples; "round aggregated");

        let record = RoundRecord {
            round,
            participants: updates.into_iter().map(|u| u.client_id).collect(),
            failures,
            train_samples,
            evaluation: None,
        };

        Ok((next, record))
    }

    /// Evaluates the new aggregate on every client's held-out split.
    ///
    /// A round without any evaluation is only logged, it doesn't fail the run.
    async fn evaluate_round(&mut self, round: usize, global: &ParameterVector) -> Option<RoundEvaluation> {
        let timeout = self.config.round_timeout;

        let outcomes = future::join_all(self.clients.iter_mut().map(|client| async move {
            match time::timeout(timeout, client.evaluate(round, global)).await {
                Ok(res) => res,
                Err(_) => Err(ProxyErr::Timeout),
            }
        }))
        .await;

        let mut evaluations: Vec<ClientEvaluation> = Vec::new();
        let mut failures = Vec::new();
        let mut lost = Vec::new();

        for (client, outcome) in self.clients.iter().zip(outcomes) {
            let id = client.id().to_string();

            match outcome {
                Ok(evaluation) if evaluation.sample_count > 0 => evaluations.push(evaluation),
                Ok(_) => failures.push(ClientFailure {
                    client: id,
                    reason: "evaluated zero samples".into(),
                }),
                Err(e) => {
                    warn!(client = id.as_str(), round = round; "evaluation failed: {e}");

                    if !e.is_recoverable() {
                        lost.push(id.clone());
                    }

                    failures.push(ClientFailure {
                        client: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.drop_clients(&lost);

        let loss = weighted_mean(evaluations.iter().map(|e| (e.loss, e.sample_count)));
        let Some(loss) = loss else {
            warn!(round = round; "no client evaluated the aggregate");
            return None;
        };

        let mae = weighted_mean(
            evaluations
                .iter()
                .filter_map(|e| e.metrics.get("mae").map(|&mae| (mae, e.sample_count))),
        );
        let sample_count: usize = evaluations.iter().map(|e| e.sample_count).sum();

        match mae {
            Some(mae) => info!(round = round, loss = loss, mae = mae, samples = sample_count; "round evaluated"),
            None => info!(round = round, loss = loss, samples = sample_count; "round evaluated"),
        }

        Some(RoundEvaluation {
            loss,
            mae,
            sample_count,
            participants: evaluations.into_iter().map(|e| e.client_id).collect(),
            failures,
        })
    }

    fn check_contract(
        &self,
        round: usize,
        client: &str,
        update: &ClientUpdate,
        shapes: &[Vec<usize>],
    ) -> Result<()> {
        let violation = |reason: String| CoordinatorErr::ContractViolation {
            client: client.to_string(),
            round,
            reason,
        };

        update
            .params
            .ensure_shapes(shapes)
            .map_err(|e| violation(e.to_string()))?;

        if update.fingerprint != self.config.fingerprint {
            return Err(violation(format!(
                "trained with preprocessor fingerprint {}, expected {}",
                update.fingerprint, self.config.fingerprint
            )));
        }

        if update.sample_count == 0 {
            return Err(violation("update trained on zero samples".into()));
        }

        Ok(())
    }

    /// Removes clients whose channel can't be trusted anymore.
    fn drop_clients(&mut self, lost: &[String]) {
        if lost.is_empty() {
            return;
        }

        self.clients.retain(|client| !lost.iter().any(|id| id == client.id()));
        warn!(remaining = self.clients.len(); "dropped {} unresponsive clients", lost.len());
    }

    async fn disconnect_all(&mut self) {
        let outcomes = future::join_all(self.clients.iter_mut().map(|client| async move {
            let res = time::timeout(Duration::from_secs(5), client.disconnect()).await;
            (client.id().to_string(), res)
        }))
        .await;

        for (id, res) in outcomes {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(client = id.as_str(); "disconnect failed: {e}"),
                Err(_) => warn!(client = id.as_str(); "disconnect timed out"),
            }
        }
    }
}
