//! The coordinator's view of a client.

use comms::{msg::Metrics, specs::training::FitSpec};
use machine_learning::ParameterVector;

use crate::ProxyErr;

/// A client's answer to a fit request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientUpdate {
    pub client_id: String,
    pub params: ParameterVector,
    pub sample_count: usize,
    pub metrics: Metrics,
    pub fingerprint: String,
}

/// A client's answer to an evaluate request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvaluation {
    pub client_id: String,
    pub loss: f32,
    pub sample_count: usize,
    pub metrics: Metrics,
}

/// Something the coordinator can drive through rounds.
///
/// Implemented over a network channel by `RemoteClient` and by in-memory fakes in tests.
#[async_trait::async_trait]
pub trait ClientProxy: Send {
    fn id(&self) -> &str;

    /// Asks the client to train from `params` for one round.
    async fn fit(
        &mut self,
        round: usize,
        params: &ParameterVector,
        config: &FitSpec,
    ) -> Result<ClientUpdate, ProxyErr>;

    /// Asks the client to evaluate `params` on its held-out split.
    async fn evaluate(
        &mut self,
        round: usize,
        params: &ParameterVector,
    ) -> Result<ClientEvaluation, ProxyErr>;

    /// Tells the client the run is over.
    async fn disconnect(&mut self) -> Result<(), ProxyErr>;
}
