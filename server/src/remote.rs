//! A client on the other end of a comms channel.

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Metrics, Msg, Payload},
    specs::training::FitSpec,
};
use log::debug;
use machine_learning::{City, ParameterVector};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    ProxyErr,
    proxy::{ClientEvaluation, ClientProxy, ClientUpdate},
};

/// The control part of a fit answer, owned so the receive buffer is free for the parameters.
enum FitReply {
    Done {
        sample_count: usize,
        metrics: Metrics,
        shapes: Vec<Vec<usize>>,
        fingerprint: String,
    },
    Reported(String),
}

pub struct RemoteClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    city: City,
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    rx_buf: Vec<f32>,
    tx_buf: Vec<f32>,
}

impl<R, W> RemoteClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps the channel of a client that already joined.
    pub fn new(city: City, rx: OnoReceiver<R>, tx: OnoSender<W>) -> Self {
        Self {
            city,
            rx,
            tx,
            rx_buf: Vec::new(),
            tx_buf: Vec::new(),
        }
    }

    pub fn city(&self) -> City {
        self.city
    }

    async fn send_params(&mut self, request: Command, params: &ParameterVector) -> Result<(), ProxyErr> {
        params.flatten_into(&mut self.tx_buf);

        self.tx.send(&Msg::Control(request)).await?;
        self.tx.send(&Msg::Data(Payload::Params(&self.tx_buf))).await?;
        Ok(())
    }

    async fn recv_fit_reply(&mut self) -> Result<FitReply, ProxyErr> {
        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Control(Command::FitRes {
                sample_count,
                metrics,
                shapes,
                fingerprint,
            }) => Ok(FitReply::Done {
                sample_count,
                metrics,
                shapes,
                fingerprint,
            }),
            Msg::Err(reason) => Ok(FitReply::Reported(reason.into_owned())),
            other => Err(unexpected("control/fit_res", other.kind())),
        }
    }

    async fn recv_params(&mut self, shapes: &[Vec<usize>]) -> Result<ParameterVector, ProxyErr> {
        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Data(Payload::Params(flat)) => ParameterVector::from_flat(shapes, flat)
                .map_err(|e| ProxyErr::Contract(e.to_string())),
            other => Err(unexpected("data/params", other.kind())),
        }
    }
}

#[async_trait::async_trait]
impl<R, W> ClientProxy for RemoteClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn id(&self) -> &str {
        self.city.as_str()
    }

    async fn fit(
        &mut self,
        round: usize,
        params: &ParameterVector,
        config: &FitSpec,
    ) -> Result<ClientUpdate, ProxyErr> {
        let request = Command::Fit {
            round,
            config: *config,
            shapes: params.shapes(),
        };
        self.send_params(request, params).await?;

        let (sample_count, metrics, shapes, fingerprint) = match self.recv_fit_reply().await? {
            FitReply::Done {
                sample_count,
                metrics,
                shapes,
                fingerprint,
            } => (sample_count, metrics, shapes, fingerprint),
            FitReply::Reported(reason) => return Err(ProxyErr::Reported(reason)),
        };

        let params = self.recv_params(&shapes).await?;
        debug!(client = self.id(), round = round, samples = sample_count; "received update");

        Ok(ClientUpdate {
            client_id: self.id().to_string(),
            params,
            sample_count,
            metrics,
            fingerprint,
        })
    }

    async fn evaluate(
        &mut self,
        round: usize,
        params: &ParameterVector,
    ) -> Result<ClientEvaluation, ProxyErr> {
        let request = Command::Evaluate {
            round,
            shapes: params.shapes(),
        };
        self.send_params(request, params).await?;

        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Control(Command::EvaluateRes {
                loss,
                sample_count,
                metrics,
            }) => Ok(ClientEvaluation {
                client_id: self.city.as_str().to_string(),
                loss,
                sample_count,
                metrics,
            }),
            Msg::Err(reason) => Err(ProxyErr::Reported(reason.into_owned())),
            other => Err(unexpected("control/evaluate_res", other.kind())),
        }
    }

    async fn disconnect(&mut self) -> Result<(), ProxyErr> {
        self.tx.send(&Msg::Control(Command::Disconnect)).await?;

        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Control(Command::Disconnect) => Ok(()),
            other => Err(unexpected("control/disconnect", other.kind())),
        }
    }
}

fn unexpected(expected: &str, got: &str) -> ProxyErr {
    ProxyErr::Protocol(format!("expected {expected}, got {got}"))
}
