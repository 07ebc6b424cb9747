//! The client side of the round protocol.

use std::sync::Arc;

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
    specs::training::FitSpec,
};
use log::{debug, info, warn};
use machine_learning::{
    City, ParameterVector, arch::Architecture, dataset::PartitionSource,
    preprocessing::PreprocessorBundle,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};

use crate::{ClientErr, LocalTrainer, Result};

/// A server request, owned so that the receive buffer is free for the parameters that follow.
enum Request {
    Fit {
        round: usize,
        config: FitSpec,
        shapes: Vec<Vec<usize>>,
    },
    Evaluate {
        round: usize,
        shapes: Vec<Vec<usize>>,
    },
    Disconnect,
}

/// What a finished session did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSummary {
    pub rounds_trained: usize,
    pub rounds_failed: usize,
    pub evaluations: usize,
}

/// Joins the server as `city` and serves its requests until it disconnects.
///
/// Local failures (no data, bad parameters) are reported to the server with an `Err`
/// frame and the session keeps going, it's up to the server whether the round survives.
///
/// # Arguments
/// * `city` - The identity of this client.
/// * `arch` - The architecture of the model being trained.
/// * `source` - Where the local partition is loaded from.
/// * `rx` - Receiving end of the server channel.
/// * `tx` - Sending end of the server channel.
///
/// # Returns
/// A summary of the session on graceful completion.
///
/// # Errors
/// Returns `ClientErr` on I/O failures, rejection or protocol violations.
pub async fn run_session<A, S, R, W>(
    city: City,
    arch: A,
    source: S,
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
) -> Result<SessionSummary>
where
    A: Architecture + 'static,
    A::Model: 'static,
    S: PartitionSource + 'static,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut rx_buf: Vec<f32> = Vec::new();
    let mut tx_buf: Vec<f32> = Vec::new();

    let msg = Msg::Control(Command::Join {
        client_id: city.as_str().to_string(),
    });
    tx.send(&msg).await?;

    let bundle = match rx.recv_into(&mut rx_buf).await? {
        Msg::Control(Command::Welcome { bundle }) => bundle,
        Msg::Err(reason) => return Err(ClientErr::Rejected(reason.into_owned())),
        other => {
            return Err(ClientErr::UnexpectedMessage {
                round: 0,
                got: other.kind(),
            });
        }
    };

    let bundle = Arc::new(PreprocessorBundle::from_spec(bundle)?);
    info!(city = city.as_str(), fingerprint = bundle.fingerprint(); "joined the federation");

    let fingerprint = bundle.fingerprint().to_string();
    let mut trainer = Some(LocalTrainer::new(city, arch, source, bundle));
    let mut summary = SessionSummary::default();
    let mut round = 0;

    loop {
        match recv_request(&mut rx, &mut rx_buf, round).await? {
            Request::Fit {
                round: r,
                config,
                shapes,
            } => {
                round = r;
                let global = recv_params(&mut rx, &mut rx_buf, &shapes, round).await?;
                debug!(city = city.as_str(), round = round; "fit requested");

                let res = blocking(&mut trainer, move |t| t.fit(round, &global, &config)).await?;

                match res {
                    Ok(outcome) => {
                        outcome.params.flatten_into(&mut tx_buf);

                        let msg = Msg::Control(Command::FitRes {
                            sample_count: outcome.sample_count,
                            metrics: outcome.metrics,
                            shapes: outcome.params.shapes(),
                            fingerprint: fingerprint.clone(),
                        });
                        tx.send(&msg).await?;
                        tx.send(&Msg::Data(Payload::Params(&tx_buf))).await?;
                        summary.rounds_trained += 1;
                    }
                    Err(e) => {
                        warn!(city = city.as_str(), round = round; "local training failed: {e}");
                        tx.send(&Msg::Err(e.to_string().into())).await?;
                        summary.rounds_failed += 1;
                    }
                }
            }

            Request::Evaluate { round: r, shapes } => {
                round = r;
                let global = recv_params(&mut rx, &mut rx_buf, &shapes, round).await?;

                let res = blocking(&mut trainer, move |t| t.evaluate(round, &global)).await?;

                match res {
                    Ok(outcome) => {
                        let msg = Msg::Control(Command::EvaluateRes {
                            loss: outcome.loss,
                            sample_count: outcome.sample_count,
                            metrics: outcome.metrics,
                        });
                        tx.send(&msg).await?;
                        summary.evaluations += 1;
                    }
                    Err(e) => {
                        warn!(city = city.as_str(), round = round; "local evaluation failed: {e}");
                        tx.send(&Msg::Err(e.to_string().into())).await?;
                    }
                }
            }

            Request::Disconnect => {
                if let Some(trainer) = trainer.as_mut() {
                    trainer.finish();
                }

                info!(city = city.as_str(), round = round; "server finished the run");
                tx.send(&Msg::Control(Command::Disconnect)).await?;
                return Ok(summary);
            }
        }
    }
}

/// Runs `f` over the trainer on the blocking pool, training is CPU bound and not cancellable.
async fn blocking<A, S, T, F>(
    slot: &mut Option<LocalTrainer<A, S>>,
    f: F,
) -> Result<Result<T>>
where
    A: Architecture + 'static,
    A::Model: 'static,
    S: PartitionSource + 'static,
    T: Send + 'static,
    F: FnOnce(&mut LocalTrainer<A, S>) -> Result<T> + Send + 'static,
{
    let Some(mut trainer) = slot.take() else {
        return Err(ClientErr::Finished);
    };

    let (trainer, res) = task::spawn_blocking(move || {
        let res = f(&mut trainer);
        (trainer, res)
    })
    .await?;

    *slot = Some(trainer);
    Ok(res)
}

async fn recv_request<R>(rx: &mut OnoReceiver<R>, buf: &mut Vec<f32>, round: usize) -> Result<Request>
where
    R: AsyncRead + Unpin + Send,
{
    match rx.recv_into(buf).await? {
        Msg::Control(Command::Fit {
            round,
            config,
            shapes,
        }) => Ok(Request::Fit {
            round,
            config,
            shapes,
        }),
        Msg::Control(Command::Evaluate { round, shapes }) => Ok(Request::Evaluate { round, shapes }),
        Msg::Control(Command::Disconnect) => Ok(Request::Disconnect),
        other => Err(ClientErr::UnexpectedMessage {
            round,
            got: other.kind(),
        }),
    }
}

async fn recv_params<R>(
    rx: &mut OnoReceiver<R>,
    buf: &mut Vec<f32>,
    shapes: &[Vec<usize>],
    round: usize,
) -> Result<ParameterVector>
where
    R: AsyncRead + Unpin + Send,
{
    match rx.recv_into(buf).await? {
        Msg::Data(Payload::Params(flat)) => Ok(ParameterVector::from_flat(shapes, flat)?),
        other => Err(ClientErr::UnexpectedMessage {
            round,
            got: other.kind(),
        }),
    }
}
