//! Admission of clients into a run.

use std::{collections::BTreeSet, io, net::SocketAddr};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg},
    specs::preprocessing::BundleSpec,
};
use log::{info, warn};
use machine_learning::City;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    task::{JoinError, JoinSet},
    time::{self, Duration, Instant},
};

use crate::{CoordinatorErr, Result, remote::RemoteClient};

/// A client accepted over TCP.
pub type TcpClient = RemoteClient<OwnedReadHalf, OwnedWriteHalf>;

/// Why a join was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnknownClient(String),
    NotInRoster(City),
    AlreadyJoined(City),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::UnknownClient(id) => write!(f, "unknown client id {id:?}"),
            Rejection::NotInRoster(city) => write!(f, "{city} is not part of this run"),
            Rejection::AlreadyJoined(city) => write!(f, "{city} already joined"),
        }
    }
}

/// Tracks which clients of the roster have joined.
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    roster: BTreeSet<City>,
    joined: BTreeSet<City>,
}

impl ClientRegistry {
    pub fn new(roster: &[City]) -> Self {
        Self {
            roster: roster.iter().copied().collect(),
            joined: BTreeSet::new(),
        }
    }

    /// Admits `client_id` if it names a city of the roster that hasn't joined yet.
    pub fn admit(&mut self, client_id: &str) -> std::result::Result<City, Rejection> {
        let city: City = client_id
            .parse()
            .map_err(|_| Rejection::UnknownClient(client_id.to_string()))?;

        if !self.roster.contains(&city) {
            return Err(Rejection::NotInRoster(city));
        }

        if !self.joined.insert(city) {
            return Err(Rejection::AlreadyJoined(city));
        }

        Ok(city)
    }

    pub fn joined(&self) -> usize {
        self.joined.len()
    }
}

/// A channel whose client opened with `Join`, not admitted yet.
pub struct PendingJoin<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    client_id: String,
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
}

impl<R, W> PendingJoin<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Waits for the `Join` a client must open with.
    ///
    /// Any other first message is answered with an `Err` frame.
    pub async fn recv(mut rx: OnoReceiver<R>, mut tx: OnoSender<W>) -> io::Result<Self> {
        let mut buf: Vec<f32> = Vec::new();

        match rx.recv_into(&mut buf).await? {
            Msg::Control(Command::Join { client_id }) => Ok(Self { client_id, rx, tx }),
            other => {
                let reason = format!("expected control/join, got {}", other.kind());
                tx.send(&Msg::Err(reason.clone().into())).await?;
                Err(io::Error::new(io::ErrorKind::InvalidData, reason))
            }
        }
    }

    /// Answers the join, an admitted client gets the preprocessor bundle in `Welcome` and
    /// a refused one gets an `Err` frame with the reason.
    ///
    /// # Returns
    /// The client, or `None` if it was refused.
    pub async fn admit(
        self,
        registry: &mut ClientRegistry,
        bundle: &BundleSpec,
    ) -> io::Result<Option<RemoteClient<R, W>>> {
        let Self {
            client_id,
            rx,
            mut tx,
        } = self;

        match registry.admit(&client_id) {
            Ok(city) => {
                let msg = Msg::Control(Command::Welcome {
                    bundle: bundle.clone(),
                });
                tx.send(&msg).await?;

                info!(client = city.as_str(), joined = registry.joined(); "client joined");
                Ok(Some(RemoteClient::new(city, rx, tx)))
            }
            Err(rejection) => {
                warn!(client = client_id.as_str(); "refused join: {rejection}");
                tx.send(&Msg::Err(rejection.to_string().into())).await?;
                Ok(None)
            }
        }
    }
}

/// Runs the join handshake on a fresh channel.
///
/// # Returns
/// The client, or `None` if it was refused.
pub async fn handshake<R, W>(
    registry: &mut ClientRegistry,
    bundle: &BundleSpec,
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
) -> io::Result<Option<RemoteClient<R, W>>>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    PendingJoin::recv(rx, tx).await?.admit(registry, bundle).await
}

type TcpJoin = PendingJoin<OwnedReadHalf, OwnedWriteHalf>;

/// Accepts connections until `required` clients have joined or `join_timeout` elapses.
///
/// Every connection waits for its `Join` on its own task, so a peer that connects and
/// stays silent holds up nobody else.
///
/// # Errors
/// `CoordinatorErr::ClientShortfall` if the deadline passes first.
pub async fn accept_clients(
    listener: &TcpListener,
    registry: &mut ClientRegistry,
    bundle: &BundleSpec,
    required: usize,
    join_timeout: Duration,
) -> Result<Vec<TcpClient>> {
    let deadline = Instant::now() + join_timeout;
    let mut clients = Vec::with_capacity(required);
    let mut pending: JoinSet<(SocketAddr, io::Result<TcpJoin>)> = JoinSet::new();

    while clients.len() < required {
        let event = time::timeout_at(deadline, async {
            tokio::select! {
                accepted = listener.accept() => Event::Accepted(accepted),
                Some(joined) = pending.join_next() => Event::Joined(joined),
            }
        })
        .await;

        match event {
            Ok(Event::Accepted(Ok((stream, addr)))) => {
                let (rx, tx) = stream.into_split();
                let (rx, tx) = comms::channel(rx, tx);
                pending.spawn(async move { (addr, PendingJoin::recv(rx, tx).await) });
            }
            Ok(Event::Accepted(Err(e))) => warn!("failed to accept a connection: {e}"),
            Ok(Event::Joined(Ok((_, Ok(join))))) => {
                match time::timeout_at(deadline, join.admit(registry, bundle)).await {
                    Ok(Ok(Some(client))) => clients.push(client),
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => warn!("failed to answer a join: {e}"),
                    Err(_) => return Err(shortfall(clients.len(), required)),
                }
            }
            Ok(Event::Joined(Ok((addr, Err(e))))) => warn!("handshake with {addr} failed: {e}"),
            Ok(Event::Joined(Err(e))) => warn!("handshake task failed: {e}"),
            Err(_) => return Err(shortfall(clients.len(), required)),
        }
    }

    Ok(clients)
}

enum Event {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Joined(std::result::Result<(SocketAddr, io::Result<TcpJoin>), JoinError>),
}

fn shortfall(joined: usize, required: usize) -> CoordinatorErr {
    CoordinatorErr::ClientShortfall { joined, required }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_each_city_once() {
        let mut registry = ClientRegistry::new(&City::ALL);

        assert_eq!(registry.admit("Delhi"), Ok(City::Delhi));
        assert_eq!(registry.admit("Delhi"), Err(Rejection::AlreadyJoined(City::Delhi)));
        assert_eq!(registry.admit("Mexico City"), Ok(City::MexicoCity));
        assert_eq!(registry.joined(), 2);
    }

    #[test]
    fn refuses_ids_outside_the_roster() {
        let mut registry = ClientRegistry::new(&[City::Delhi, City::Beijing]);

        assert!(matches!(registry.admit("Paris"), Err(Rejection::UnknownClient(_))));
        assert_eq!(
            registry.admit("Los Angeles"),
            Err(Rejection::NotInRoster(City::LosAngeles))
        );
        assert_eq!(registry.joined(), 0);
    }
}
