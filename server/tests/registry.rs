mod common;

use std::net::SocketAddr;

use comms::msg::{Command, Msg};
use machine_learning::City;
use server::{
    CoordinatorErr,
    proxy::ClientProxy,
    registry::{ClientRegistry, accept_clients},
};
use tokio::{
    net::{TcpListener, TcpStream},
    time::Duration,
};

use common::bundle;

async fn join_over_tcp(addr: SocketAddr, id: &str) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);

    let msg = Msg::Control(Command::Join {
        client_id: id.to_string(),
    });
    tx.send(&msg).await.unwrap();

    let mut buf: Vec<f32> = Vec::new();
    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Control(Command::Welcome { .. }) => {}
        other => panic!("expected welcome, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_connection_does_not_hold_up_joins() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let spec = bundle().spec();

    let idle = TcpStream::connect(addr).await.unwrap();
    let joining = tokio::spawn(async move { join_over_tcp(addr, "Delhi").await });

    let mut registry = ClientRegistry::new(&City::ALL);
    let clients = accept_clients(&listener, &mut registry, &spec, 1, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].id(), "Delhi");

    joining.await.unwrap();
    drop(idle);
}

#[tokio::test]
async fn deadline_reports_how_many_joined() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let spec = bundle().spec();

    let _idle = TcpStream::connect(addr).await.unwrap();
    let joining = tokio::spawn(async move { join_over_tcp(addr, "Beijing").await });

    let mut registry = ClientRegistry::new(&City::ALL);
    let res = accept_clients(&listener, &mut registry, &spec, 2, Duration::from_millis(300)).await;

    assert!(matches!(
        res,
        Err(CoordinatorErr::ClientShortfall {
            joined: 1,
            required: 2
        })
    ));

    joining.await.unwrap();
}
