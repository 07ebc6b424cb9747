mod common;

use std::borrow::Cow;

use client::{ClientErr, SessionSummary, run_session};
use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
    specs::training::FitSpec,
};
use machine_learning::City;
use tokio::io::{self, DuplexStream, ReadHalf, WriteHalf};

use common::{RecordingArch, bundle, source};

type Rx = OnoReceiver<ReadHalf<DuplexStream>>;
type Tx = OnoSender<WriteHalf<DuplexStream>>;

fn channel_pair() -> ((Rx, Tx), (Rx, Tx)) {
    let (stream1, stream2) = io::duplex(4096);
    let (rx1, tx1) = io::split(stream1);
    let (rx2, tx2) = io::split(stream2);
    (comms::channel(rx1, tx1), comms::channel(rx2, tx2))
}

async fn expect_join(rx: &mut Rx, buf: &mut Vec<f32>) -> String {
    match rx.recv_into(buf).await.unwrap() {
        Msg::Control(Command::Join { client_id }) => client_id,
        other => panic!("expected join, got {other:?}"),
    }
}

async fn send_request(tx: &mut Tx, cmd: Command, params: &[f32]) {
    tx.send(&Msg::Control(cmd)).await.unwrap();
    tx.send(&Msg::Data(Payload::Params(params))).await.unwrap();
}

#[tokio::test]
async fn full_session_with_one_round() {
    let ((client_rx, client_tx), (mut rx, mut tx)) = channel_pair();
    let client = tokio::spawn(run_session(
        City::Delhi,
        RecordingArch::default(),
        source(),
        client_rx,
        client_tx,
    ));

    let bundle = bundle();
    let mut buf = Vec::new();

    assert_eq!(expect_join(&mut rx, &mut buf).await, "Delhi");
    tx.send(&Msg::Control(Command::Welcome {
        bundle: bundle.spec(),
    }))
    .await
    .unwrap();

    let fit = Command::Fit {
        round: 1,
        config: FitSpec::default(),
        shapes: vec![vec![2]],
    };
    send_request(&mut tx, fit, &[1., 2.]).await;

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Control(Command::FitRes {
            sample_count,
            metrics,
            shapes,
            fingerprint,
        }) => {
            assert_eq!(sample_count, 16);
            assert!(metrics.is_empty());
            assert_eq!(shapes, vec![vec![2]]);
            assert_eq!(fingerprint, bundle.fingerprint());
        }
        other => panic!("expected fit result, got {other:?}"),
    }

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Params(params)) => assert_eq!(params, [2., 3.]),
        other => panic!("expected params, got {other:?}"),
    }

    let evaluate = Command::Evaluate {
        round: 1,
        shapes: vec![vec![2]],
    };
    send_request(&mut tx, evaluate, &[2., 3.]).await;

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Control(Command::EvaluateRes {
            loss,
            sample_count,
            metrics,
        }) => {
            assert_eq!(loss, 5.);
            assert_eq!(sample_count, 4);
            assert!(metrics.contains_key("mae"));
        }
        other => panic!("expected evaluate result, got {other:?}"),
    }

    tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();
    assert!(matches!(
        rx.recv_into(&mut buf).await.unwrap(),
        Msg::Control(Command::Disconnect)
    ));

    let summary = client.await.unwrap().unwrap();
    assert_eq!(
        summary,
        SessionSummary {
            rounds_trained: 1,
            rounds_failed: 0,
            evaluations: 1,
        }
    );
}

#[tokio::test]
async fn missing_partition_is_reported_and_session_survives() {
    let ((client_rx, client_tx), (mut rx, mut tx)) = channel_pair();
    let client = tokio::spawn(run_session(
        City::LosAngeles,
        RecordingArch::default(),
        source(),
        client_rx,
        client_tx,
    ));

    let mut buf = Vec::new();
    expect_join(&mut rx, &mut buf).await;
    tx.send(&Msg::Control(Command::Welcome {
        bundle: bundle().spec(),
    }))
    .await
    .unwrap();

    let fit = Command::Fit {
        round: 1,
        config: FitSpec::default(),
        shapes: vec![vec![2]],
    };
    send_request(&mut tx, fit, &[0., 0.]).await;

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Err(reason) => assert!(reason.contains("Los Angeles"), "{reason}"),
        other => panic!("expected an error, got {other:?}"),
    }

    tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();
    let _: Msg = rx.recv_into(&mut buf).await.unwrap();

    let summary = client.await.unwrap().unwrap();
    assert_eq!(summary.rounds_failed, 1);
    assert_eq!(summary.rounds_trained, 0);
}

#[tokio::test]
async fn rejected_join_ends_the_session() {
    let ((client_rx, client_tx), (mut rx, mut tx)) = channel_pair();
    let client = tokio::spawn(run_session(
        City::Delhi,
        RecordingArch::default(),
        source(),
        client_rx,
        client_tx,
    ));

    let mut buf = Vec::new();
    expect_join(&mut rx, &mut buf).await;
    tx.send(&Msg::Err(Cow::Borrowed("duplicate client Delhi")))
        .await
        .unwrap();

    match client.await.unwrap() {
        Err(ClientErr::Rejected(reason)) => assert_eq!(reason, "duplicate client Delhi"),
        other => panic!("expected a rejection, got {other:?}"),
    }
}
