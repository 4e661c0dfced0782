//! Integration tests for agency-client.
//!
//! Each test runs a full session against an in-process server that speaks
//! the wire protocol and records what it observed.

use agency_client::codec::{Batch, BatchAck, FinishNotification, WinnerResult};
use agency_client::protocol::{
    decode_length_prefix, encode_length_prefix, OutboundHeader, LENGTH_PREFIX_SIZE,
    OUTBOUND_HEADER_SIZE,
};
use agency_client::transport::Connection;
use agency_client::{AgencyError, RecordSource, Session, SessionState};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// A request as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observed {
    Batch { sender: u8, batch: Batch },
    Finish { sender: u8, notification: FinishNotification },
}

/// Serve one session: ack every batch with its full count, answer the
/// finish notification with `winners`, and return what was received.
async fn serve<S>(mut stream: S, winners: u32) -> Vec<Observed>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut observed = Vec::new();
    loop {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        if stream.read_exact(&mut prefix).await.is_err() {
            return observed;
        }
        let mut frame = prefix.to_vec();
        let length = decode_length_prefix(&prefix).unwrap() as usize;
        frame.resize(LENGTH_PREFIX_SIZE + length, 0);
        stream.read_exact(&mut frame[LENGTH_PREFIX_SIZE..]).await.unwrap();

        let header = OutboundHeader::decode(&frame).unwrap();
        let payload = &frame[OUTBOUND_HEADER_SIZE..];
        assert_eq!(payload.len(), header.payload_length());

        let response = if payload.len() == FinishNotification::SIZE {
            observed.push(Observed::Finish {
                sender: header.sender_id,
                notification: FinishNotification::decode(payload).unwrap(),
            });
            WinnerResult::new(winners).encode()
        } else {
            let batch = Batch::decode(payload).unwrap();
            let ack = BatchAck::new(batch.id(), batch.len() as u32).encode();
            observed.push(Observed::Batch {
                sender: header.sender_id,
                batch,
            });
            ack
        };

        stream
            .write_all(&encode_length_prefix(response.len() as u32))
            .await
            .unwrap();
        stream.write_all(&response).await.unwrap();
    }
}

/// Run a session over TCP against `serve` and return both sides' results.
async fn run_tcp_session(
    client_id: u8,
    batch_size: usize,
    data: &'static str,
    winners: u32,
) -> (agency_client::Result<agency_client::SessionReport>, SessionState, Vec<Observed>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve(stream, winners).await
    });

    let mut session = Session::builder(client_id)
        .server_address(addr.to_string())
        .batch_size(batch_size)
        .build()
        .unwrap();
    let result = session.run(RecordSource::new(data.as_bytes())).await;

    (result, session.state(), server.await.unwrap())
}

fn batches(observed: &[Observed]) -> Vec<&Batch> {
    observed
        .iter()
        .filter_map(|o| match o {
            Observed::Batch { batch, .. } => Some(batch),
            Observed::Finish { .. } => None,
        })
        .collect()
}

fn numbered_lines(n: usize) -> &'static str {
    let text: String = (0..n)
        .map(|i| format!("Name{i},Last{i},{},1990-01-01,{i}\n", 30_000_000 + i))
        .collect();
    Box::leak(text.into_boxed_str())
}

/// Three lines, the middle one malformed, batch size two.
#[tokio::test]
async fn test_concrete_scenario() {
    let data = "Ana,Diaz,30000001,1990-01-01,7\n\
                Bad,Line,only3\n\
                Luis,Perez,30000002,1991-02-02,42\n";

    let (result, state, observed) = run_tcp_session(1, 2, data, 1).await;
    let report = result.unwrap();

    assert_eq!(state, SessionState::Closed);
    assert_eq!(report.winners, 1);
    assert_eq!(report.batches_sent, 1);
    assert_eq!(report.skipped_lines, 1);
    assert_eq!(observed.len(), 2);

    match &observed[0] {
        Observed::Batch { sender, batch } => {
            assert_eq!(*sender, 1);
            assert_eq!(batch.id(), 0);
            assert_eq!(batch.len(), 2);
            assert_eq!(batch.records()[0].first_name(), "Ana");
            assert_eq!(batch.records()[0].document(), 30_000_001);
            assert_eq!(batch.records()[1].last_name(), "Perez");
            assert_eq!(batch.records()[1].number(), 42);
        }
        other => panic!("expected a batch first, got {other:?}"),
    }
    assert_eq!(
        observed[1],
        Observed::Finish {
            sender: 1,
            notification: FinishNotification::new(1)
        }
    );
}

/// Batch ids are 0..ceil(n/k) in order and the last batch holds the remainder.
#[tokio::test]
async fn test_batch_sequencing() {
    for (n, k) in [(7usize, 3usize), (6, 3), (1, 5), (10, 1)] {
        let (result, _, observed) = run_tcp_session(2, k, numbered_lines(n), 0).await;
        let report = result.unwrap();
        let sent = batches(&observed);

        let expected_batches = n.div_ceil(k);
        assert_eq!(sent.len(), expected_batches, "n={n} k={k}");
        assert_eq!(report.batches_sent as usize, expected_batches);
        assert_eq!(report.records_sent as usize, n);
        for (i, batch) in sent.iter().enumerate() {
            assert_eq!(batch.id() as usize, i);
        }

        let last = if n % k == 0 { k } else { n % k };
        assert_eq!(sent.last().unwrap().len(), last, "n={n} k={k}");

        // Records arrive in source order.
        let numbers: Vec<u32> = sent
            .iter()
            .flat_map(|b| b.records().iter().map(|r| r.number()))
            .collect();
        assert_eq!(numbers, (0..n as u32).collect::<Vec<_>>());
    }
}

/// A malformed line yields the same session as if it were absent.
#[tokio::test]
async fn test_malformed_line_is_invisible_to_server() {
    let with_bad = "A,B,1,1990-01-01,1\nonly,four,fields,here\nC,D,2,1990-01-01,2\nE,F,3,1990-01-01,3\n";
    let without = "A,B,1,1990-01-01,1\nC,D,2,1990-01-01,2\nE,F,3,1990-01-01,3\n";

    let (first, _, observed_with) = run_tcp_session(3, 2, with_bad, 5).await;
    let (second, _, observed_without) = run_tcp_session(3, 2, without, 5).await;

    assert_eq!(observed_with, observed_without);
    assert_eq!(first.unwrap().skipped_lines, 1);
    assert_eq!(second.unwrap().skipped_lines, 0);
}

/// An empty source sends no batches and goes straight to the finish notification.
#[tokio::test]
async fn test_empty_source() {
    let (result, state, observed) = run_tcp_session(4, 10, "", 0).await;

    assert_eq!(state, SessionState::Closed);
    assert_eq!(result.unwrap().batches_sent, 0);
    assert_eq!(
        observed,
        vec![Observed::Finish {
            sender: 4,
            notification: FinishNotification::new(4)
        }]
    );
}

/// Single-byte reads and writes on both sides change nothing.
#[tokio::test]
async fn test_single_byte_transport() {
    let data = numbered_lines(5);

    let mut observations = Vec::new();
    for capacity in [1usize, 64 * 1024] {
        let (client, server) = duplex(capacity);
        let server = tokio::spawn(serve(server, 2));

        let mut session = Session::builder(6).batch_size(2).build().unwrap();
        let report = session
            .run_with_connection(Connection::new(client, 6), RecordSource::new(data.as_bytes()))
            .await
            .unwrap();
        assert_eq!(report.winners, 2);
        assert_eq!(report.batches_sent, 3);

        observations.push(server.await.unwrap());
    }

    assert_eq!(observations[0], observations[1]);
}

/// The server vanishing mid-session aborts it with a connection error.
#[tokio::test]
async fn test_server_closes_before_ack() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let len = stream.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        // Drop without acknowledging.
    });

    let mut session = Session::builder(1)
        .server_address(addr.to_string())
        .build()
        .unwrap();
    let result = session
        .run(RecordSource::new("A,B,1,1990-01-01,1\n".as_bytes()))
        .await;
    server.await.unwrap();

    assert!(matches!(result, Err(AgencyError::Connection(_))));
    assert_eq!(session.state(), SessionState::Aborted);
}

/// A refused connection aborts before anything is read from the source.
#[tokio::test]
async fn test_connect_failure_aborts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut session = Session::builder(1)
        .server_address(addr.to_string())
        .build()
        .unwrap();
    let result = session.run(RecordSource::new("".as_bytes())).await;

    assert!(matches!(result, Err(AgencyError::Connection(_))));
    assert_eq!(session.state(), SessionState::Aborted);
}
