//! Session builder and state machine.
//!
//! A [`Session`] is one client run:
//! 1. Connect to the server
//! 2. Stream records into batches, send each and wait for its acknowledgment
//! 3. Send the finish notification
//! 4. Wait for the winner count and close
//!
//! Exactly one request is in flight at any time. The response shape to decode
//! is picked from the current [`SessionState`].
//!
//! # Example
//!
//! ```ignore
//! use agency_client::{RecordSource, Session};
//!
//! let mut session = Session::builder(1)
//!     .server_address("127.0.0.1:12345")
//!     .batch_size(100)
//!     .build()?;
//!
//! let source = RecordSource::open("agency-1.csv").await?;
//! let report = session.run(source).await?;
//! println!("winners: {}", report.winners);
//! ```

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{Instrument, Span};

use crate::codec::{Batch, ExpectedResponse, FinishNotification, Response, WagerRecord};
use crate::error::{AgencyError, Result};
use crate::source::{InvalidRecordPolicy, RecordSource};
use crate::transport::Connection;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started.
    Idle,
    /// Connection open, nothing sent yet.
    Connected,
    /// Streaming batches; a batch acknowledgment may be outstanding.
    SendingBatches,
    /// Finish notification sent; the winner result is outstanding.
    AwaitingWinnerResult,
    /// Finished successfully, connection closed.
    Closed,
    /// Stopped on an error or a shutdown request, connection closed.
    Aborted,
}

impl SessionState {
    /// Response shape the server owes in this state, if any.
    pub fn expected_response(self) -> Option<ExpectedResponse> {
        match self {
            SessionState::SendingBatches => Some(ExpectedResponse::BatchAck),
            SessionState::AwaitingWinnerResult => Some(ExpectedResponse::WinnerResult),
            _ => None,
        }
    }

    /// Whether the session has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }
}

/// Summary of a completed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Batches sent and acknowledged.
    pub batches_sent: u32,
    /// Records carried by those batches.
    pub records_sent: u64,
    /// Sum of the accepted counts reported by the server.
    pub records_accepted: u64,
    /// Input lines dropped for having the wrong field count.
    pub skipped_lines: u64,
    /// Input lines dropped for failing record validation.
    pub skipped_records: u64,
    /// Winner count reported by the server.
    pub winners: u32,
}

/// Builder for configuring and creating a [`Session`].
pub struct SessionBuilder {
    client_id: u8,
    server_address: Option<String>,
    batch_size: usize,
    invalid_records: InvalidRecordPolicy,
    span: Option<Span>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl SessionBuilder {
    /// Create a builder for the agency `client_id`.
    pub fn new(client_id: u8) -> Self {
        Self {
            client_id,
            server_address: None,
            batch_size: DEFAULT_BATCH_SIZE,
            invalid_records: InvalidRecordPolicy::default(),
            span: None,
            shutdown: None,
        }
    }

    /// Server `host:port` dialed by [`Session::run`].
    pub fn server_address(mut self, addr: impl Into<String>) -> Self {
        self.server_address = Some(addr.into());
        self
    }

    /// Maximum records per batch.
    ///
    /// Default: 100
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Policy for lines whose fields fail validation.
    ///
    /// Default: skip
    pub fn invalid_records(mut self, policy: InvalidRecordPolicy) -> Self {
        self.invalid_records = policy;
        self
    }

    /// Span every session event is recorded in.
    ///
    /// Default: `session{client_id}` at INFO.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Shutdown flag, checked between steps.
    pub fn shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    /// Validate the configuration and build the session.
    pub fn build(self) -> Result<Session> {
        if self.batch_size == 0 {
            return Err(AgencyError::Config("batch size must be at least 1".to_string()));
        }
        if self.server_address.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(AgencyError::Config("server address is empty".to_string()));
        }

        let client_id = self.client_id;
        Ok(Session {
            client_id,
            server_address: self.server_address,
            batch_size: self.batch_size,
            invalid_records: self.invalid_records,
            span: self
                .span
                .unwrap_or_else(|| tracing::info_span!("session", client_id)),
            shutdown: self.shutdown,
            state: SessionState::Idle,
            batches_started: 0,
        })
    }
}

/// One client run against the server.
pub struct Session {
    client_id: u8,
    server_address: Option<String>,
    batch_size: usize,
    invalid_records: InvalidRecordPolicy,
    span: Span,
    shutdown: Option<watch::Receiver<bool>>,
    state: SessionState,
    /// Batch ids handed out so far; the next id is this value.
    batches_started: u64,
}

impl Session {
    /// Create a new session builder.
    pub fn builder(client_id: u8) -> SessionBuilder {
        SessionBuilder::new(client_id)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn client_id(&self) -> u8 {
        self.client_id
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Dial the server and run the whole session.
    ///
    /// On error the session ends in [`SessionState::Aborted`] with the
    /// connection closed, and the error is returned.
    pub async fn run<R>(&mut self, source: RecordSource<R>) -> Result<SessionReport>
    where
        R: AsyncBufRead + Unpin,
    {
        let span = self.span.clone();
        self.dial_and_exchange(source).instrument(span).await
    }

    /// Run the session over an already-open connection.
    ///
    /// The connection must stamp this session's client id on its frames;
    /// otherwise the call fails with `Config` and the session stays idle.
    pub async fn run_with_connection<S, R>(
        &mut self,
        conn: Connection<S>,
        source: RecordSource<R>,
    ) -> Result<SessionReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        let span = self.span.clone();
        self.exchange_connected(conn, source).instrument(span).await
    }

    async fn dial_and_exchange<R>(&mut self, source: RecordSource<R>) -> Result<SessionReport>
    where
        R: AsyncBufRead + Unpin,
    {
        self.ensure_idle()?;
        let conn = match self.dial().await {
            Ok(conn) => conn,
            Err(e) => return Err(self.abort(e)),
        };
        self.exchange_and_close(conn, source).await
    }

    async fn exchange_connected<S, R>(
        &mut self,
        conn: Connection<S>,
        source: RecordSource<R>,
    ) -> Result<SessionReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        self.ensure_idle()?;
        if conn.sender_id() != self.client_id {
            return Err(AgencyError::Config(format!(
                "connection sends as agency {} but the session is agency {}",
                conn.sender_id(),
                self.client_id
            )));
        }
        self.transition(SessionState::Connected);
        self.exchange_and_close(conn, source).await
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(AgencyError::Protocol(format!(
                "session already ran (state {:?})",
                self.state
            )));
        }
        Ok(())
    }

    async fn dial(&mut self) -> Result<Connection<TcpStream>> {
        self.check_shutdown()?;
        let addr = self
            .server_address
            .as_deref()
            .ok_or_else(|| AgencyError::Config("server address is not set".to_string()))?;

        let conn = Connection::connect(addr, self.client_id).await?;
        tracing::info!(
            action = "connect",
            result = "success",
            server = addr,
            peer = ?conn.peer_addr()
        );
        self.transition(SessionState::Connected);
        Ok(conn)
    }

    async fn exchange_and_close<S, R>(
        &mut self,
        mut conn: Connection<S>,
        mut source: RecordSource<R>,
    ) -> Result<SessionReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        let result = self.exchange(&mut conn, &mut source).await;
        conn.close().await;

        match result {
            Ok(report) => {
                self.transition(SessionState::Closed);
                Ok(report)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    async fn exchange<S, R>(
        &mut self,
        conn: &mut Connection<S>,
        source: &mut RecordSource<R>,
    ) -> Result<SessionReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        let mut report = SessionReport::default();
        self.transition(SessionState::SendingBatches);

        let mut pending = Vec::with_capacity(self.batch_size);
        while let Some(record) = self.next_record(source, &mut report).await? {
            pending.push(record);
            if pending.len() == self.batch_size {
                let records =
                    std::mem::replace(&mut pending, Vec::with_capacity(self.batch_size));
                self.send_batch(conn, records, &mut report).await?;
            }
        }
        if !pending.is_empty() {
            self.send_batch(conn, pending, &mut report).await?;
        }
        report.skipped_lines = source.skipped_lines();

        self.check_shutdown()?;
        let notification = FinishNotification::new(self.client_id);
        conn.send_message(&notification.encode()).await?;
        tracing::info!(
            action = "finish_sent",
            result = "success",
            batches = report.batches_sent
        );
        self.transition(SessionState::AwaitingWinnerResult);

        match self.receive(conn).await? {
            Response::WinnerResult(result) => {
                tracing::info!(action = "winners", result = "success", count = result.winners);
                report.winners = result.winners;
            }
            Response::BatchAck(ack) => {
                return Err(AgencyError::Protocol(format!(
                    "expected a winner result, got {ack:?}"
                )))
            }
        }

        Ok(report)
    }

    /// Next valid record, applying the invalid-record policy.
    async fn next_record<R>(
        &self,
        source: &mut RecordSource<R>,
        report: &mut SessionReport,
    ) -> Result<Option<WagerRecord>>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            match source.next_record().await {
                Err(e)
                    if e.is_record_error() && self.invalid_records == InvalidRecordPolicy::Skip =>
                {
                    report.skipped_records += 1;
                    tracing::warn!(
                        line = source.line_number(),
                        error = %e,
                        "skipping invalid record"
                    );
                }
                other => return other,
            }
        }
    }

    async fn send_batch<S>(
        &mut self,
        conn: &mut Connection<S>,
        records: Vec<WagerRecord>,
        report: &mut SessionReport,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.check_shutdown()?;

        let batch = Batch::new(self.next_batch_id()?, records);
        let payload = batch.encode()?;
        tracing::debug!(
            batch_id = batch.id(),
            count = batch.len(),
            bytes = payload.len(),
            "sending batch"
        );
        conn.send_message(&payload).await?;

        let ack = match self.receive(conn).await? {
            Response::BatchAck(ack) => ack,
            Response::WinnerResult(result) => {
                return Err(AgencyError::Protocol(format!(
                    "expected a batch acknowledgment, got {result:?}"
                )))
            }
        };
        if ack.batch_id != batch.id() {
            return Err(AgencyError::UnexpectedAck {
                expected: batch.id(),
                actual: ack.batch_id,
            });
        }
        if (ack.accepted as usize) < batch.len() {
            tracing::warn!(
                batch_id = ack.batch_id,
                sent = batch.len(),
                accepted = ack.accepted,
                "server accepted fewer records than sent"
            );
        }
        tracing::info!(
            action = "batch_sent",
            result = "success",
            batch_id = ack.batch_id,
            count = ack.accepted
        );

        report.batches_sent += 1;
        report.records_sent += batch.len() as u64;
        report.records_accepted += u64::from(ack.accepted);
        Ok(())
    }

    /// Receive and decode the response owed in the current state.
    async fn receive<S>(&self, conn: &mut Connection<S>) -> Result<Response>
    where
        S: AsyncRead + Unpin,
    {
        let expected = self.state.expected_response().ok_or_else(|| {
            AgencyError::Protocol(format!("no response expected in state {:?}", self.state))
        })?;
        let payload = conn.receive_message().await?;
        expected.decode(&payload)
    }

    fn next_batch_id(&mut self) -> Result<u32> {
        let id = u32::try_from(self.batches_started)
            .map_err(|_| AgencyError::Protocol("batch identifiers exhausted".to_string()))?;
        self.batches_started += 1;
        Ok(id)
    }

    fn check_shutdown(&self) -> Result<()> {
        if self.shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
            tracing::info!(action = "shutdown", state = ?self.state, "shutdown requested");
            return Err(AgencyError::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    fn abort(&mut self, error: AgencyError) -> AgencyError {
        match &error {
            AgencyError::Cancelled => tracing::info!(state = ?self.state, "session cancelled"),
            e => tracing::error!(state = ?self.state, error = %e, "session aborted"),
        }
        self.transition(SessionState::Aborted);
        error
    }
}
