//! One logical link to a processor endpoint.
//!
//! A [`Connection`] owns the transport, the inbound and outbound byte buffers
//! and the [`TransactionRegistry`]. Callers share a connection through an
//! `Arc`: the registry takes its own short-lived lock so lookups by id never
//! wait on I/O, while the transport and buffers sit behind a single async
//! mutex so only one caller pumps the socket at a time.

use std::{
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::{
    sync::Mutex as AsyncMutex,
    time::{Instant, sleep},
};
use tracing::{info, warn};

pub mod errors;
mod monitor;
pub mod tls;
pub mod transport;

pub use errors::ConnectionError;
pub use transport::TransportMode;
use transport::Transport;

use crate::{
    protocol::{ACTION_FIELD, CONNECT_TIMEOUT, PING_ACTION, PING_POLL_INTERVAL, PING_TIMEOUT, SEND_POLL_INTERVAL},
    transaction::{
        Response,
        ReturnStatus,
        TransactionError,
        TransactionId,
        TransactionRegistry,
        TransactionStatus,
        encode_request,
    },
};

/// Endpoint and policy for a [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Processor host name or IP address.
    pub host: String,
    /// Processor port.
    pub port: u16,
    /// Transport used by [`Connection::connect`].
    pub mode: TransportMode,
    /// Verify the server certificate chain and host name in TLS mode.
    pub verify_certificate: bool,
    /// Extra PEM bundle trusted alongside the web PKI roots.
    pub ca_file: Option<PathBuf>,
    /// Bound on the TCP connect and the TLS handshake.
    pub connect_timeout: Duration,
    /// Send a ping after connecting and fail unless it succeeds.
    pub verify_connection: bool,
}

impl ConnectionConfig {
    /// Configuration for `host:port` with verifying TLS and a connect ping.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            mode: TransportMode::Tls,
            verify_certificate: true,
            ca_file: None,
            connect_timeout: CONNECT_TIMEOUT,
            verify_connection: true,
        }
    }

    /// Select the transport.
    #[must_use]
    pub const fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable certificate verification.
    #[must_use]
    pub const fn with_verify_certificate(mut self, verify: bool) -> Self {
        self.verify_certificate = verify;
        self
    }

    /// Trust an extra PEM bundle.
    #[must_use]
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Bound the connect and handshake.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable the post-connect ping.
    #[must_use]
    pub const fn with_verify_connection(mut self, verify: bool) -> Self {
        self.verify_connection = verify;
        self
    }
}

#[derive(Debug, Default)]
struct IoState {
    transport: Option<Transport>,
    inbound: BytesMut,
    outbound: BytesMut,
}

/// A processor connection shared by concurrent callers.
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    io: AsyncMutex<IoState>,
    registry: TransactionRegistry,
    connected: AtomicBool,
    blocking: AtomicBool,
    timeout_secs: AtomicU64,
    last_error: Mutex<String>,
}

impl Connection {
    /// Create an unconnected, non-blocking connection without a request timeout.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            io: AsyncMutex::new(IoState::default()),
            registry: TransactionRegistry::new(),
            connected: AtomicBool::new(false),
            blocking: AtomicBool::new(false),
            timeout_secs: AtomicU64::new(0),
            last_error: Mutex::new(String::new()),
        }
    }

    /// Return the endpoint configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig { &self.config }

    /// Make [`Connection::send`] pump until the transaction completes.
    pub fn set_blocking(&self, blocking: bool) { self.blocking.store(blocking, Ordering::Release); }

    /// Whether [`Connection::send`] waits for the response.
    #[must_use]
    pub fn is_blocking(&self) -> bool { self.blocking.load(Ordering::Acquire) }

    /// Set the server-side timeout sent with every request. Sub-second
    /// durations are rounded down; `None` or zero sends no timeout.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        let secs = timeout.map_or(0, |t| t.as_secs());
        self.timeout_secs.store(secs, Ordering::Release);
    }

    /// Return the server-side request timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs.load(Ordering::Acquire) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Whether the transport is up and no fatal error has occurred since.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    /// Flag the connection unusable until the next successful connect.
    pub fn mark_not_connected(&self) { self.connected.store(false, Ordering::Release); }

    /// Message describing the most recent connect or transport failure.
    #[must_use]
    pub fn connection_error(&self) -> String { self.last_error_guard().clone() }

    fn last_error_guard(&self) -> std::sync::MutexGuard<'_, String> {
        match self.last_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record_error(&self, err: &ConnectionError) { *self.last_error_guard() = err.to_string(); }

    /// Connect using the configured transport.
    ///
    /// # Errors
    /// Returns the transport failure, or [`ConnectionError::PingFailed`] when
    /// verification is enabled and the ping does not succeed within five
    /// seconds. The message is also kept for [`Connection::connection_error`].
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.connect_using(self.config.mode).await
    }

    /// Connect using `mode`, replacing any open transport.
    ///
    /// # Errors
    /// As for [`Connection::connect`].
    pub async fn connect_using(&self, mode: TransportMode) -> Result<(), ConnectionError> {
        {
            let mut io = self.io.lock().await;
            self.close(&mut io).await;
            match transport::open(&self.config, mode).await {
                Ok(transport) => {
                    info!(
                        host = %self.config.host,
                        port = self.config.port,
                        peer = %transport.peer(),
                        mode = %transport.mode(),
                        "connected to processor"
                    );
                    io.transport = Some(transport);
                }
                Err(err) => {
                    warn!(host = %self.config.host, port = self.config.port, error = %err, "connect failed");
                    self.record_error(&err);
                    return Err(err);
                }
            }
            self.last_error_guard().clear();
            self.connected.store(true, Ordering::Release);
        }
        if self.config.verify_connection && !self.verify_ping().await {
            let err = ConnectionError::PingFailed;
            warn!(host = %self.config.host, error = %err, "connection verification failed");
            self.record_error(&err);
            let mut io = self.io.lock().await;
            self.close(&mut io).await;
            return Err(err);
        }
        Ok(())
    }

    async fn verify_ping(&self) -> bool {
        let id = self.new_transaction();
        let verified = self.await_ping(id).await.is_ok_and(|status| status == Some(ReturnStatus::Success));
        self.registry.remove(id);
        verified
    }

    async fn await_ping(&self, id: TransactionId) -> Result<Option<ReturnStatus>, ConnectionError> {
        self.set_field(id, ACTION_FIELD, PING_ACTION)?;
        self.enqueue(id).await?;
        let deadline = Instant::now() + PING_TIMEOUT;
        loop {
            self.monitor().await?;
            if self.status(id) != Some(TransactionStatus::Sent) || Instant::now() >= deadline {
                break;
            }
            sleep(PING_POLL_INTERVAL).await;
        }
        Ok(self.return_status(id))
    }

    /// Close the transport and discard every transaction. Safe to call when
    /// never connected.
    pub async fn disconnect(&self) {
        let mut io = self.io.lock().await;
        if io.transport.is_some() {
            info!(host = %self.config.host, port = self.config.port, "disconnecting from processor");
        }
        self.close(&mut io).await;
        self.registry.clear();
    }

    async fn close(&self, io: &mut IoState) {
        self.connected.store(false, Ordering::Release);
        if let Some(transport) = io.transport.take() {
            transport.shutdown().await;
        }
        io.inbound.clear();
        io.outbound.clear();
    }

    /// Transport of the open connection, if any.
    pub async fn transport_mode(&self) -> Option<TransportMode> {
        self.io.lock().await.transport.as_ref().map(Transport::mode)
    }

    /// Register a new transaction and return its id.
    pub fn new_transaction(&self) -> TransactionId { self.registry.create() }

    /// Set an input field on a new transaction.
    ///
    /// # Errors
    /// Returns [`TransactionError::Unknown`] for unregistered ids and
    /// [`TransactionError::NotNew`] once the transaction has been sent.
    pub fn set_field(
        &self,
        id: TransactionId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        self.registry
            .update(id, |tx| tx.set_field(key, value))
            .ok_or(TransactionError::Unknown(id))??;
        Ok(())
    }

    /// Queue the transaction's frame; in blocking mode, pump the monitor loop
    /// until its response arrives.
    ///
    /// # Errors
    /// Returns [`ConnectionError::NotConnected`] without a transport, a
    /// [`TransactionError`] for unknown or already-sent ids, and any fatal
    /// monitor error raised while waiting.
    pub async fn send(&self, id: TransactionId) -> Result<(), ConnectionError> {
        if self.is_blocking() {
            return self.send_and_wait(id).await;
        }
        self.enqueue(id).await
    }

    /// Queue the transaction's frame and pump the monitor loop until its
    /// response arrives, whatever the blocking flag says.
    ///
    /// # Errors
    /// As for [`Connection::send`].
    pub async fn send_and_wait(&self, id: TransactionId) -> Result<(), ConnectionError> {
        self.enqueue(id).await?;
        loop {
            self.monitor().await?;
            if self.status(id) != Some(TransactionStatus::Sent) {
                return Ok(());
            }
            sleep(SEND_POLL_INTERVAL).await;
        }
    }

    async fn enqueue(&self, id: TransactionId) -> Result<(), ConnectionError> {
        let mut io = self.io.lock().await;
        if io.transport.is_none() {
            return Err(ConnectionError::NotConnected);
        }
        let timeout_secs = self.timeout().map(|t| t.as_secs());
        let frame = self
            .registry
            .update(id, |tx| {
                tx.mark_sent()?;
                Ok::<_, TransactionError>(encode_request(tx, timeout_secs))
            })
            .ok_or(TransactionError::Unknown(id))??;
        io.outbound.extend_from_slice(&frame);
        Ok(())
    }

    /// Status of `id`, or `None` when it is not registered.
    #[must_use]
    pub fn status(&self, id: TransactionId) -> Option<TransactionStatus> {
        self.registry.update(id, |tx| tx.status())
    }

    /// Success or failure of a completed transaction.
    #[must_use]
    pub fn return_status(&self, id: TransactionId) -> Option<ReturnStatus> {
        self.registry
            .update(id, |tx| tx.response().map(Response::return_status))
            .flatten()
    }

    /// Parsed response of a completed transaction.
    ///
    /// # Errors
    /// Returns [`TransactionError::Unknown`] or [`TransactionError::NotDone`].
    pub fn response(&self, id: TransactionId) -> Result<Response, ConnectionError> {
        let response = self
            .registry
            .update(id, |tx| tx.response().cloned())
            .ok_or(TransactionError::Unknown(id))?
            .ok_or(TransactionError::NotDone(id))?;
        Ok(response)
    }

    /// Field names of a completed key/value response.
    #[must_use]
    pub fn response_keys(&self, id: TransactionId) -> Option<Vec<String>> {
        self.registry
            .update(id, |tx| {
                tx.response()
                    .map(|r| r.keys().into_iter().map(str::to_owned).collect())
            })
            .flatten()
    }

    /// One field of a completed key/value response.
    #[must_use]
    pub fn response_param(&self, id: TransactionId, key: &str) -> Option<String> {
        self.registry
            .update(id, |tx| tx.response().and_then(|r| r.param(key)).map(str::to_owned))
            .flatten()
    }

    /// Unparsed body of a completed response.
    #[must_use]
    pub fn raw_response(&self, id: TransactionId) -> Option<Bytes> {
        self.registry
            .update(id, |tx| tx.response().map(|r| Bytes::copy_from_slice(r.raw())))
            .flatten()
    }

    /// Remove a transaction from the registry.
    ///
    /// # Errors
    /// Returns [`TransactionError::Unknown`] if it is not registered.
    pub fn delete_transaction(&self, id: TransactionId) -> Result<(), ConnectionError> {
        self.registry.remove(id).ok_or(TransactionError::Unknown(id))?;
        Ok(())
    }

    /// Ids whose responses have arrived but have not been deleted.
    #[must_use]
    pub fn completed_transactions(&self) -> Vec<TransactionId> { self.registry.completed_ids() }

    /// Number of registered transactions.
    #[must_use]
    pub fn transactions_in_queue(&self) -> usize { self.registry.len() }

    /// Whether every queued frame has been written to the transport.
    pub async fn transactions_sent(&self) -> bool { self.io.lock().await.outbound.is_empty() }

    #[cfg(test)]
    pub(crate) async fn attach<S>(&self, stream: S)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        let peer = std::net::SocketAddr::from(([127, 0, 0, 1], self.config.port));
        self.io.lock().await.transport = Some(Transport::spawn(stream, self.config.mode, peer));
        self.connected.store(true, Ordering::Release);
    }
}
