//! Client seam between the authorization adapter and a processor connection.
//!
//! [`ProcessorClient`] is the port the [`crate::authorization::Authorizer`]
//! drives. [`NativeClient`] implements it over the in-crate protocol
//! [`Connection`]; other bindings plug in behind the same trait and are chosen
//! when the authorizer is built.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    connection::{Connection, ConnectionConfig, ConnectionError, TransportMode},
    transaction::{Response, TransactionId},
};

/// Operations the authorization adapter needs from a processor client.
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// Whether the client believes its connection is usable.
    fn is_connected(&self) -> bool;

    /// Description of the most recent connection failure.
    fn connection_error(&self) -> String;

    /// Register a new transaction.
    fn new_transaction(&self) -> TransactionId;

    /// Set an input field on a new transaction.
    ///
    /// # Errors
    /// Returns an error for unknown or already-sent transactions.
    fn set_field(&self, id: TransactionId, key: &str, value: &str) -> Result<(), ConnectionError>;

    /// Pump the connection once as a liveness check.
    ///
    /// # Errors
    /// Returns an error when the connection is down or a fatal I/O error occurs.
    async fn check_connection(&self) -> Result<(), ConnectionError>;

    /// Send a transaction and wait for its response.
    ///
    /// # Errors
    /// Returns an error when the frame cannot be queued or the connection
    /// fails while waiting.
    async fn send(&self, id: TransactionId) -> Result<(), ConnectionError>;

    /// Parsed response of a completed transaction.
    fn response(&self, id: TransactionId) -> Option<Response>;

    /// Release a transaction.
    ///
    /// # Errors
    /// Returns an error when the transaction cannot be removed.
    fn delete_transaction(&self, id: TransactionId) -> Result<(), ConnectionError>;

    /// Flag the connection unusable until it is re-established.
    fn mark_not_connected(&self);

    /// Close the connection.
    async fn disconnect(&self);
}

/// [`ProcessorClient`] backed by the native protocol [`Connection`].
#[derive(Debug, Clone)]
pub struct NativeClient {
    connection: Arc<Connection>,
    plaintext_fallback: bool,
}

impl NativeClient {
    /// Wrap a new connection for `config`. Plaintext fallback is off.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            connection: Arc::new(Connection::new(config)),
            plaintext_fallback: false,
        }
    }

    /// Allow [`NativeClient::connect`] to retry without TLS.
    #[must_use]
    pub const fn with_plaintext_fallback(mut self, enabled: bool) -> Self {
        self.plaintext_fallback = enabled;
        self
    }

    /// Return the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Arc<Connection> { &self.connection }

    /// Connect in blocking mode with `request_timeout` sent on every request.
    ///
    /// TLS is tried first when the configured transport is TLS; on failure,
    /// and only when plaintext fallback is enabled, the connect is retried
    /// over plain TCP.
    ///
    /// # Errors
    /// Returns the error from the last connect attempt.
    pub async fn connect(&self, request_timeout: Option<Duration>) -> Result<(), ConnectionError> {
        let config = self.connection.config();
        info!(host = %config.host, port = config.port, mode = %config.mode, "connecting to processor");
        self.connection.set_blocking(true);
        self.connection.set_timeout(request_timeout);
        match self.connection.connect().await {
            Ok(()) => Ok(()),
            Err(err) if self.plaintext_fallback && config.mode == TransportMode::Tls => {
                warn!(host = %config.host, error = %err, "TLS connect failed; trying without TLS");
                self.connection.connect_using(TransportMode::Plain).await
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ProcessorClient for NativeClient {
    fn is_connected(&self) -> bool { self.connection.is_connected() }

    fn connection_error(&self) -> String { self.connection.connection_error() }

    fn new_transaction(&self) -> TransactionId { self.connection.new_transaction() }

    fn set_field(&self, id: TransactionId, key: &str, value: &str) -> Result<(), ConnectionError> {
        self.connection.set_field(id, key, value)
    }

    async fn check_connection(&self) -> Result<(), ConnectionError> { self.connection.monitor().await }

    async fn send(&self, id: TransactionId) -> Result<(), ConnectionError> {
        self.connection.send_and_wait(id).await
    }

    fn response(&self, id: TransactionId) -> Option<Response> { self.connection.response(id).ok() }

    fn delete_transaction(&self, id: TransactionId) -> Result<(), ConnectionError> {
        self.connection.delete_transaction(id)
    }

    fn mark_not_connected(&self) { self.connection.mark_not_connected(); }

    async fn disconnect(&self) { self.connection.disconnect().await; }
}
