//! Authorization failures and their retry classification.

use thiserror::Error;

use crate::connection::ConnectionError;

/// Reasons an authorization call produced no outcome.
///
/// [`AuthorizationError::allow_retry`] tells the supervising caller whether
/// the request can be resent without risk of charging the card twice.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// The client reported itself disconnected before anything was sent.
    #[error("not connected to processor: {0}")]
    NotConnected(String),
    /// Finalization needs the processor id of the earlier preauth.
    #[error("preauth ttid for finalization of {receipt} is missing")]
    MissingPreauthTtid {
        /// Caller reference of the request.
        receipt: String,
    },
    /// A request field could not be set on the transaction.
    #[error("cannot populate transaction {receipt}: {source}")]
    Populate {
        /// Caller reference of the request.
        receipt: String,
        /// Underlying client error.
        source: ConnectionError,
    },
    /// The liveness check before sending failed.
    #[error("server connection error for transaction {receipt}: {source}")]
    ConnectionCheck {
        /// Caller reference of the request.
        receipt: String,
        /// Underlying client error.
        source: ConnectionError,
    },
    /// The send itself failed; the connection has been marked unusable.
    #[error("failed to send transaction {receipt}: {source}")]
    Send {
        /// Caller reference of the request.
        receipt: String,
        /// Underlying client error.
        source: ConnectionError,
    },
    /// The processor answered `RETRY`.
    #[error("processor says retry transaction {receipt}, but aborting: {note}")]
    ProcessorRetry {
        /// Caller reference of the request.
        receipt: String,
        /// Codes and verbiage returned with the `RETRY`.
        note: String,
    },
    /// The send completed but no response is attached to the transaction.
    #[error("no response for transaction {receipt}")]
    MissingResponse {
        /// Caller reference of the request.
        receipt: String,
    },
    /// The concurrency limiter was closed.
    #[error("authorization limiter closed")]
    LimiterClosed,
}

impl AuthorizationError {
    /// Whether the request is known not to have reached the processor.
    ///
    /// A `RETRY` answer is never retry-safe: the processor's own guidance is
    /// ambiguous, so the call is surfaced for an operator decision instead.
    #[must_use]
    pub const fn allow_retry(&self) -> bool {
        match self {
            Self::NotConnected(_)
            | Self::Populate { .. }
            | Self::ConnectionCheck { .. }
            | Self::Send { .. }
            | Self::LimiterClosed => true,
            Self::MissingPreauthTtid { .. }
            | Self::ProcessorRetry { .. }
            | Self::MissingResponse { .. } => false,
        }
    }
}
