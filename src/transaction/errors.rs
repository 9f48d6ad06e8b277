//! Error types for transaction bookkeeping and frame parsing.

use thiserror::Error;

use super::TransactionId;

/// Errors raised when a transaction is used out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The id is not present in the connection's registry.
    #[error("unknown transaction {0}")]
    Unknown(TransactionId),
    /// Fields can only be set, and a transaction only sent, while it is new.
    #[error("transaction {0} has already been sent")]
    NotNew(TransactionId),
    /// The response is only readable once the transaction is done.
    #[error("transaction {0} has not completed")]
    NotDone(TransactionId),
}

/// Fatal errors detected while splitting frames out of the inbound stream.
///
/// Any of these means the stream is corrupt; the connection must be torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The buffer did not begin with the start-of-text byte.
    #[error("protocol error, responses must start with STX (got 0x{0:02x})")]
    MissingStx(u8),
    /// No field separator between the id and the body.
    #[error("protocol error, responses must contain a FS")]
    MissingFs,
    /// The id between STX and FS is not a decimal integer.
    #[error("protocol error, invalid transaction id {0:?}")]
    InvalidId(String),
}
