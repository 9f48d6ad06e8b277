//! Error type for connection lifecycle and the monitor loop.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::transaction::{ProtocolError, TransactionError};

/// Errors raised while connecting to, or exchanging frames with, a processor.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The TCP connect did not finish within the configured bound.
    #[error("Connection Timeout")]
    ConnectTimeout,
    /// The TCP connect was refused or otherwise failed.
    #[error("Connection Failed: {0}")]
    ConnectFailed(#[source] io::Error),
    /// The host cannot be used as a TLS server name.
    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),
    /// The rustls client configuration could not be built.
    #[error("TLS configuration failed: {0}")]
    TlsConfig(#[from] rustls::Error),
    /// The CA bundle could not be read or contained no usable certificate.
    #[error("cannot load CA file {}: {reason}", path.display())]
    CaFile {
        /// Bundle that failed to load.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },
    /// The TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
    /// The verification ping did not complete successfully in time.
    #[error("PING request failed")]
    PingFailed,
    /// No transport is open.
    #[error("not connected")]
    NotConnected,
    /// Reading from the transport failed.
    #[error("read failure: {0}")]
    Read(#[source] io::Error),
    /// The processor closed its side of the connection.
    #[error("read failure: remote disconnect")]
    RemoteDisconnect,
    /// Writing the outbound buffer failed.
    #[error("write failure: {0}")]
    Write(#[source] io::Error),
    /// Writing the outbound buffer did not finish in time.
    #[error("write failure: timed out")]
    WriteTimeout,
    /// The inbound stream is corrupt.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A transaction was used out of order or does not exist.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl ConnectionError {
    /// Whether this error tore down an established transport.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Read(_)
                | Self::RemoteDisconnect
                | Self::Write(_)
                | Self::WriteTimeout
                | Self::Protocol(_)
        )
    }
}
