//! Byte transport beneath a connection.
//!
//! The stream is split: the write half stays with the connection while a
//! dedicated reader task owns the read half and forwards each completed read
//! over a bounded channel. The monitor loop drains that channel without
//! waiting, which keeps a pump non-blocking for both plain and TLS streams.

use std::{fmt, io, net::SocketAddr};

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
    time::timeout,
};
use tracing::debug;

use super::{ConnectionConfig, ConnectionError, tls};
use crate::protocol::{READ_CHUNK, READ_QUEUE_DEPTH, WRITE_TIMEOUT};

/// Transport used to reach the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Unencrypted TCP.
    Plain,
    /// TCP wrapped in TLS.
    #[default]
    Tls,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Tls => "tls",
        })
    }
}

/// Outcome of one read issued by the reader task.
#[derive(Debug)]
pub(crate) enum ReadEvent {
    Data(Bytes),
    Closed,
    Failed(io::Error),
}

/// An open transport: the write half plus the reader task's event queue.
///
/// Dropping a transport aborts its reader task, so every exit path releases
/// the read half of the socket.
pub(crate) struct Transport {
    mode: TransportMode,
    peer: SocketAddr,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    events: mpsc::Receiver<ReadEvent>,
    reader: JoinHandle<()>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("mode", &self.mode)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub(crate) fn spawn<S>(stream: S, mode: TransportMode, peer: SocketAddr) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, events) = mpsc::channel(READ_QUEUE_DEPTH);
        let reader = tokio::spawn(read_loop(read_half, tx));
        Self {
            mode,
            peer,
            writer: Box::new(write_half),
            events,
            reader,
        }
    }

    pub(crate) const fn mode(&self) -> TransportMode { self.mode }

    pub(crate) const fn peer(&self) -> SocketAddr { self.peer }

    /// Take the next completed read, if one is queued.
    pub(crate) fn try_next_event(&mut self) -> Option<ReadEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(ReadEvent::Closed),
        }
    }

    /// Write and flush `data` under the write deadline.
    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let writer = &mut self.writer;
        let write = async move {
            writer.write_all(data).await?;
            writer.flush().await
        };
        match timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ConnectionError::Write(err)),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Shut down the write half and stop the reader task.
    pub(crate) async fn shutdown(mut self) {
        if let Err(err) = self.writer.shutdown().await {
            debug!(peer = %self.peer, error = %err, "transport shutdown failed");
        }
        self.reader.abort();
    }
}

impl Drop for Transport {
    fn drop(&mut self) { self.reader.abort(); }
}

async fn read_loop<R>(mut reader: R, events: mpsc::Sender<ReadEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        let event = match reader.read_buf(&mut buf).await {
            Ok(0) => ReadEvent::Closed,
            Ok(_) => ReadEvent::Data(buf.split().freeze()),
            Err(err) => ReadEvent::Failed(err),
        };
        let last = !matches!(event, ReadEvent::Data(_));
        if events.send(event).await.is_err() || last {
            break;
        }
    }
}

/// Open a transport to the configured endpoint.
///
/// # Errors
/// Returns [`ConnectionError::ConnectTimeout`] or
/// [`ConnectionError::ConnectFailed`] for TCP failures, and the TLS variants
/// of [`ConnectionError`] when the handshake cannot complete.
pub(crate) async fn open(
    config: &ConnectionConfig,
    mode: TransportMode,
) -> Result<Transport, ConnectionError> {
    let connect = TcpStream::connect((config.host.as_str(), config.port));
    let tcp = match timeout(config.connect_timeout, connect).await {
        Ok(Ok(tcp)) => tcp,
        Ok(Err(err)) => return Err(ConnectionError::ConnectFailed(err)),
        Err(_) => return Err(ConnectionError::ConnectTimeout),
    };
    tcp.set_nodelay(true).map_err(ConnectionError::ConnectFailed)?;
    let peer = tcp.peer_addr().map_err(ConnectionError::ConnectFailed)?;
    match mode {
        TransportMode::Plain => Ok(Transport::spawn(tcp, mode, peer)),
        TransportMode::Tls => {
            let connector = tls::connector(config.verify_certificate, config.ca_file.as_deref())?;
            let name = tls::server_name(&config.host)?;
            let stream = match timeout(config.connect_timeout, connector.connect(name, tcp)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => return Err(ConnectionError::Handshake(err)),
                Err(_) => return Err(ConnectionError::ConnectTimeout),
            };
            Ok(Transport::spawn(stream, mode, peer))
        }
    }
}
