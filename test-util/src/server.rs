//! Mock processor harness used by integration suites.
//!
//! The processor listens on an ephemeral loopback port and is torn down, with
//! every open connection, when the [`MockProcessor`] is dropped.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    task::{JoinHandle, JoinSet},
};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::{
    protocol::{RecordedRequest, frame, take_frame},
    tls::SelfSigned,
};

/// Body sent in answer to a verification ping.
pub const PING_SUCCESS: &[u8] = b"code=\"SUCCESS\"\r\n";

/// How the mock answers one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Frame `body` with the request's transaction id.
    Body(Vec<u8>),
    /// Write these bytes verbatim.
    Raw(Vec<u8>),
    /// Send nothing.
    Silent,
    /// Close the connection without answering.
    Close,
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> Reply + Send + Sync>;
type Requests = Arc<Mutex<Vec<RecordedRequest>>>;

fn lock(requests: &Mutex<Vec<RecordedRequest>>) -> MutexGuard<'_, Vec<RecordedRequest>> {
    match requests.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// An in-process processor speaking the framed protocol over TCP.
pub struct MockProcessor {
    addr: SocketAddr,
    requests: Requests,
    connections: Arc<AtomicUsize>,
    certificate_pem: Option<String>,
    accept_task: JoinHandle<()>,
}

impl MockProcessor {
    /// Start a processor that answers pings with success and hands every
    /// other request to `responder`.
    ///
    /// # Errors
    /// Returns an error if the loopback listener cannot be bound.
    pub async fn start<F>(responder: F) -> io::Result<Self>
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        Self::start_raw(move |request| {
            if request.is_ping() {
                Reply::Body(PING_SUCCESS.to_vec())
            } else {
                responder(request)
            }
        })
        .await
    }

    /// Start a processor that hands every request, pings included, to
    /// `responder`.
    ///
    /// # Errors
    /// Returns an error if the loopback listener cannot be bound.
    pub async fn start_raw<F>(responder: F) -> io::Result<Self>
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        Self::listen(Arc::new(responder), None).await
    }

    /// Start a processor like [`MockProcessor::start`] that only speaks TLS,
    /// presenting a freshly generated self-signed certificate.
    ///
    /// # Errors
    /// Returns an error if the certificate cannot be generated or the
    /// loopback listener cannot be bound.
    pub async fn start_tls<F>(responder: F) -> io::Result<Self>
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let identity = SelfSigned::generate()?;
        let answer: Responder = Arc::new(move |request: &RecordedRequest| {
            if request.is_ping() {
                Reply::Body(PING_SUCCESS.to_vec())
            } else {
                responder(request)
            }
        });
        Self::listen(answer, Some(identity)).await
    }

    async fn listen(responder: Responder, identity: Option<SelfSigned>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Requests::default();
        let connections = Arc::new(AtomicUsize::new(0));
        let certificate_pem = identity.as_ref().map(|tls| tls.pem.clone());
        let accept_task = tokio::spawn(accept_loop(
            listener,
            identity.map(|tls| tls.acceptor),
            responder,
            Arc::clone(&requests),
            Arc::clone(&connections),
        ));
        Ok(Self {
            addr,
            requests,
            connections,
            certificate_pem,
            accept_task,
        })
    }

    /// PEM certificate presented by a TLS processor.
    #[must_use]
    pub fn certificate_pem(&self) -> Option<&str> { self.certificate_pem.as_deref() }

    /// Address the processor listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr { self.addr }

    /// Port the processor listens on.
    #[must_use]
    pub const fn port(&self) -> u16 { self.addr.port() }

    /// Every request received so far, pings included.
    #[must_use]
    pub fn all_requests(&self) -> Vec<RecordedRequest> { lock(&self.requests).clone() }

    /// Requests received so far, excluding pings.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests)
            .iter()
            .filter(|request| !request.is_ping())
            .cloned()
            .collect()
    }

    /// Connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize { self.connections.load(Ordering::Acquire) }
}

impl Drop for MockProcessor {
    fn drop(&mut self) { self.accept_task.abort(); }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    responder: Responder,
    requests: Requests,
    connections: Arc<AtomicUsize>,
) {
    let mut sessions = JoinSet::new();
    while let Ok((stream, peer)) = listener.accept().await {
        connections.fetch_add(1, Ordering::AcqRel);
        debug!(%peer, "mock processor accepted connection");
        let session_responder = Arc::clone(&responder);
        let session_requests = Arc::clone(&requests);
        match acceptor.clone() {
            None => {
                sessions.spawn(serve(stream, session_responder, session_requests));
            }
            Some(tls) => {
                sessions.spawn(async move {
                    match tls.accept(stream).await {
                        Ok(secured) => serve(secured, session_responder, session_requests).await,
                        Err(error) => debug!(%peer, %error, "mock processor TLS handshake failed"),
                    }
                });
            }
        }
    }
}

async fn serve<S>(mut stream: S, responder: Responder, requests: Requests)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let read = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(read) => read,
        };
        buf.extend_from_slice(chunk.get(..read).unwrap_or_default());
        while let Some(request) = take_frame(&mut buf) {
            lock(&requests).push(request.clone());
            let bytes = match responder(&request) {
                Reply::Body(body) => frame(&request.id, &body),
                Reply::Raw(bytes) => bytes,
                Reply::Silent => continue,
                Reply::Close => return,
            };
            if stream.write_all(&bytes).await.is_err() {
                return;
            }
        }
    }
}
