//! Self-signed TLS identity for the mock processor.

use std::{io, sync::Arc};

use rcgen::{CertifiedKey, generate_simple_self_signed};
use rustls::{
    ServerConfig,
    pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
};
use tokio_rustls::TlsAcceptor;

/// Names the generated certificate is valid for.
pub const CERTIFICATE_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

/// A freshly generated certificate and the acceptor serving it.
#[derive(Clone)]
pub(crate) struct SelfSigned {
    pub(crate) pem: String,
    pub(crate) acceptor: TlsAcceptor,
}

impl SelfSigned {
    /// Generate a certificate for [`CERTIFICATE_NAMES`].
    pub(crate) fn generate() -> io::Result<Self> {
        let names: Vec<String> = CERTIFICATE_NAMES.iter().map(|name| (*name).to_owned()).collect();
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(names).map_err(io::Error::other)?;
        let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .map_err(io::Error::other)?;
        Ok(Self {
            pem: cert.pem(),
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }
}
