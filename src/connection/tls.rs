//! rustls client configuration for processor connections.
//!
//! Verifying mode trusts the bundled web PKI roots plus an optional PEM
//! bundle. Insecure mode accepts any server certificate but still checks
//! handshake signatures; it exists for legacy processors with self-signed
//! certificates and is only used when explicitly configured.

use std::{path::Path, sync::Arc};

use rustls::{
    ClientConfig,
    DigitallySignedStruct,
    RootCertStore,
    SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime, pem::PemObject},
};
use tokio_rustls::TlsConnector;

use super::ConnectionError;

fn provider() -> Arc<CryptoProvider> { Arc::new(rustls::crypto::ring::default_provider()) }

/// Build a connector for the given verification policy.
///
/// # Errors
/// Returns [`ConnectionError::CaFile`] when `ca_file` cannot be loaded and
/// [`ConnectionError::TlsConfig`] when rustls rejects the configuration.
pub fn connector(verify: bool, ca_file: Option<&Path>) -> Result<TlsConnector, ConnectionError> {
    let provider = provider();
    let builder =
        ClientConfig::builder_with_provider(Arc::clone(&provider)).with_safe_default_protocol_versions()?;
    let config = if verify {
        builder
            .with_root_certificates(root_store(ca_file)?)
            .with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

fn root_store(ca_file: Option<&Path>) -> Result<RootCertStore, ConnectionError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    if let Some(path) = ca_file {
        let ca_error = |reason: String| ConnectionError::CaFile {
            path: path.to_path_buf(),
            reason,
        };
        let certs = CertificateDer::pem_file_iter(path)
            .map_err(|err| ca_error(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ca_error(err.to_string()))?;
        if certs.is_empty() {
            return Err(ca_error("no certificates found".to_owned()));
        }
        for cert in certs {
            roots.add(cert)?;
        }
    }
    Ok(roots)
}

/// Resolve the TLS server name for `host`, which may be a DNS name or an IP.
///
/// # Errors
/// Returns [`ConnectionError::InvalidServerName`] for anything else.
pub fn server_name(host: &str) -> Result<ServerName<'static>, ConnectionError> {
    ServerName::try_from(host.to_owned())
        .map_err(|_| ConnectionError::InvalidServerName(host.to_owned()))
}

/// Accepts any certificate chain while still verifying handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
