//! Layered gateway configuration.
//!
//! Values are merged from lowest to highest precedence: built-in defaults, a
//! TOML file, `PAYGATE_`-prefixed environment variables, then flags given on
//! the command line.

use std::{path::PathBuf, time::Duration};

use cli_defs::GatewayArgs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    authorization::DEFAULT_MAX_IN_FLIGHT,
    connection::{ConnectionConfig, TransportMode},
    protocol::CONNECT_TIMEOUT,
};

/// File read from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "paygate.toml";
/// Prefix of the environment variables consulted.
pub const ENV_PREFIX: &str = "PAYGATE_";

/// Settings for reaching the processor and running the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Processor host name.
    pub host: String,
    /// Processor port.
    pub port: u16,
    /// Transport to connect with.
    pub transport: TransportMode,
    /// Verify the processor's certificate in TLS mode.
    pub verify_tls_certificate: bool,
    /// Extra trusted certificates, PEM encoded.
    pub ca_file: Option<PathBuf>,
    /// Retry over plain TCP when the TLS connect fails.
    pub plaintext_fallback: bool,
    /// Seconds allowed for the TCP connect and TLS handshake.
    pub connect_timeout_secs: u64,
    /// Seconds sent as the `timeout` field of every request; 0 omits it.
    pub request_timeout_secs: u64,
    /// Send a verification ping after connecting.
    pub verify_connection: bool,
    /// Authorizations allowed in flight at once.
    pub max_in_flight: usize,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8665,
            transport: TransportMode::Tls,
            verify_tls_certificate: true,
            ca_file: None,
            plaintext_fallback: false,
            connect_timeout_secs: CONNECT_TIMEOUT.as_secs(),
            request_timeout_secs: 30,
            verify_connection: true,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            log_level: "info".to_owned(),
        }
    }
}

impl GatewayConfig {
    /// Merge every configuration source, with `args` taking precedence.
    ///
    /// `./paygate.toml` is skipped silently when absent; a file named with
    /// `--config` must exist.
    ///
    /// # Errors
    /// Returns a [`figment::Error`] when the explicit file is missing or a
    /// value has the wrong type.
    pub fn load(args: &GatewayArgs) -> Result<Self, figment::Error> {
        let file = match &args.config {
            Some(path) if !path.is_file() => {
                return Err(figment::Error::from(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            Some(path) => path.clone(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(args))
            .extract()
    }

    /// Connection settings derived from this configuration.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        let config = ConnectionConfig::new(self.host.clone(), self.port)
            .with_mode(self.transport)
            .with_verify_certificate(self.verify_tls_certificate)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_verify_connection(self.verify_connection);
        match &self.ca_file {
            Some(path) => config.with_ca_file(path.clone()),
            None => config,
        }
    }

    /// Timeout sent with each request, if any.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_secs))
        }
    }
}
