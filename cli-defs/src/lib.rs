//! Shared CLI type definitions for paygate build and runtime.
//!
//! This crate provides CLI argument types used by both the `build.rs` script
//! (for man page generation) and the `paygate` binary. Keeping them apart from
//! the library lets the build script render the man page without compiling
//! the TLS and async stack.
//!
//! Gateway options are all optional here: an unset flag leaves the value from
//! the configuration file or environment in place, so the fields skip
//! serialization when absent.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Connection settings accepted on the command line.
#[derive(Args, Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct GatewayArgs {
    /// Configuration file to read instead of `./paygate.toml`.
    #[arg(long, global = true)]
    #[serde(skip)]
    pub config: Option<PathBuf>,
    /// Processor host name.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Processor port.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Transport to use (`plain` or `tls`).
    #[arg(long, global = true, value_parser = ["plain", "tls"])]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Verify the processor's TLS certificate.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_tls_certificate: Option<bool>,
    /// PEM bundle of extra trusted certificates.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Retry over plain TCP when the TLS connect fails.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext_fallback: Option<bool>,
    /// Seconds allowed for the TCP connect and TLS handshake.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// Seconds the processor may spend on each request.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Send a verification ping after connecting.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_connection: Option<bool>,
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Kind of authorization requested with `authorize`.
#[derive(ValueEnum, Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModeArg {
    /// Authorize and capture.
    #[default]
    Normal,
    /// Hold funds for later finalization.
    Preauth,
    /// Complete an earlier preauth.
    Finalize,
}

/// Arguments for the `authorize` subcommand.
#[derive(Args, Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeArgs {
    /// Merchant user name.
    #[arg(long)]
    pub merchant: String,
    /// Merchant password.
    #[arg(long)]
    pub password: String,
    /// Amount with at most two decimals, for example `4.90`.
    #[arg(long)]
    pub amount: String,
    /// Card number.
    #[arg(long, requires = "expdate", conflicts_with = "trackdata")]
    pub account: Option<String>,
    /// Card expiry as `MMYY`.
    #[arg(long, requires = "account")]
    pub expdate: Option<String>,
    /// Track two data read from the card.
    #[arg(long)]
    pub trackdata: Option<String>,
    /// Authorization mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Normal)]
    pub mode: ModeArg,
    /// Processor id of the preauth being finalized.
    #[arg(long)]
    pub ttid: Option<i32>,
    /// Order number.
    #[arg(long)]
    pub order: Option<String>,
    /// Customer reference.
    #[arg(long)]
    pub custref: Option<String>,
    /// Station identifier.
    #[arg(long)]
    pub station: Option<String>,
    /// Reference echoed back as the receipt reference.
    #[arg(long, default_value = "cli")]
    pub receipt: String,
}

/// Arguments for the `query` subcommand.
#[derive(Args, Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct QueryArgs {
    /// Request field as `key=value`; repeat for each field.
    #[arg(long = "field", required = true, value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

/// CLI subcommands exposed by `paygate`.
#[derive(Subcommand, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Connect, verify the link with a ping and disconnect.
    Ping,
    /// Authorize one payment and print the outcome.
    Authorize(AuthorizeArgs),
    /// Send arbitrary fields and print the response.
    Query(QueryArgs),
}

/// Top-level CLI entry point consumed by the binary and the build script.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[command(name = "paygate", author, version, about)]
pub struct Cli {
    /// Gateway connection settings.
    #[command(flatten)]
    pub gateway: GatewayArgs,
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}
