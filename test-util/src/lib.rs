//! Utilities for integration tests.
//!
//! The `test-util` crate provides an in-process mock payment processor that
//! speaks the STX/FS/ETX protocol over TCP. It records every request it
//! receives and answers through a caller-supplied responder, so suites can
//! drive the real client against a socket without a processor installation.
//!
//! [`MockProcessor::start_tls`] serves the same protocol behind a generated
//! self-signed certificate.
//!
//! The framing here is written independently of the `paygate` codec so that
//! a codec bug cannot hide itself in both ends of a test.

pub mod protocol;
pub mod server;
pub mod tls;

pub use protocol::{RecordedRequest, frame};
pub use server::{MockProcessor, Reply};
pub use tls::CERTIFICATE_NAMES;

/// Boxed error returned by integration tests.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;
