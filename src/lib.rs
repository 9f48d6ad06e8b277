//! Client library for payment processors speaking the STX/FS/ETX framed
//! key/value protocol.
//!
//! [`connection::Connection`] owns the socket and multiplexes any number of
//! transactions over it; [`client::ProcessorClient`] abstracts a connected
//! client; and [`authorization::Authorizer`] turns a card payment request
//! into a normalized outcome with retry-safety classification.

pub mod authorization;
pub mod client;
pub mod connection;
pub mod protocol;
pub mod runtime;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_helpers;
