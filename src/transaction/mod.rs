//! Transactions multiplexed over a processor connection.
//!
//! A [`Transaction`] is one request/response exchange tracked by a
//! [`TransactionId`] for the lifetime of a single call. Its input fields are
//! mutable only while it is [`TransactionStatus::New`]; once the monitor loop
//! matches a response frame to it the parsed [`Response`] becomes readable and
//! the status moves to [`TransactionStatus::Done`].
//!
//! The wire codec lives in [`frame`] (STX/FS/ETX framing), [`params`]
//! (key/value bodies) and [`table`] (comma-delimited bodies).

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;

pub mod errors;
pub mod frame;
pub mod params;
pub mod registry;
pub mod table;

pub use errors::{ProtocolError, TransactionError};
pub use frame::{Frame, encode_request, split_frame};
pub use params::{decode_key_values, encode_fields, escape_value, is_tabular, unescape_value};
pub use registry::TransactionRegistry;
pub use table::Table;

use crate::protocol::{ACTION_FIELD, PING_ACTION};

/// Identifier assigned to a transaction by its connection.
///
/// Identifiers are small positive integers that never repeat within a
/// connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(u32);

impl TransactionId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self { Self(raw) }

    /// Return the raw identifier.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl From<u32> for TransactionId {
    fn from(raw: u32) -> Self { Self(raw) }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Created; fields may still be set.
    New,
    /// Encoded and queued for the processor; awaiting a response frame.
    Sent,
    /// A response frame has been parsed and attached.
    Done,
}

/// Coarse success/failure derived from a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStatus {
    /// Tabular response, or a `code` of `AUTH` or `SUCCESS`.
    Success,
    /// Any other key/value response.
    Fail,
}

/// Parsed body of a response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Flat `key=value` lines.
    KeyValue(BTreeMap<String, String>),
    /// Comma-delimited grid whose first row is the header.
    Tabular(Table),
}

/// A response frame matched to its transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    raw: Bytes,
    body: ResponseBody,
}

impl Response {
    /// Classify and parse a raw response body.
    #[must_use]
    pub fn parse(raw: Bytes) -> Self {
        let body = if is_tabular(&raw) {
            ResponseBody::Tabular(Table::parse(&raw))
        } else {
            ResponseBody::KeyValue(decode_key_values(&raw).into_iter().collect())
        };
        Self { raw, body }
    }

    /// Return the unparsed body bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] { &self.raw }

    /// Return the parsed body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody { &self.body }

    /// Whether the body was comma-delimited.
    #[must_use]
    pub const fn is_tabular(&self) -> bool { matches!(self.body, ResponseBody::Tabular(_)) }

    /// Return the parsed grid for a tabular response.
    #[must_use]
    pub const fn table(&self) -> Option<&Table> {
        match &self.body {
            ResponseBody::Tabular(table) => Some(table),
            ResponseBody::KeyValue(_) => None,
        }
    }

    /// Look up a response field; `None` when absent or when the body is tabular.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        match &self.body {
            ResponseBody::KeyValue(map) => map.get(key).map(String::as_str),
            ResponseBody::Tabular(_) => None,
        }
    }

    /// Return every response field name.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        match &self.body {
            ResponseBody::KeyValue(map) => map.keys().map(String::as_str).collect(),
            ResponseBody::Tabular(_) => Vec::new(),
        }
    }

    /// Result code such as `AUTH`, `DENY` or `RETRY`.
    #[must_use]
    pub fn code(&self) -> Option<&str> { self.param("code") }

    /// Authorization number issued by the processor.
    #[must_use]
    pub fn auth_code(&self) -> Option<&str> { self.param("auth") }

    /// Card brand reported by the processor.
    #[must_use]
    pub fn card_type(&self) -> Option<&str> { self.param("cardtype") }

    /// Processor transaction id.
    #[must_use]
    pub fn ttid(&self) -> Option<&str> { self.param("ttid") }

    /// Settlement batch the transaction was assigned to.
    #[must_use]
    pub fn batch(&self) -> Option<&str> { self.param("batch") }

    /// Processor-specific hard result code.
    #[must_use]
    pub fn phard_code(&self) -> Option<&str> { self.param("phard_code") }

    /// Gateway-specific soft result code.
    #[must_use]
    pub fn msoft_code(&self) -> Option<&str> { self.param("msoft_code") }

    /// Human-readable result text.
    #[must_use]
    pub fn verbiage(&self) -> Option<&str> { self.param("verbiage") }

    /// Collapse the response into a success/failure flag.
    #[must_use]
    pub fn return_status(&self) -> ReturnStatus {
        if self.is_tabular() {
            return ReturnStatus::Success;
        }
        match self.code() {
            Some(code)
                if code.eq_ignore_ascii_case("AUTH") || code.eq_ignore_ascii_case("SUCCESS") =>
            {
                ReturnStatus::Success
            }
            _ => ReturnStatus::Fail,
        }
    }

    /// Render every field as `key=value` followed by `delimiter`.
    #[must_use]
    pub fn describe(&self, delimiter: &str) -> String {
        match &self.body {
            ResponseBody::KeyValue(map) => map
                .iter()
                .map(|(key, value)| format!("{key}={value}{delimiter}"))
                .collect(),
            ResponseBody::Tabular(_) => String::from_utf8_lossy(&self.raw).into_owned(),
        }
    }
}

/// One request/response exchange tracked by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    status: TransactionStatus,
    fields: Vec<(String, String)>,
    response: Option<Response>,
}

impl Transaction {
    /// Create an empty transaction in the `New` state.
    #[must_use]
    pub const fn new(id: TransactionId) -> Self {
        Self {
            id,
            status: TransactionStatus::New,
            fields: Vec::new(),
            response: None,
        }
    }

    /// Return the transaction id.
    #[must_use]
    pub const fn id(&self) -> TransactionId { self.id }

    /// Return the lifecycle state.
    #[must_use]
    pub const fn status(&self) -> TransactionStatus { self.status }

    /// Return the input fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] { &self.fields }

    /// Return the response once the transaction is `Done`.
    #[must_use]
    pub const fn response(&self) -> Option<&Response> { self.response.as_ref() }

    /// Whether this transaction is a connection verification ping.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.fields
            .iter()
            .any(|(key, value)| key == ACTION_FIELD && value.eq_ignore_ascii_case(PING_ACTION))
    }

    /// Set an input field, replacing any earlier value for the same key
    /// without changing its position.
    ///
    /// # Errors
    /// Returns [`TransactionError::NotNew`] once the transaction has been sent.
    pub fn set_field(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TransactionError> {
        if self.status != TransactionStatus::New {
            return Err(TransactionError::NotNew(self.id));
        }
        let name = key.into();
        let text = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = text,
            None => self.fields.push((name, text)),
        }
        Ok(())
    }

    /// Move the transaction to `Sent`.
    ///
    /// # Errors
    /// Returns [`TransactionError::NotNew`] if it was already sent.
    pub fn mark_sent(&mut self) -> Result<(), TransactionError> {
        if self.status != TransactionStatus::New {
            return Err(TransactionError::NotNew(self.id));
        }
        self.status = TransactionStatus::Sent;
        Ok(())
    }

    /// Attach a parsed response and move the transaction to `Done`.
    pub fn complete(&mut self, response: Response) {
        self.response = Some(response);
        self.status = TransactionStatus::Done;
    }
}
