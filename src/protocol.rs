//! Constants for the processor wire protocol.
//!
//! Every request and response travels as a single frame:
//!
//! ```text
//! 0x02 <ascii-decimal-id> 0x1C <BODY> 0x03
//! ```
//!
//! The body of a request is a sequence of `key="value"\r\n` pairs, or the bare
//! token `PING` for a connection verification request. Responses carry either
//! `key=value` lines or a comma-delimited table whose first row is the header.
use std::time::Duration;

/// Start-of-text byte opening every frame.
pub const STX: u8 = 0x02;
/// File-separator byte splitting the transaction id from the body.
pub const FS: u8 = 0x1C;
/// End-of-text byte closing every frame.
pub const ETX: u8 = 0x03;
/// Quote byte used to enclose values; doubled to escape.
pub const QUOTE: u8 = b'"';

/// Body sent in place of key/value pairs for a verification ping.
pub const PING_BODY: &[u8] = b"PING";
/// Value of the `action` field that marks a transaction as a ping.
pub const PING_ACTION: &str = "ping";

/// Field carrying the requested action on every request.
pub const ACTION_FIELD: &str = "action";
/// Field appended to requests when a server-side timeout is configured.
pub const TIMEOUT_FIELD: &str = "timeout";

/// Default bound on establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for the verification ping sent after connecting.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on flushing the outbound buffer to the transport.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between monitor pumps while waiting on the verification ping.
pub const PING_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Pause between monitor pumps while a blocking send waits for its reply.
pub const SEND_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Size of each read issued against the transport.
pub const READ_CHUNK: usize = 8192;
/// Number of completed reads the reader task may queue ahead of the monitor.
pub const READ_QUEUE_DEPTH: usize = 64;
