//! STX/FS/ETX frame encoding and splitting.
//!
//! Encoding produces a complete request frame for a transaction. Splitting
//! pulls one complete frame off the front of the inbound buffer, leaving a
//! partial frame untouched until more bytes arrive.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Transaction, TransactionId, errors::ProtocolError, params::encode_fields};
use crate::protocol::{ETX, FS, PING_BODY, STX};

/// One complete frame taken from the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Transaction the frame answers.
    pub id: TransactionId,
    /// Bytes between FS and ETX.
    pub body: Bytes,
}

/// Encode the request frame for `tx`.
///
/// Pings carry the bare `PING` token; every other transaction carries its
/// fields followed by the optional `timeout` pair.
#[must_use]
pub fn encode_request(tx: &Transaction, timeout_secs: Option<u64>) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u8(STX);
    out.put_slice(tx.id().to_string().as_bytes());
    out.put_u8(FS);
    if tx.is_ping() {
        out.put_slice(PING_BODY);
    } else {
        encode_fields(tx.fields(), timeout_secs, &mut out);
    }
    out.put_u8(ETX);
    out.freeze()
}

/// Split one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` when `buf` is empty or no ETX has arrived yet; the
/// buffer is left untouched in that case.
///
/// # Errors
/// Returns a [`ProtocolError`] when the stream is corrupt: the buffer does not
/// start with STX, the frame has no FS, or the id is not a decimal integer.
#[must_use = "handle the result"]
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    if first != STX {
        return Err(ProtocolError::MissingStx(first));
    }
    let Some(etx) = buf.iter().position(|&byte| byte == ETX) else {
        return Ok(None);
    };
    let frame = buf.split_to(etx + 1).freeze();
    let fs = frame
        .iter()
        .take(etx)
        .position(|&byte| byte == FS)
        .ok_or(ProtocolError::MissingFs)?;
    let raw_id = frame.slice(1..fs);
    let id = std::str::from_utf8(&raw_id)
        .ok()
        .and_then(|text| text.trim().parse::<u32>().ok())
        .ok_or_else(|| ProtocolError::InvalidId(String::from_utf8_lossy(&raw_id).into_owned()))?;
    Ok(Some(Frame {
        id: TransactionId::new(id),
        body: frame.slice(fs + 1..etx),
    }))
}
