//! Frame helpers shared by the mock processor and integration suites.

/// Start of frame.
pub const STX: u8 = 0x02;
/// Separates the transaction id from the body.
pub const FS: u8 = 0x1c;
/// End of frame.
pub const ETX: u8 = 0x03;

/// Build a frame carrying `body` for transaction `id`.
#[must_use]
pub fn frame(id: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(id.len() + body.len() + 3);
    out.push(STX);
    out.extend_from_slice(id.as_bytes());
    out.push(FS);
    out.extend_from_slice(body);
    out.push(ETX);
    out
}

/// Take the first complete frame off `buf`, discarding any bytes before STX.
pub(crate) fn take_frame(buf: &mut Vec<u8>) -> Option<RecordedRequest> {
    let start = buf.iter().position(|&b| b == STX)?;
    let end = start + buf.iter().skip(start).position(|&b| b == ETX)?;
    let raw: Vec<u8> = buf.drain(..=end).skip(start).collect();
    let inner = raw.get(1..raw.len() - 1)?;
    let fs = inner.iter().position(|&b| b == FS)?;
    let (id, body) = inner.split_at(fs);
    Some(RecordedRequest {
        id: String::from_utf8_lossy(id).into_owned(),
        body: body.get(1..).unwrap_or_default().to_vec(),
    })
}

/// One request frame received by the mock processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Transaction id exactly as sent.
    pub id: String,
    /// Body between FS and ETX.
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Whether the body is the bare `PING` token.
    #[must_use]
    pub fn is_ping(&self) -> bool { self.body == b"PING" }

    /// Body as lossy UTF-8.
    #[must_use]
    pub fn text(&self) -> String { String::from_utf8_lossy(&self.body).into_owned() }

    /// Value of `key` in a `key="value"` body, with doubled quotes collapsed.
    ///
    /// Lines are split naively, which is enough for test values that do not
    /// contain line breaks.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<String> {
        self.text().split("\r\n").find_map(|line| {
            let (name, raw) = line.split_once('=')?;
            (name == key).then(|| {
                raw.strip_prefix('"')
                    .and_then(|quoted| quoted.strip_suffix('"'))
                    .unwrap_or(raw)
                    .replace("\"\"", "\"")
            })
        })
    }

    /// Field names in the order they were sent.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.text()
            .split("\r\n")
            .filter_map(|line| line.split_once('=').map(|(name, _)| name.to_owned()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn takes_frames_in_order() {
        let mut buf = frame("1", b"PING");
        buf.extend(frame("2", b"a=\"b\"\r\n"));
        buf.extend_from_slice(&[STX, b'3']);
        let first = take_frame(&mut buf).expect("first");
        assert_eq!(first.id, "1");
        assert!(first.is_ping());
        let second = take_frame(&mut buf).expect("second");
        assert_eq!(second.field("a").as_deref(), Some("b"));
        assert!(take_frame(&mut buf).is_none());
        assert_eq!(buf, [STX, b'3']);
    }

    #[rstest]
    fn reads_quoted_fields() {
        let request = RecordedRequest {
            id: "4".to_owned(),
            body: b"username=\"m1\"\r\nnote=\"say \"\"hi\"\"\"\r\ntimeout=30\r\n".to_vec(),
        };
        assert_eq!(request.field("note").as_deref(), Some("say \"hi\""));
        assert_eq!(request.field("timeout").as_deref(), Some("30"));
        assert_eq!(request.keys(), ["username", "note", "timeout"]);
        assert_eq!(request.field("missing"), None);
    }
}
