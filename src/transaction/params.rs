//! Key/value body helpers.
//!
//! Requests carry `key="value"\r\n` pairs with embedded quotes doubled.
//! Responses carry `key=value` lines whose values may or may not be quoted.
//! Every scan here is quote-aware: delimiters inside a quoted run are data.

use bytes::{BufMut, BytesMut};

use crate::protocol::{QUOTE, TIMEOUT_FIELD};

/// Yield every byte that sits outside a quoted run, with its offset.
///
/// Quote bytes themselves are never yielded. A doubled quote is an escape and
/// does not toggle the quoted state.
fn unquoted(data: &[u8]) -> impl Iterator<Item = (usize, u8)> + '_ {
    let mut quoted = false;
    let mut skip = false;
    data.iter().enumerate().filter_map(move |(i, &byte)| {
        if skip {
            skip = false;
            return None;
        }
        if byte == QUOTE {
            if data.get(i + 1) == Some(&QUOTE) {
                skip = true;
            } else {
                quoted = !quoted;
            }
            return None;
        }
        (!quoted).then_some((i, byte))
    })
}

/// Split `data` on every unquoted `delim`.
///
/// Empty sections between delimiters are kept; a trailing delimiter does not
/// produce a final empty section.
#[must_use]
pub fn split_unquoted(data: &[u8], delim: u8) -> Vec<&[u8]> {
    let mut sections = Vec::new();
    let mut start = 0;
    for (i, _) in unquoted(data).filter(|&(_, byte)| byte == delim) {
        sections.push(data.get(start..i).unwrap_or_default());
        start = i + 1;
    }
    if start < data.len() {
        sections.push(data.get(start..).unwrap_or_default());
    }
    sections
}

/// Decide whether a response body is a comma-delimited table.
///
/// A body is tabular when an unquoted comma, line feed or carriage return
/// precedes the first unquoted `=`, or when it has no `=` at all.
#[must_use]
pub fn is_tabular(body: &[u8]) -> bool {
    unquoted(body)
        .find(|&(_, byte)| matches!(byte, b'=' | b',' | b'\n' | b'\r'))
        .is_none_or(|(_, byte)| byte != b'=')
}

/// Double every quote in `value` for transmission inside a quoted run.
#[must_use]
pub fn escape_value(value: &str) -> String { value.replace('"', "\"\"") }

fn collapse_quotes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte != QUOTE {
            out.push(byte);
        } else if bytes.next_if_eq(&QUOTE).is_some() {
            out.push(QUOTE);
        }
    }
    out
}

/// Strip quoting from a received value.
///
/// A value wrapped in quotes loses the outer pair. In what remains, doubled
/// quotes become one quote and lone quotes are dropped.
#[must_use]
pub fn unescape_value(value: &[u8]) -> String {
    let collapsed = match value {
        [QUOTE, inner @ .., QUOTE] => collapse_quotes(inner),
        _ => collapse_quotes(value),
    };
    String::from_utf8_lossy(&collapsed).into_owned()
}

/// Append the request body for `fields` to `out`.
///
/// When `timeout_secs` is set a bare `timeout=<secs>` line is appended last.
pub fn encode_fields(fields: &[(String, String)], timeout_secs: Option<u64>, out: &mut BytesMut) {
    for (key, value) in fields {
        out.put_slice(key.as_bytes());
        out.put_slice(b"=\"");
        out.put_slice(escape_value(value).as_bytes());
        out.put_slice(b"\"\r\n");
    }
    if let Some(secs) = timeout_secs {
        out.put_slice(format!("{TIMEOUT_FIELD}={secs}\r\n").as_bytes());
    }
}

/// Decode a key/value response body into pairs in wire order.
///
/// Lines without `=` or with an empty key are skipped. Callers collecting into
/// a map get last-wins semantics for repeated keys.
#[must_use]
pub fn decode_key_values(body: &[u8]) -> Vec<(String, String)> {
    split_unquoted(body, b'\n')
        .into_iter()
        .filter_map(|raw_line| {
            let line = raw_line.trim_ascii();
            let eq = line.iter().position(|&byte| byte == b'=')?;
            let (raw_key, rest) = line.split_at(eq);
            let key = raw_key.trim_ascii();
            if key.is_empty() {
                return None;
            }
            let value = rest.get(1..).unwrap_or_default().trim_ascii();
            Some((String::from_utf8_lossy(key).into_owned(), unescape_value(value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(b"a,\"b,c\",d".as_slice(), b',', vec![b"a".as_slice(), b"\"b,c\"", b"d"])]
    #[case(b"a,,b,".as_slice(), b',', vec![b"a".as_slice(), b"", b"b"])]
    #[case(b"x=\"1\n2\"\ny=3\n".as_slice(), b'\n', vec![b"x=\"1\n2\"".as_slice(), b"y=3"])]
    #[case(b"".as_slice(), b',', Vec::new())]
    #[case(b"\"\"\"\n\"".as_slice(), b'\n', vec![b"\"\"\"\n\"".as_slice()])]
    fn splits_outside_quotes(#[case] data: &[u8], #[case] delim: u8, #[case] expected: Vec<&[u8]>) {
        assert_eq!(split_unquoted(data, delim), expected);
    }

    #[rstest]
    #[case::key_value(b"code=\"AUTH\"\r\n".as_slice(), false)]
    #[case::table(b"a,b\n1,2\n".as_slice(), true)]
    #[case::quoted_comma(b"\"a,b\"=1\n".as_slice(), false)]
    #[case::newline_first(b"\ncode=AUTH".as_slice(), true)]
    #[case::single_column(b"user\nbob\n".as_slice(), true)]
    #[case::no_equals(b"PING".as_slice(), true)]
    #[case::empty(b"".as_slice(), true)]
    fn classifies_bodies(#[case] body: &[u8], #[case] tabular: bool) {
        assert_eq!(is_tabular(body), tabular);
    }

    #[rstest]
    #[case(b"\"plain\"".as_slice(), "plain")]
    #[case(b"say \"\"hi\"\"".as_slice(), "say \"hi\"")]
    #[case(b"\"\"\"\"".as_slice(), "\"")]
    #[case(b"\"\"".as_slice(), "")]
    #[case(b"lone\"quote".as_slice(), "lonequote")]
    #[case(b"\"".as_slice(), "")]
    fn unescapes_values(#[case] raw: &[u8], #[case] expected: &str) {
        assert_eq!(unescape_value(raw), expected);
    }

    #[rstest]
    fn encodes_pairs_in_order_with_trailing_timeout() {
        let fields = vec![
            ("action".to_owned(), "sale".to_owned()),
            ("comments".to_owned(), "6\" ruler".to_owned()),
        ];
        let mut out = BytesMut::new();
        encode_fields(&fields, Some(30), &mut out);
        assert_eq!(
            out.as_ref(),
            b"action=\"sale\"\r\ncomments=\"6\"\" ruler\"\r\ntimeout=30\r\n"
        );
    }

    #[rstest]
    fn decodes_response_lines() {
        let body = b"  code = AUTH \r\n\r\nnoequals\r\n=orphan\r\nverbiage=\"APPROVED, 1\"\r\ncode=DENY";
        let pairs = decode_key_values(body);
        assert_eq!(
            pairs,
            vec![
                ("code".to_owned(), "AUTH".to_owned()),
                ("verbiage".to_owned(), "APPROVED, 1".to_owned()),
                ("code".to_owned(), "DENY".to_owned()),
            ]
        );
    }

    proptest! {
        #[test]
        fn key_values_survive_encoding(
            fields in prop::collection::btree_map(
                "[a-z][a-z0-9_]{0,10}",
                "[a-zA-Z0-9 ,=\"\r\n]{0,24}",
                0..8,
            )
        ) {
            let pairs: Vec<(String, String)> = fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut out = BytesMut::new();
            encode_fields(&pairs, None, &mut out);
            let decoded: BTreeMap<String, String> = decode_key_values(&out).into_iter().collect();
            prop_assert_eq!(decoded, fields);
        }
    }
}
