//! RESP (REdis Serialization Protocol) framing for the control socket
//!
//! Accepts RESP2 arrays from clients and, for telnet-style use, inline
//! commands (a bare line of whitespace-separated words).

use bytes::{Buf, BytesMut};
use std::io::Cursor;
use webmon::{split_on_separators, FieldLimit};

/// Largest bulk string accepted (16 MB) - a full snapshot fits comfortably
const MAX_BULK_STRING_SIZE: usize = 16 * 1024 * 1024;

/// Largest array accepted - no command takes more than a handful of arguments
const MAX_ARRAY_SIZE: usize = 64;

/// Longest inline command line
const MAX_INLINE_SIZE: usize = 64 * 1024;

/// RESP data types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -Error message\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n
    BulkString(Option<Vec<u8>>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// `-ERR <msg>`
    pub fn err(msg: impl AsRef<str>) -> Self {
        RespValue::Error(format!("ERR {}", msg.as_ref()))
    }

    /// Bulk string from text
    pub fn text(s: impl Into<String>) -> Self {
        RespValue::BulkString(Some(s.into().into_bytes()))
    }

    /// Payload of a non-null bulk string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Payload of a non-null bulk string, if it is UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|data| std::str::from_utf8(data).ok())
    }

    /// Serialize to RESP format
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            RespValue::SimpleString(s) => format!("+{}\r\n", s).into_bytes(),
            RespValue::Error(e) => format!("-{}\r\n", e).into_bytes(),
            RespValue::Integer(i) => format!(":{}\r\n", i).into_bytes(),
            RespValue::BulkString(None) => b"$-1\r\n".to_vec(),
            RespValue::BulkString(Some(data)) => {
                let mut out = format!("${}\r\n", data.len()).into_bytes();
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
                out
            }
            RespValue::Array(None) => b"*-1\r\n".to_vec(),
            RespValue::Array(Some(items)) => {
                let mut out = format!("*{}\r\n", items.len()).into_bytes();
                for item in items {
                    out.extend_from_slice(&item.serialize());
                }
                out
            }
        }
    }

    /// Parse one value from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; consumed bytes are only
    /// removed from `buf` once a complete value has been read.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, String> {
        if buf.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&buf[..]);
        let value = match buf[0] {
            b'+' | b'-' | b':' | b'$' | b'*' => parse_value(&mut cursor)?,
            _ => parse_inline(&mut cursor)?,
        };

        if value.is_some() {
            let consumed = cursor.position() as usize;
            buf.advance(consumed);
        }
        Ok(value)
    }
}

fn parse_value(cursor: &mut Cursor<&[u8]>) -> Result<Option<RespValue>, String> {
    if !cursor.has_remaining() {
        return Ok(None);
    }

    let type_byte = cursor.get_u8();
    let line = match read_line(cursor, MAX_INLINE_SIZE)? {
        Some(line) => line,
        None => return Ok(None),
    };

    match type_byte {
        b'+' => Ok(Some(RespValue::SimpleString(utf8(line)?))),
        b'-' => Ok(Some(RespValue::Error(utf8(line)?))),
        b':' => Ok(Some(RespValue::Integer(integer(line)?))),
        b'$' => parse_bulk_string(cursor, integer(line)?),
        b'*' => parse_array(cursor, integer(line)?),
        other => Err(format!("unknown RESP type: {}", other as char)),
    }
}

fn parse_bulk_string(cursor: &mut Cursor<&[u8]>, len: i64) -> Result<Option<RespValue>, String> {
    if len == -1 {
        return Ok(Some(RespValue::BulkString(None)));
    }

    let len = usize::try_from(len).map_err(|_| format!("invalid bulk length: {}", len))?;
    if len > MAX_BULK_STRING_SIZE {
        return Err(format!(
            "bulk string too large: {} bytes (max: {} bytes)",
            len, MAX_BULK_STRING_SIZE
        ));
    }

    if cursor.remaining() < len + 2 {
        return Ok(None);
    }

    let mut data = vec![0u8; len];
    cursor.copy_to_slice(&mut data);

    if cursor.get_u8() != b'\r' || cursor.get_u8() != b'\n' {
        return Err("expected \\r\\n after bulk string".to_string());
    }

    Ok(Some(RespValue::BulkString(Some(data))))
}

fn parse_array(cursor: &mut Cursor<&[u8]>, len: i64) -> Result<Option<RespValue>, String> {
    if len == -1 {
        return Ok(Some(RespValue::Array(None)));
    }

    let len = usize::try_from(len).map_err(|_| format!("invalid array length: {}", len))?;
    if len > MAX_ARRAY_SIZE {
        return Err(format!(
            "array too large: {} elements (max: {} elements)",
            len, MAX_ARRAY_SIZE
        ));
    }

    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        match parse_value(cursor)? {
            Some(item) => items.push(item),
            None => return Ok(None),
        }
    }

    Ok(Some(RespValue::Array(Some(items))))
}

/// Inline command: words separated by spaces or tabs, terminated by a newline
fn parse_inline(cursor: &mut Cursor<&[u8]>) -> Result<Option<RespValue>, String> {
    let start = cursor.position() as usize;
    let data: &[u8] = *cursor.get_ref();
    let slice = &data[start..];

    let end = match slice.iter().position(|&b| b == b'\n') {
        Some(end) => end,
        None if slice.len() > MAX_INLINE_SIZE => {
            return Err(format!("inline command longer than {} bytes", MAX_INLINE_SIZE))
        }
        None => return Ok(None),
    };
    cursor.set_position((start + end + 1) as u64);

    let line = std::str::from_utf8(&slice[..end]).map_err(|e| e.to_string())?;
    let words = split_on_separators(Some(line), &[' ', '\t', '\r'], FieldLimit::Unbounded, false);

    Ok(Some(RespValue::Array(Some(
        words
            .into_iter()
            .map(|word| RespValue::BulkString(Some(word.as_bytes().to_vec())))
            .collect(),
    ))))
}

fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>, limit: usize) -> Result<Option<&'a [u8]>, String> {
    let start = cursor.position() as usize;
    let data: &'a [u8] = *cursor.get_ref();
    let slice = &data[start..];

    match slice.windows(2).position(|w| w == b"\r\n") {
        Some(end) => {
            cursor.set_position((start + end + 2) as u64);
            Ok(Some(&slice[..end]))
        }
        None if slice.len() > limit => Err(format!("line longer than {} bytes", limit)),
        None => Ok(None),
    }
}

fn utf8(line: &[u8]) -> Result<String, String> {
    String::from_utf8(line.to_vec()).map_err(|e| e.to_string())
}

fn integer(line: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(line)
        .map_err(|e| e.to_string())?
        .parse::<i64>()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(data: &[u8]) -> RespValue {
        let mut buf = BytesMut::from(data);
        let value = RespValue::parse(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        value
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse_one(b"+OK\r\n"), RespValue::ok());
        assert_eq!(parse_one(b"-ERR nope\r\n"), RespValue::err("nope"));
        assert_eq!(parse_one(b":1000\r\n"), RespValue::Integer(1000));
        assert_eq!(parse_one(b"$-1\r\n"), RespValue::BulkString(None));
        assert_eq!(RespValue::Integer(-3).serialize(), b":-3\r\n");
    }

    #[test]
    fn test_bulk_string_binary() {
        let value = parse_one(b"$5\r\nGE\r\nT\r\n");
        assert_eq!(value.as_bytes(), Some(&b"GE\r\nT"[..]));
        assert_eq!(value.serialize(), b"$5\r\nGE\r\nT\r\n");
    }

    #[test]
    fn test_command_array() {
        let value = parse_one(b"*3\r\n$7\r\nOBSERVE\r\n$8\r\n10.0.0.1\r\n$3\r\nGET\r\n");
        match value {
            RespValue::Array(Some(items)) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].as_str(), Some("OBSERVE"));
                assert_eq!(items[1].as_str(), Some("10.0.0.1"));
                assert_eq!(items[2].as_str(), Some("GET"));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_command() {
        let value = parse_one(b"  DOMAINS\r\n");
        assert_eq!(value, RespValue::Array(Some(vec![RespValue::text("DOMAINS")])));

        let value = parse_one(b"PING  hello\n");
        assert_eq!(
            value,
            RespValue::Array(Some(vec![RespValue::text("PING"), RespValue::text("hello")]))
        );
    }

    #[test]
    fn test_incomplete_data() {
        for partial in [&b"$6\r\nfoo"[..], &b"*2\r\n$3\r\nfoo\r\n"[..], &b":12"[..], &b"PING"[..]] {
            let mut buf = BytesMut::from(partial);
            assert!(RespValue::parse(&mut buf).unwrap().is_none());
            assert_eq!(&buf[..], partial);
        }
    }

    #[test]
    fn test_pipelined_values() {
        let mut buf = BytesMut::from(&b"+A\r\n+B\r\n"[..]);
        assert_eq!(
            RespValue::parse(&mut buf).unwrap(),
            Some(RespValue::SimpleString("A".to_string()))
        );
        assert_eq!(
            RespValue::parse(&mut buf).unwrap(),
            Some(RespValue::SimpleString("B".to_string()))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_limits() {
        let mut buf = BytesMut::from(&b"*1000\r\n"[..]);
        assert!(RespValue::parse(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"$-5\r\n"[..]);
        assert!(RespValue::parse(&mut buf).is_err());

        let mut buf = BytesMut::from(format!("${}\r\n", MAX_BULK_STRING_SIZE + 1).as_bytes());
        assert!(RespValue::parse(&mut buf).is_err());
    }
}
