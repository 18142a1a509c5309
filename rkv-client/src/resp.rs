//! # RESP2 Encoding and Parsing
//!
//! Purpose: Frame commands as RESP2 arrays of bulk strings and decode server
//! responses into [`Reply`] values.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Responses are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::{BufRead, Read};

use bytes::{BufMut, BytesMut};
use rkv_common::{Reply, RkvError, RkvResult};

use crate::conn::Arg;

/// Largest bulk string accepted from the server (the RESP2 limit).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

// Upper bound on capacity reserved from an untrusted length header.
const MAX_PREALLOC: usize = 1024;

/// Encodes a command and its arguments as a RESP2 array into `out`.
pub fn encode_command(cmd: &str, args: &[Arg], out: &mut BytesMut) {
    out.put_u8(b'*');
    push_usize(out, args.len() + 1);
    out.put_slice(b"\r\n");
    push_bulk(out, cmd.as_bytes());

    for arg in args {
        match arg {
            Arg::Bytes(data) => push_bulk(out, data),
            Arg::Str(text) => push_bulk(out, text.as_bytes()),
            Arg::Int(value) => push_bulk(out, value.to_string().as_bytes()),
            Arg::Float(value) => push_bulk(out, value.to_string().as_bytes()),
        }
    }
}

/// Reads one RESP value from the buffered reader.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> RkvResult<Reply> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(RkvError::Protocol("empty line".into()));
    }

    match line_buf[0] {
        b'+' => Ok(Reply::Status(String::from_utf8_lossy(&line_buf[1..]).into_owned())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(&line_buf[1..]).into_owned())),
        b':' => Ok(Reply::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf)
        }
        prefix => Err(RkvError::Protocol(format!(
            "unknown type prefix: {:#04x}",
            prefix
        ))),
    }
}

fn parse_bulk_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> RkvResult<Reply> {
    if len < 0 {
        return Ok(Reply::Nil);
    }
    if len > MAX_BULK_LEN {
        return Err(RkvError::Protocol(format!("bulk length {} exceeds limit", len)));
    }
    let len = len as usize;
    let mut data = Vec::with_capacity(len.min(MAX_PREALLOC));
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(RkvError::Protocol("bulk string truncated".into()));
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(RkvError::Protocol("bulk string missing CRLF".into()));
    }

    line_buf.clear();
    Ok(Reply::Bytes(data))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> RkvResult<Reply> {
    // `*-1` is the null array; `*0` is a present but empty array.
    if len < 0 {
        return Ok(Reply::Nil);
    }

    let mut items = Vec::with_capacity((len as usize).min(MAX_PREALLOC));
    for _ in 0..len {
        items.push(read_reply(reader, line_buf)?);
    }
    Ok(Reply::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> RkvResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(RkvError::Protocol("connection closed by peer".into()));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(RkvError::Protocol("line missing CRLF".into()));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> RkvResult<i64> {
    if data.is_empty() {
        return Err(RkvError::Protocol("empty integer".into()));
    }
    let mut negative = false;
    let mut idx = 0;
    if data[0] == b'-' {
        negative = true;
        idx = 1;
    }
    if idx == data.len() {
        return Err(RkvError::Protocol("empty integer".into()));
    }

    let mut value: i64 = 0;
    while idx < data.len() {
        let b = data[idx];
        if !b.is_ascii_digit() {
            return Err(RkvError::Protocol(format!(
                "invalid integer: {}",
                String::from_utf8_lossy(data)
            )));
        }
        let digit = (b - b'0') as i64;
        // Accumulate toward the sign so i64::MIN stays representable.
        let next = value.checked_mul(10).and_then(|shifted| {
            if negative {
                shifted.checked_sub(digit)
            } else {
                shifted.checked_add(digit)
            }
        });
        value = next.ok_or_else(|| {
            RkvError::Protocol(format!(
                "integer overflow: {}",
                String::from_utf8_lossy(data)
            ))
        })?;
        idx += 1;
    }

    Ok(value)
}

fn push_bulk(out: &mut BytesMut, data: &[u8]) {
    out.put_u8(b'$');
    push_usize(out, data.len());
    out.put_slice(b"\r\n");
    out.put_slice(data);
    out.put_slice(b"\r\n");
}

fn push_usize(out: &mut BytesMut, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.put_u8(buf[idx]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(input: &[u8]) -> RkvResult<Reply> {
        let mut reader = Cursor::new(input.to_vec());
        let mut line = Vec::new();
        read_reply(&mut reader, &mut line)
    }

    #[test]
    fn encodes_command_with_mixed_args() {
        let mut buf = BytesMut::new();
        encode_command("SET", &[Arg::from("key"), Arg::from(42i64)], &mut buf);
        assert_eq!(&buf[..], b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n42\r\n");
    }

    #[test]
    fn encodes_bare_command() {
        let mut buf = BytesMut::new();
        encode_command("PING", &[], &mut buf);
        assert_eq!(&buf[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn parses_status() {
        assert_eq!(parse(b"+OK\r\n").unwrap(), Reply::Status("OK".into()));
    }

    #[test]
    fn parses_bulk_string() {
        assert_eq!(parse(b"$5\r\nhello\r\n").unwrap(), Reply::from("hello"));
    }

    #[test]
    fn parses_null_bulk_and_null_array() {
        assert_eq!(parse(b"$-1\r\n").unwrap(), Reply::Nil);
        assert_eq!(parse(b"*-1\r\n").unwrap(), Reply::Nil);
    }

    #[test]
    fn parses_integer_and_error() {
        assert_eq!(parse(b":-42\r\n").unwrap(), Reply::Integer(-42));
        assert_eq!(parse(b"-ERR bad\r\n").unwrap(), Reply::Error("ERR bad".into()));
    }

    #[test]
    fn parses_nested_array_with_nil() {
        let reply = parse(b"*3\r\n*2\r\n$1\r\n1\r\n$1\r\n2\r\n$-1\r\n:7\r\n").unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Array(vec![Reply::from("1"), Reply::from("2")]),
                Reply::Nil,
                Reply::Integer(7),
            ])
        );
    }

    #[test]
    fn empty_array_is_not_nil() {
        assert_eq!(parse(b"*0\r\n").unwrap(), Reply::Array(Vec::new()));
    }

    #[test]
    fn rejects_oversized_lengths_without_allocating() {
        assert!(matches!(
            parse(b"*4611686018427387903\r\n"),
            Err(RkvError::Protocol(_))
        ));
        assert!(matches!(
            parse(b"$99999999999999999999\r\n"),
            Err(RkvError::Protocol(_))
        ));
        assert!(matches!(
            parse(b"$4611686018427387903\r\n"),
            Err(RkvError::Protocol(_))
        ));
    }

    #[test]
    fn rejects_truncated_bulk_string() {
        assert!(matches!(parse(b"$10\r\nabc"), Err(RkvError::Protocol(_))));
    }

    #[test]
    fn parses_integer_extremes_and_rejects_overflow() {
        assert_eq!(parse(b":-9223372036854775808\r\n").unwrap(), Reply::Integer(i64::MIN));
        assert_eq!(parse(b":9223372036854775807\r\n").unwrap(), Reply::Integer(i64::MAX));
        assert!(matches!(
            parse(b":9223372036854775808\r\n"),
            Err(RkvError::Protocol(_))
        ));
    }

    #[test]
    fn rejects_bad_framing() {
        assert!(matches!(parse(b"?what\r\n"), Err(RkvError::Protocol(_))));
        assert!(matches!(parse(b":12\n"), Err(RkvError::Protocol(_))));
        assert!(matches!(parse(b":1x\r\n"), Err(RkvError::Protocol(_))));
        assert!(matches!(parse(b""), Err(RkvError::Protocol(_))));
    }
}
