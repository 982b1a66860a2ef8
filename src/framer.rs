//! Line framing over an accumulating byte buffer.
//!
//! Connections append raw socket reads to a `BytesMut` and call
//! [`extract_line`] until it returns `None`. Any line-ending convention
//! is accepted: `\n`, `\r\n`, or a lone `\r`.

use bytes::{Buf, BytesMut};

/// Extract the next complete line from `buf`, removing the line and its
/// terminator. Returns `None` when no terminator is buffered yet, leaving
/// the buffer untouched.
///
/// A `\r` that is the last buffered byte is not treated as a terminator:
/// it may be the first half of a `\r\n` split across two reads. This keeps
/// framing independent of how the bytes were chunked on the wire.
pub fn extract_line(buf: &mut BytesMut) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n' || b == b'\r')?;

    let term_len = if buf[pos] == b'\n' {
        1
    } else {
        // \r: look ahead for a paired \n
        match buf.get(pos + 1) {
            None => return None,
            Some(b'\n') => 2,
            Some(_) => 1,
        }
    };

    let line = buf.split_to(pos);
    buf.advance(term_len);
    Some(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buf: &mut BytesMut) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = extract_line(buf) {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_no_terminator() {
        let mut buf = BytesMut::from(&b"partial"[..]);
        assert_eq!(extract_line(&mut buf), None);
        assert_eq!(&buf[..], b"partial");
    }

    #[test]
    fn test_lf_terminator() {
        let mut buf = BytesMut::from(&b"hello\nrest"[..]);
        assert_eq!(extract_line(&mut buf).as_deref(), Some("hello"));
        assert_eq!(&buf[..], b"rest");
    }

    #[test]
    fn test_crlf_terminator() {
        let mut buf = BytesMut::from(&b"hello\r\nrest"[..]);
        assert_eq!(extract_line(&mut buf).as_deref(), Some("hello"));
        assert_eq!(&buf[..], b"rest");
    }

    #[test]
    fn test_lone_cr_terminator() {
        let mut buf = BytesMut::from(&b"hello\rworld\n"[..]);
        assert_eq!(drain(&mut buf), vec!["hello", "world"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_trailing_cr_held_back() {
        let mut buf = BytesMut::from(&b"hello\r"[..]);
        // Could be the start of \r\n; wait for the next byte.
        assert_eq!(extract_line(&mut buf), None);

        buf.extend_from_slice(b"\nworld\n");
        assert_eq!(drain(&mut buf), vec!["hello", "world"]);
    }

    #[test]
    fn test_mixed_terminators_in_one_buffer() {
        let mut buf = BytesMut::from(&b"a\r\nb\nc\rd\n"[..]);
        assert_eq!(drain(&mut buf), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_empty_lines() {
        let mut buf = BytesMut::from(&b"\n\r\nx\n"[..]);
        assert_eq!(drain(&mut buf), vec!["", "", "x"]);
    }

    #[test]
    fn test_chunking_invariance() {
        let input = b"one\r\ntwo\nthree\rfour\n";

        let mut whole = BytesMut::from(&input[..]);
        let expected = drain(&mut whole);

        // Feed the same bytes one at a time.
        let mut incremental = BytesMut::new();
        let mut lines = Vec::new();
        for &b in input.iter() {
            incremental.extend_from_slice(&[b]);
            lines.extend(drain(&mut incremental));
        }

        assert_eq!(lines, expected);
        assert!(incremental.is_empty());
    }

    #[test]
    fn test_partial_fragment_never_returned() {
        let mut buf = BytesMut::from(&b"done\nhalf"[..]);
        assert_eq!(extract_line(&mut buf).as_deref(), Some("done"));
        assert_eq!(extract_line(&mut buf), None);
        assert_eq!(&buf[..], b"half");
    }
}
