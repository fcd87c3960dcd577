//! QUIC variable-length integers (RFC 9000 Section 16).
//!
//! Values 0..2^6 use 1 byte, 2^6..2^14 use 2, 2^14..2^30 use 4, 2^30..2^62 use 8.
//! The two high bits of the first byte carry the encoded length.

use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest value representable as a varint.
pub const MAX: u64 = (1 << 62) - 1;

/// Longest encoding of a varint in bytes.
pub const MAX_LEN: usize = 8;

/// Returns the minimal encoded byte length for a varint value (1, 2, 4, or 8).
///
/// # Panics
///
/// Panics if `value` is larger than [`MAX`].
pub fn len(value: u64) -> usize {
    assert!(value <= MAX, "value doesn't fit into 62 bits: {value}");
    if value < (1 << 6) {
        1
    } else if value < (1 << 14) {
        2
    } else if value < (1 << 30) {
        4
    } else {
        8
    }
}

/// Append the minimal encoding of `value`.
///
/// # Panics
///
/// Panics if `value` is larger than [`MAX`].
pub fn write<B: BufMut>(buf: &mut B, value: u64) {
    write_with_len(buf, value, len(value));
}

/// Append `value` using exactly `width` bytes (1, 2, 4 or 8).
///
/// Non-minimal encodings are valid on the wire; they are used where a length
/// prefix has already been reserved for the widest form.
///
/// # Panics
///
/// Panics if `value` is larger than [`MAX`] or needs more than `width` bytes.
pub fn write_with_len<B: BufMut>(buf: &mut B, value: u64, width: usize) {
    assert!(width >= len(value), "varint {value} does not fit in {width} bytes");
    match width {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(0x4000 | value as u16),
        4 => buf.put_u32(0x8000_0000 | value as u32),
        _ => buf.put_u64(0xc000_0000_0000_0000 | value),
    }
}

/// Decode a varint from the front of `buf`, advancing it.
///
/// Returns `None` if the buffer ends inside the varint.
pub fn decode<B: Buf>(buf: &mut B) -> Option<u64> {
    if !buf.has_remaining() {
        return None;
    }
    let first = buf.chunk()[0];
    let width = 1usize << (first >> 6);
    if buf.remaining() < width {
        return None;
    }
    let value = match width {
        1 => u64::from(buf.get_u8()),
        2 => u64::from(buf.get_u16() & 0x3fff),
        4 => u64::from(buf.get_u32() & 0x3fff_ffff),
        _ => buf.get_u64() & 0x3fff_ffff_ffff_ffff,
    };
    Some(value)
}

/// Read one varint from an async byte source.
///
/// Returns the value together with the number of bytes consumed. A source
/// that ends inside the varint yields `UnexpectedEof`.
pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<(u64, usize)> {
    let first = reader.read_u8().await?;
    let width = 1usize << (first >> 6);
    let mut value = u64::from(first & 0x3f);
    if width > 1 {
        let mut rest = [0u8; MAX_LEN - 1];
        reader.read_exact(&mut rest[..width - 1]).await?;
        for &b in &rest[..width - 1] {
            value = (value << 8) | u64::from(b);
        }
    }
    Ok((value, width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_varint_encoding() {
        let mut buf = BytesMut::new();

        write(&mut buf, 0);
        assert_eq!(buf.as_ref(), &[0x00]);

        buf.clear();
        write(&mut buf, 63);
        assert_eq!(buf.as_ref(), &[0x3F]);

        buf.clear();
        write(&mut buf, 64);
        assert_eq!(buf.as_ref(), &[0x40, 0x40]);

        // RFC 9000 Appendix A.1 examples
        buf.clear();
        write(&mut buf, 15293);
        assert_eq!(buf.as_ref(), &[0x7b, 0xbd]);

        buf.clear();
        write(&mut buf, 494878333);
        assert_eq!(buf.as_ref(), &[0x9d, 0x7f, 0x3e, 0x7d]);

        buf.clear();
        write(&mut buf, 151288809941952652);
        assert_eq!(
            buf.as_ref(),
            &[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c]
        );
    }

    #[test]
    fn test_varint_size_calculation() {
        assert_eq!(len(0), 1);
        assert_eq!(len(63), 1);
        assert_eq!(len(64), 2);
        assert_eq!(len(16383), 2);
        assert_eq!(len(16384), 4);
        assert_eq!(len(1073741823), 4);
        assert_eq!(len(1073741824), 8);
        assert_eq!(len(MAX), 8);
    }

    #[test]
    fn test_forced_width_encoding() {
        let mut buf = BytesMut::new();
        write_with_len(&mut buf, 37, 8);
        assert_eq!(buf.as_ref(), &[0xc0, 0, 0, 0, 0, 0, 0, 37]);

        let mut slice = &buf[..];
        assert_eq!(decode(&mut slice), Some(37));
        assert!(slice.is_empty());
    }

    #[test]
    #[should_panic(expected = "doesn't fit into 62 bits")]
    fn test_write_too_large() {
        let mut buf = BytesMut::new();
        write(&mut buf, MAX + 1);
    }

    #[test]
    #[should_panic(expected = "does not fit in 2 bytes")]
    fn test_write_with_len_too_narrow() {
        let mut buf = BytesMut::new();
        write_with_len(&mut buf, 1 << 14, 2);
    }

    #[test]
    fn test_decode_truncated() {
        let mut slice: &[u8] = &[0x9d, 0x7f, 0x3e];
        assert_eq!(decode(&mut slice), None);

        let mut empty: &[u8] = &[];
        assert_eq!(decode(&mut empty), None);
    }

    #[test]
    fn test_decode_advances() {
        let mut slice: &[u8] = &[0x25, 0x7b, 0xbd, 0x00];
        assert_eq!(decode(&mut slice), Some(37));
        assert_eq!(decode(&mut slice), Some(15293));
        assert_eq!(decode(&mut slice), Some(0));
        assert_eq!(decode(&mut slice), None);
    }

    #[tokio::test]
    async fn test_async_read() {
        let mut src: &[u8] = &[0x9d, 0x7f, 0x3e, 0x7d, 0x25];
        assert_eq!(read(&mut src).await.unwrap(), (494878333, 4));
        assert_eq!(read(&mut src).await.unwrap(), (37, 1));

        let err = read(&mut src).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_async_read_truncated() {
        let mut src: &[u8] = &[0x7b];
        let err = read(&mut src).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
