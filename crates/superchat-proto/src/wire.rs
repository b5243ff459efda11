//! Primitive wire encoding rules.
//!
//! All multi-byte integers are big-endian. Strings are `u16 BE` length
//! followed by UTF-8 bytes. Optional fields are a presence byte (0 or 1)
//! followed by the value when present. Binary blobs (message content) use a
//! `u32 BE` length so they can exceed 64 KiB up to the frame cap.
//!
//! Every `get_*` validates available bytes before reading; decoders never
//! panic on truncated or hostile input.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

#[inline]
fn need(buf: &Bytes, n: usize) -> Result<(), WireError> {
    if buf.remaining() < n {
        Err(WireError::Truncated {
            needed: n - buf.remaining(),
        })
    } else {
        Ok(())
    }
}

/// Read a `u8`.
pub fn get_u8(buf: &mut Bytes) -> Result<u8, WireError> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a big-endian `u16`.
pub fn get_u16(buf: &mut Bytes) -> Result<u16, WireError> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

/// Read a big-endian `u32`.
pub fn get_u32(buf: &mut Bytes) -> Result<u32, WireError> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

/// Read a big-endian `u64`.
pub fn get_u64(buf: &mut Bytes) -> Result<u64, WireError> {
    need(buf, 8)?;
    Ok(buf.get_u64())
}

/// Read a big-endian `i64` (timestamps).
pub fn get_i64(buf: &mut Bytes) -> Result<i64, WireError> {
    need(buf, 8)?;
    Ok(buf.get_i64())
}

/// Read a boolean byte.
pub fn get_bool(buf: &mut Bytes) -> Result<bool, WireError> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(WireError::InvalidBool(other)),
    }
}

/// Read a length-prefixed UTF-8 string.
pub fn get_string(buf: &mut Bytes) -> Result<String, WireError> {
    let len = get_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(WireError::LengthOverrun {
            declared: len,
            remaining: buf.remaining(),
        });
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
}

/// Read a `u32`-length-prefixed binary blob (message content, ciphertext).
pub fn get_blob(buf: &mut Bytes) -> Result<Vec<u8>, WireError> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(WireError::LengthOverrun {
            declared: len,
            remaining: buf.remaining(),
        });
    }
    Ok(buf.split_to(len).to_vec())
}

/// Read a fixed 32-byte value (X25519 public keys).
pub fn get_key32(buf: &mut Bytes) -> Result<[u8; 32], WireError> {
    need(buf, 32)?;
    let mut out = [0u8; 32];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Read an optional-field presence byte.
pub fn get_presence(buf: &mut Bytes) -> Result<bool, WireError> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(WireError::InvalidPresence(other)),
    }
}

/// Read an optional value using the supplied reader.
pub fn get_opt<T>(
    buf: &mut Bytes,
    read: impl FnOnce(&mut Bytes) -> Result<T, WireError>,
) -> Result<Option<T>, WireError> {
    if get_presence(buf)? {
        Ok(Some(read(buf)?))
    } else {
        Ok(None)
    }
}

/// Read an optional `u64`.
pub fn get_opt_u64(buf: &mut Bytes) -> Result<Option<u64>, WireError> {
    get_opt(buf, get_u64)
}

/// Read an optional `i64`.
pub fn get_opt_i64(buf: &mut Bytes) -> Result<Option<i64>, WireError> {
    get_opt(buf, get_i64)
}

/// Read an optional string.
pub fn get_opt_string(buf: &mut Bytes) -> Result<Option<String>, WireError> {
    get_opt(buf, get_string)
}

/// Read an optional 32-byte key.
pub fn get_opt_key32(buf: &mut Bytes) -> Result<Option<[u8; 32]>, WireError> {
    get_opt(buf, get_key32)
}

/// Read a `u16`-count-prefixed list.
pub fn get_list<T>(
    buf: &mut Bytes,
    mut read: impl FnMut(&mut Bytes) -> Result<T, WireError>,
) -> Result<Vec<T>, WireError> {
    let count = get_u16(buf)? as usize;
    let mut out = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        out.push(read(buf)?);
    }
    Ok(out)
}

/// Write a length-prefixed UTF-8 string. Strings longer than `u16::MAX`
/// bytes are truncated at the last char boundary that fits.
pub fn put_string(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    let len = if bytes.len() > u16::MAX as usize {
        let mut cut = u16::MAX as usize;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        cut
    } else {
        bytes.len()
    };
    buf.put_u16(len as u16);
    buf.put_slice(&bytes[..len]);
}

/// Write a `u32`-length-prefixed binary blob.
pub fn put_blob(buf: &mut BytesMut, b: &[u8]) {
    buf.put_u32(b.len() as u32);
    buf.put_slice(b);
}

/// Write a boolean byte.
pub fn put_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(v as u8);
}

/// Write an optional value using the supplied writer.
pub fn put_opt<T>(buf: &mut BytesMut, v: &Option<T>, write: impl FnOnce(&mut BytesMut, &T)) {
    match v {
        Some(v) => {
            buf.put_u8(1);
            write(buf, v);
        }
        None => buf.put_u8(0),
    }
}

/// Write an optional `u64`.
pub fn put_opt_u64(buf: &mut BytesMut, v: Option<u64>) {
    put_opt(buf, &v, |b, v| b.put_u64(*v));
}

/// Write an optional `i64`.
pub fn put_opt_i64(buf: &mut BytesMut, v: Option<i64>) {
    put_opt(buf, &v, |b, v| b.put_i64(*v));
}

/// Write an optional string.
pub fn put_opt_string(buf: &mut BytesMut, v: &Option<String>) {
    put_opt(buf, v, |b, v| put_string(b, v));
}

/// Write an optional 32-byte key.
pub fn put_opt_key32(buf: &mut BytesMut, v: &Option<[u8; 32]>) {
    put_opt(buf, v, |b, v| b.put_slice(v));
}

/// Write a `u16`-count-prefixed list.
pub fn put_list<T>(buf: &mut BytesMut, items: &[T], mut write: impl FnMut(&mut BytesMut, &T)) {
    buf.put_u16(items.len().min(u16::MAX as usize) as u16);
    for item in items.iter().take(u16::MAX as usize) {
        write(buf, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "héllo wörld");
        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes).unwrap(), "héllo wörld");
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn max_size_string() {
        let s = "x".repeat(u16::MAX as usize);
        let mut buf = BytesMut::new();
        put_string(&mut buf, &s);
        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes).unwrap(), s);
    }

    #[test]
    fn oversized_string_truncates_at_char_boundary() {
        // 'é' is two bytes; an odd cap must not split it.
        let s = "é".repeat(40_000);
        let mut buf = BytesMut::new();
        put_string(&mut buf, &s);
        let mut bytes = buf.freeze();
        let decoded = get_string(&mut bytes).unwrap();
        assert!(decoded.len() <= u16::MAX as usize);
        assert!(s.starts_with(&decoded));
    }

    #[test]
    fn truncated_string_errors() {
        let mut buf = BytesMut::new();
        buf.put_u16(10);
        buf.put_slice(b"abc");
        let mut bytes = buf.freeze();
        assert!(matches!(
            get_string(&mut bytes),
            Err(WireError::LengthOverrun { declared: 10, remaining: 3 })
        ));
    }

    #[test]
    fn optional_fields() {
        let mut buf = BytesMut::new();
        put_opt_u64(&mut buf, Some(42));
        put_opt_u64(&mut buf, None);
        put_opt_string(&mut buf, &Some("hi".into()));
        let mut bytes = buf.freeze();
        assert_eq!(get_opt_u64(&mut bytes).unwrap(), Some(42));
        assert_eq!(get_opt_u64(&mut bytes).unwrap(), None);
        assert_eq!(get_opt_string(&mut bytes).unwrap(), Some("hi".into()));
    }

    #[test]
    fn bad_presence_byte() {
        let mut buf = BytesMut::new();
        buf.put_u8(7);
        let mut bytes = buf.freeze();
        assert_eq!(
            get_opt_u64(&mut bytes),
            Err(WireError::InvalidPresence(7))
        );
    }

    #[test]
    fn bool_rejects_garbage() {
        let mut bytes = Bytes::from_static(&[2]);
        assert_eq!(get_bool(&mut bytes), Err(WireError::InvalidBool(2)));
    }

    #[test]
    fn blob_round_trip() {
        let data = vec![0u8, 1, 2, 255, 254];
        let mut buf = BytesMut::new();
        put_blob(&mut buf, &data);
        let mut bytes = buf.freeze();
        assert_eq!(get_blob(&mut bytes).unwrap(), data);
    }

    #[test]
    fn list_round_trip() {
        let mut buf = BytesMut::new();
        put_list(&mut buf, &[1u64, 2, 3], |b, v| b.put_u64(*v));
        let mut bytes = buf.freeze();
        assert_eq!(get_list(&mut bytes, get_u64).unwrap(), vec![1, 2, 3]);
    }
}
