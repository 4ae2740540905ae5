//! Byte-level helpers shared by the NAS IE and message codecs.
//!
//! Decoders work on `&mut &[u8]` through [`bytes::Buf`]; encoders append
//! to a [`BytesMut`].

use bytes::{Buf, BufMut, BytesMut};

use crate::error::NasError;

pub(crate) fn need(buf: &[u8], n: usize) -> Result<(), NasError> {
    if buf.remaining() < n {
        return Err(NasError::BufferTooShort {
            expected: n,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut &[u8]) -> Result<u8, NasError> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut &[u8]) -> Result<u16, NasError> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], NasError> {
    need(buf, n)?;
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(n);
    *buf = tail;
    Ok(head)
}

/// Value part of an LV (1-octet length) element.
pub(crate) fn get_lv<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], NasError> {
    let len = get_u8(buf)? as usize;
    take(buf, len)
}

/// Value part of an LV-E (2-octet length) element.
pub(crate) fn get_lve<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], NasError> {
    let len = get_u16(buf)? as usize;
    take(buf, len)
}

pub(crate) fn put_lv(out: &mut BytesMut, value: &[u8]) {
    out.put_u8(value.len() as u8);
    out.put_slice(value);
}

pub(crate) fn put_lve(out: &mut BytesMut, value: &[u8]) {
    out.put_u16(value.len() as u16);
    out.put_slice(value);
}

/// Skips an optional IE this codec does not model.
///
/// IEIs 0x80 and above are half-octet TV; 0x7X IEIs are TLV-E; everything
/// else is treated as TLV.
pub(crate) fn skip_ie(buf: &mut &[u8], iei: u8) -> Result<(), NasError> {
    if iei >= 0x80 {
        return Ok(());
    }
    if iei & 0xF0 == 0x70 {
        get_lve(buf)?;
    } else {
        get_lv(buf)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lv_and_lve() {
        let mut out = BytesMut::new();
        put_lv(&mut out, &[1, 2]);
        put_lve(&mut out, &[3]);
        assert_eq!(&out[..], &[2, 1, 2, 0, 1, 3]);

        let mut buf: &[u8] = &out;
        assert_eq!(get_lv(&mut buf).unwrap(), &[1, 2]);
        assert_eq!(get_lve(&mut buf).unwrap(), &[3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_lv() {
        let mut buf: &[u8] = &[5, 1, 2];
        assert_eq!(
            get_lv(&mut buf),
            Err(NasError::BufferTooShort { expected: 5, actual: 2 })
        );
    }

    #[test]
    fn test_skip_ie_formats() {
        let mut buf: &[u8] = &[0x00, 0x02, 0xAA, 0xBB, 0x01, 0xCC];
        skip_ie(&mut buf, 0x77).unwrap();
        assert_eq!(buf, &[0x01, 0xCC]);
        skip_ie(&mut buf, 0x22).unwrap();
        assert!(buf.is_empty());
        skip_ie(&mut buf, 0xE1).unwrap();
    }
}
