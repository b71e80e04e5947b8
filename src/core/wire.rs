//! # Wire Primitives
//!
//! Field-level encoding shared by every packet body.
//!
//! All integers are little-endian. Variable-length fields carry a "magic"
//! obfuscated length: a pair `(xor, sub)` chosen per packet kind maps the real
//! length `n` to `(n + sub) ^ xor` on the wire.
//!
//! ## String Encodings
//! - **Variable UTF-16**: magic length counting code units plus a terminating NUL
//!   (`0` encodes the empty string), followed by `2 * (len & 1)` padding bytes
//! - **Variable ASCII**: magic length counting bytes plus NUL, padded to 4
//! - **Fixed**: exactly `N` units, NUL padded and truncated at the first NUL on read
//!
//! ## Time Encodings
//! - **psotime**: u64 milliseconds offset by [`PSOTIME_OFFSET`] from the Unix epoch
//! - plain durations: u32 seconds

use crate::core::header::PacketType;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::time::{from_psotime, to_psotime};
use bytes::{Buf, BufMut, BytesMut};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Milliseconds between the game clock epoch and the Unix epoch
pub const PSOTIME_OFFSET: u64 = 0x0295_E964_8864;

/// Types with a fixed binary layout inside a packet body.
pub trait WireFormat: Sized {
    /// Decode one value, advancing the reader
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self>;
    /// Append the encoded value
    fn write(&self, writer: &mut WireWriter, packet_type: PacketType);
}

fn eof() -> ProtocolError {
    ProtocolError::ParseError(constants::ERR_UNEXPECTED_EOF.into())
}

/// Cursor over a packet body.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, len: usize) -> Result<()> {
        if self.buf.remaining() < len {
            Err(eof())
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Skip `len` bytes of padding
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.need(len)?;
        self.buf.advance(len);
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.need(len)?;
        let out = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(out)
    }

    /// Consume everything left in the body
    pub fn read_rest(&mut self) -> Vec<u8> {
        let out = self.buf.to_vec();
        self.buf.advance(out.len());
        out
    }

    /// Decode a magic-obfuscated length
    pub fn read_magic(&mut self, xor: u32, sub: u32) -> Result<u32> {
        let raw = self.read_u32()?;
        Ok((raw ^ xor).wrapping_sub(sub))
    }

    /// Decode a magic length that is about to be used to size an allocation of
    /// `unit`-byte elements.
    fn read_bounded_len(&mut self, xor: u32, sub: u32, unit: usize) -> Result<usize> {
        let len = self.read_magic(xor, sub)? as usize;
        match len.checked_mul(unit) {
            Some(total) if total <= self.remaining() => Ok(len),
            _ => Err(ProtocolError::ParseError(format!(
                "length {len} overruns the {} remaining bytes",
                self.remaining()
            ))),
        }
    }

    /// Variable-length UTF-16 string
    pub fn read_variable_string(&mut self, xor: u32, sub: u32) -> Result<String> {
        let len = self.read_bounded_len(xor, sub, 2)?;
        if len == 0 {
            return Ok(String::new());
        }
        let units = self.read_utf16_units(len)?;
        self.skip(2 * (len & 1))?;
        decode_utf16(&units)
    }

    /// Variable-length ASCII string
    pub fn read_variable_ascii(&mut self, xor: u32, sub: u32) -> Result<String> {
        let len = self.read_bounded_len(xor, sub, 1)?;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        self.skip(padding_to_4(len))?;
        decode_ascii(&bytes)
    }

    /// UTF-16 string of exactly `units` code units
    pub fn read_fixed_string(&mut self, units: usize) -> Result<String> {
        let units = self.read_utf16_units(units)?;
        decode_utf16(&units)
    }

    /// ASCII string of exactly `len` bytes
    pub fn read_fixed_ascii(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        decode_ascii(&bytes)
    }

    fn read_utf16_units(&mut self, units: usize) -> Result<Vec<u16>> {
        self.need(units * 2)?;
        Ok((0..units).map(|_| self.buf.get_u16_le()).collect())
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Addr> {
        self.need(4)?;
        let mut octets = [0u8; 4];
        self.buf.copy_to_slice(&mut octets);
        Ok(Ipv4Addr::from(octets))
    }

    /// Game clock timestamp
    pub fn read_psotime(&mut self) -> Result<Duration> {
        let raw = self.read_u64()?;
        from_psotime(raw).ok_or_else(|| ProtocolError::ParseError(constants::ERR_PSOTIME_UNDERFLOW.into()))
    }

    /// Whole seconds stored as u32
    pub fn read_duration_secs(&mut self) -> Result<Duration> {
        Ok(Duration::from_secs(u64::from(self.read_u32()?)))
    }

    /// Sequence prefixed with a magic element count
    pub fn read_magic_vec<T: WireFormat>(
        &mut self,
        xor: u32,
        sub: u32,
        packet_type: PacketType,
    ) -> Result<Vec<T>> {
        let count = self.read_bounded_len(xor, sub, 1)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(T::read(self, packet_type)?);
        }
        Ok(out)
    }
}

fn padding_to_4(len: usize) -> usize {
    len.next_multiple_of(4) - len
}

fn decode_utf16(units: &[u16]) -> Result<String> {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end])
        .map_err(|e| ProtocolError::ParseError(format!("invalid UTF-16 string: {e}")))
}

fn decode_ascii(bytes: &[u8]) -> Result<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..end];
    if !bytes.is_ascii() {
        return Err(ProtocolError::ParseError("non-ASCII byte in string".into()));
    }
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Growable packet body buffer.
///
/// Values that cannot be represented in their field (durations past `u32`
/// seconds, non-ASCII text in ASCII fields) are written saturated or filtered
/// and the first such failure is kept for [`WireWriter::check`].
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
    invalid: Option<String>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            invalid: None,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// First value that did not fit its field
    pub fn check(&self) -> Result<()> {
        match &self.invalid {
            Some(message) => Err(ProtocolError::ParseError(message.clone())),
            None => Ok(()),
        }
    }

    fn invalid(&mut self, message: String) {
        self.invalid.get_or_insert(message);
    }

    fn ascii_bytes(&mut self, value: &str) -> Vec<u8> {
        if value.is_ascii() {
            return value.as_bytes().to_vec();
        }
        self.invalid(format!("{}: {value:?}", constants::ERR_NOT_ASCII));
        value.bytes().filter(u8::is_ascii).collect()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn write_zeros(&mut self, len: usize) {
        self.buf.put_bytes(0, len);
    }

    /// Encode a magic-obfuscated length
    pub fn write_magic(&mut self, value: u32, xor: u32, sub: u32) {
        self.write_u32(value.wrapping_add(sub) ^ xor);
    }

    pub fn write_variable_string(&mut self, value: &str, xor: u32, sub: u32) {
        if value.is_empty() {
            self.write_magic(0, xor, sub);
            return;
        }
        let units: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
        let len = units.len();
        self.write_magic(len as u32, xor, sub);
        for unit in units {
            self.write_u16(unit);
        }
        self.write_zeros(2 * (len & 1));
    }

    pub fn write_variable_ascii(&mut self, value: &str, xor: u32, sub: u32) {
        let bytes = self.ascii_bytes(value);
        if bytes.is_empty() {
            self.write_magic(0, xor, sub);
            return;
        }
        let len = bytes.len() + 1;
        self.write_magic(len as u32, xor, sub);
        self.write_bytes(&bytes);
        self.write_u8(0);
        self.write_zeros(padding_to_4(len));
    }

    /// Write exactly `units` UTF-16 code units, truncating or NUL padding
    pub fn write_fixed_string(&mut self, value: &str, units: usize) {
        let mut written = 0;
        for unit in value.encode_utf16().take(units) {
            self.write_u16(unit);
            written += 1;
        }
        self.write_zeros((units - written) * 2);
    }

    /// Write exactly `len` ASCII bytes, truncating or NUL padding
    pub fn write_fixed_ascii(&mut self, value: &str, len: usize) {
        let bytes = self.ascii_bytes(value);
        let take = bytes.len().min(len);
        self.write_bytes(&bytes[..take]);
        self.write_zeros(len - take);
    }

    pub fn write_ipv4(&mut self, addr: Ipv4Addr) {
        self.write_bytes(&addr.octets());
    }

    pub fn write_psotime(&mut self, time: Duration) {
        self.write_u64(to_psotime(time));
    }

    pub fn write_duration_secs(&mut self, time: Duration) {
        let secs = u32::try_from(time.as_secs()).unwrap_or_else(|_| {
            self.invalid(format!(
                "{}: {} seconds",
                constants::ERR_DURATION_OVERFLOW,
                time.as_secs()
            ));
            u32::MAX
        });
        self.write_u32(secs);
    }

    pub fn write_magic_vec<T: WireFormat>(
        &mut self,
        items: &[T],
        xor: u32,
        sub: u32,
        packet_type: PacketType,
    ) {
        self.write_magic(items.len() as u32, xor, sub);
        for item in items {
            item.write(self, packet_type);
        }
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_is_reversible() {
        let mut w = WireWriter::new();
        w.write_magic(5, 0x9D3F, 0x44);
        let bytes = w.into_vec();
        assert_eq!(
            u32::from_le_bytes(bytes[..4].try_into().unwrap()),
            (5 + 0x44) ^ 0x9D3F
        );
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_magic(0x9D3F, 0x44).unwrap(), 5);
    }

    #[test]
    fn test_variable_string_layout() {
        let mut w = WireWriter::new();
        w.write_variable_string("hi", 0, 0);
        let bytes = w.into_vec();
        // len 3 (two units + NUL), 6 bytes of text, 2 bytes of padding
        assert_eq!(bytes, [3, 0, 0, 0, b'h', 0, b'i', 0, 0, 0, 0, 0]);
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_variable_string(0, 0).unwrap(), "hi");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_empty_variable_string() {
        let mut w = WireWriter::new();
        w.write_variable_string("", 0x78F7, 0xA2);
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), 4);
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_variable_string(0x78F7, 0xA2).unwrap(), "");
    }

    #[test]
    fn test_string_length_overrun_is_rejected() {
        let mut w = WireWriter::new();
        w.write_magic(1000, 0, 0);
        w.write_u16(b'a' as u16);
        let bytes = w.into_vec();
        let mut r = WireReader::new(&bytes);
        assert!(matches!(
            r.read_variable_string(0, 0),
            Err(ProtocolError::ParseError(_))
        ));
    }

    #[test]
    fn test_fixed_string_pads_and_truncates() {
        let mut w = WireWriter::new();
        w.write_fixed_string("Ship01", 0x10);
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), 0x20);
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_fixed_string(0x10).unwrap(), "Ship01");

        let mut w = WireWriter::new();
        w.write_fixed_string("abcdef", 2);
        let bytes = w.into_vec();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_fixed_string(2).unwrap(), "ab");
    }

    #[test]
    fn test_ascii_roundtrip() {
        let mut w = WireWriter::new();
        w.write_variable_ascii("abc", 0x11, 0x22);
        w.write_fixed_ascii("xy", 4);
        assert!(w.check().is_ok());
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), 4 + 4 + 4);
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_variable_ascii(0x11, 0x22).unwrap(), "abc");
        assert_eq!(r.read_fixed_ascii(4).unwrap(), "xy");
    }

    #[test]
    fn test_non_ascii_text_is_filtered_and_flagged() {
        let mut w = WireWriter::new();
        w.write_variable_ascii("caf\u{e9}!", 0, 0);
        w.write_fixed_ascii("\u{3042}a", 4);
        let err = w.check().unwrap_err();
        assert!(err.to_string().contains("not ASCII"), "{err}");

        let bytes = w.into_vec();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_variable_ascii(0, 0).unwrap(), "caf!");
        assert_eq!(r.read_fixed_ascii(4).unwrap(), "a");
    }

    #[test]
    fn test_duration_past_u32_is_flagged() {
        let mut w = WireWriter::new();
        w.write_duration_secs(Duration::from_secs(u64::from(u32::MAX)));
        assert!(w.check().is_ok());

        w.write_duration_secs(Duration::from_secs(u64::from(u32::MAX) + 1));
        assert!(matches!(w.check(), Err(ProtocolError::ParseError(_))));
        assert_eq!(&w.into_vec()[4..], &u32::MAX.to_le_bytes());
    }

    #[test]
    fn test_psotime() {
        let mut w = WireWriter::new();
        w.write_psotime(Duration::from_millis(1_700_000_000_123));
        let bytes = w.into_vec();
        let mut r = WireReader::new(&bytes);
        assert_eq!(
            r.read_psotime().unwrap(),
            Duration::from_millis(1_700_000_000_123)
        );

        let zero = 0u64.to_le_bytes();
        let mut r = WireReader::new(&zero);
        assert!(r.read_psotime().is_err());
    }

    #[test]
    fn test_short_reads_fail() {
        let mut r = WireReader::new(&[1, 2, 3]);
        assert!(r.read_u32().is_err());
        assert_eq!(r.read_u16().unwrap(), 0x0201);
        assert!(r.skip(2).is_err());
    }
}
