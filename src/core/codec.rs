//! # Frame Codec
//!
//! Splits a byte stream into whole frames and applies the session cipher at
//! the buffer boundary.
//!
//! ## Framing
//! - **Plaintext / RC4**: frame length at offset 0. RC4 decrypts bytes as they
//!   arrive, so partial frames are already plaintext when the rest shows up.
//! - **AES modes**: envelope length at offset `0x44`. A whole envelope is
//!   decrypted at once and may hold several frames.
//!
//! A decoded item is one complete plaintext frame, length prefix included.
//! The encoder takes one or more whole plaintext frames and emits them
//! encrypted under the active cipher.
//!
//! ## Security
//! - Declared lengths are checked against `max_frame_size` before buffering
//! - A corrupt length cannot be resynchronized from, so the buffer is dropped

use crate::config::MAX_FRAME_SIZE;
use crate::core::header::{declared_len, HEADER_LEN};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{LengthKind, SessionCipher, ENVELOPE_HEADER_LEN, ENVELOPE_LENGTH_OFFSET};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Length-prefixed frame codec with an optional session cipher
#[derive(Debug)]
pub struct FrameCodec {
    cipher: SessionCipher,
    max_frame_size: usize,
    /// Prefix of the read buffer already run through a stream cipher
    decrypted: usize,
    /// Plaintext left over from an envelope
    plain: BytesMut,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            cipher: SessionCipher::None,
            max_frame_size,
            decrypted: 0,
            plain: BytesMut::new(),
        }
    }

    /// Install the session cipher. Bytes still buffered are treated as
    /// ciphertext from here on.
    pub fn set_cipher(&mut self, cipher: SessionCipher) {
        debug!(cipher = cipher.name(), "installing session cipher");
        self.cipher = cipher;
        self.decrypted = 0;
    }

    pub fn cipher(&self) -> &SessionCipher {
        &self.cipher
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_active()
    }

    /// Negotiated secret, empty before the key exchange
    pub fn get_key(&self) -> &[u8] {
        self.cipher.secret()
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Split into a decoding half and an encoding half, in that order.
    ///
    /// The decoding half keeps the buffered plaintext and stream position.
    pub fn split(self) -> (FrameCodec, FrameCodec) {
        let (incoming, outgoing) = self.cipher.split();
        let decoder = FrameCodec {
            cipher: incoming,
            max_frame_size: self.max_frame_size,
            decrypted: self.decrypted,
            plain: self.plain,
        };
        let mut encoder = FrameCodec::new(self.max_frame_size);
        encoder.cipher = outgoing;
        (decoder, encoder)
    }

    fn check_len(&self, len: usize, min: usize) -> Result<()> {
        if len < min {
            return Err(ProtocolError::ParseError(format!(
                "{} ({len} < {min})",
                constants::ERR_FRAME_LENGTH_UNDERRUN
            )));
        }
        if len > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(len));
        }
        Ok(())
    }

    /// Split one whole plaintext frame off `buf`
    fn take_frame(&self, buf: &mut BytesMut) -> Result<Option<BytesMut>> {
        let Some(len) = declared_len(buf) else {
            return Ok(None);
        };
        if let Err(e) = self.check_len(len, HEADER_LEN) {
            buf.clear();
            return Err(e);
        }
        if buf.len() < len {
            buf.reserve(len - buf.len());
            return Ok(None);
        }
        Ok(Some(buf.split_to(len)))
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        if let Some(frame) = self.take_frame_from_plain()? {
            return Ok(Some(frame));
        }

        if self.cipher.is_stream() && self.decrypted < src.len() {
            self.cipher.apply_incoming_stream(&mut src[self.decrypted..]);
            self.decrypted = src.len();
        }

        match self.cipher.length_kind() {
            LengthKind::Frame => {
                let frame = match self.take_frame(src) {
                    Ok(frame) => frame,
                    Err(e) => {
                        self.decrypted = 0;
                        return Err(e);
                    }
                };
                match &frame {
                    Some(frame) => self.decrypted = self.decrypted.saturating_sub(frame.len()),
                    None if src.is_empty() => self.decrypted = 0,
                    None => {}
                }
                if let Some(frame) = &frame {
                    trace!(len = frame.len(), "decoded frame");
                }
                Ok(frame)
            }
            LengthKind::Envelope => {
                if src.len() < ENVELOPE_HEADER_LEN {
                    return Ok(None);
                }
                let mut prefix = [0u8; 4];
                prefix.copy_from_slice(&src[ENVELOPE_LENGTH_OFFSET..ENVELOPE_HEADER_LEN]);
                let len = u32::from_le_bytes(prefix) as usize;
                if let Err(e) = self.check_len(len, ENVELOPE_HEADER_LEN) {
                    src.clear();
                    return Err(e);
                }
                if src.len() < len {
                    src.reserve(len - src.len());
                    return Ok(None);
                }
                let envelope = src.split_to(len);
                let plain = self.cipher.decrypt_envelope(&envelope)?;
                trace!(envelope = len, plain = plain.len(), "decrypted envelope");
                self.plain.extend_from_slice(&plain);
                self.take_frame_from_plain()
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && self.plain.is_empty() => Ok(None),
            None => Err(ProtocolError::ParseError(
                constants::ERR_UNEXPECTED_EOF.into(),
            )),
        }
    }
}

impl FrameCodec {
    /// Next frame left over from an already decrypted envelope
    pub fn take_buffered_frame(&mut self) -> Result<Option<BytesMut>> {
        self.take_frame_from_plain()
    }

    fn take_frame_from_plain(&mut self) -> Result<Option<BytesMut>> {
        if self.plain.is_empty() {
            return Ok(None);
        }
        let mut plain = std::mem::take(&mut self.plain);
        let frame = self.take_frame(&mut plain);
        self.plain = plain;
        frame
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        let data = self.cipher.encrypt(item)?;
        dst.reserve(data.len());
        dst.put_slice(&data);
        trace!(plain = item.len(), wire = data.len(), "encoded");
        Ok(())
    }
}

impl Encoder<Vec<u8>> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&[u8]>::encode(self, &item, dst)
    }
}
