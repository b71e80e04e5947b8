//! # Session Ciphers
//!
//! Symmetric ciphers installed by the key exchange.
//!
//! ## Modes
//! - **Aes**: AES-256-CBC envelope per write, random IV carried in the envelope,
//!   HMAC-SHA256 integrity fields (Classic/NA/JP with long key material)
//! - **AesNgs**: AES-256-CBC with an IV chained from the previous ciphertext block,
//!   SHA-256 integrity fields, optional zstd payload (NGS)
//! - **Rc4**: RC4 keystream over the whole byte stream (Vita and short key material)
//!
//! ## Envelope Layout (AES modes)
//! ```text
//! [Hash(0x20)] [Hash(0x20)] [01 00 FF FF] [Length(4, LE)] [IV(0x10), Aes only] [Ciphertext]
//! ```
//! `Length` covers the whole envelope, so framing reads it at offset `0x44`.
//!
//! ## Security
//! - Key and secret buffers are zeroed on drop (zeroize crate)
//! - Integrity fields are produced for peers that check them; incoming ones are
//!   not verified, matching deployed servers

use crate::core::header::PacketType;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::compression;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use bytes::BufMut;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// IV used to unwrap the secret inside AES key material
const KEY_MATERIAL_IV: [u8; 0x10] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
];

const HMAC_KEY: &[u8] = b"passwordxxxxxxxx";
const ENVELOPE_MARKER: u32 = 0x0100_FFFF;

/// Offset of the length field inside an AES envelope
pub const ENVELOPE_LENGTH_OFFSET: usize = 0x44;
/// Bytes required before an envelope length can be read
pub const ENVELOPE_HEADER_LEN: usize = 0x48;
const AES_ENVELOPE_HEADER_LEN: usize = 0x58;

/// Key material longer than this selects AES, otherwise RC4
pub const AES_KEY_MATERIAL_THRESHOLD: usize = 0x30;

/// Where the framing layer finds the length of the next unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    /// Plaintext frame length at offset 0
    Frame,
    /// Envelope length at [`ENVELOPE_LENGTH_OFFSET`]
    Envelope,
}

fn crypto_err(e: impl fmt::Display) -> ProtocolError {
    ProtocolError::EncryptionError(e.to_string())
}

/// Session cipher negotiated by the key exchange
#[derive(Debug, Default)]
pub enum SessionCipher {
    #[default]
    None,
    Aes(AesCipher),
    AesNgs(AesNgsCipher),
    Rc4(Rc4Cipher),
}

impl SessionCipher {
    /// Build the cipher described by decrypted key material.
    ///
    /// Material longer than 0x30 bytes is `[wrapped secret(0x30)][aes key(0x20)]`;
    /// shorter material is `[rc4-encrypted secret(0x10)][rc4 key(0x10)]`.
    pub fn from_key_material(data: &[u8], packet_type: PacketType) -> Result<Self> {
        if data.len() > AES_KEY_MATERIAL_THRESHOLD {
            if data.len() < 0x50 {
                return Err(ProtocolError::EncryptionError(
                    constants::ERR_KEY_MATERIAL_TOO_SHORT.into(),
                ));
            }
            let mut key = [0u8; 0x20];
            key.copy_from_slice(&data[0x30..0x50]);
            let mut secret = Zeroizing::new(data[..0x30].to_vec());
            Aes256CbcDec::new(&key.into(), &KEY_MATERIAL_IV.into())
                .decrypt_padded_mut::<Pkcs7>(&mut secret)
                .map_err(|_| {
                    ProtocolError::EncryptionError(constants::ERR_DECRYPTION_FAILED.into())
                })?;
            let mut iv = [0u8; 0x10];
            iv.copy_from_slice(&secret[..0x10]);
            let cipher = if packet_type.is_ngs() {
                SessionCipher::AesNgs(AesNgsCipher {
                    key,
                    iv_in: iv,
                    iv_out: iv,
                    secret: secret.to_vec(),
                })
            } else {
                SessionCipher::Aes(AesCipher {
                    key,
                    secret: secret.to_vec(),
                })
            };
            key.zeroize();
            Ok(cipher)
        } else {
            if data.len() < 0x20 {
                return Err(ProtocolError::EncryptionError(
                    constants::ERR_KEY_MATERIAL_TOO_SHORT.into(),
                ));
            }
            let mut key = Zeroizing::new([0u8; 0x10]);
            key.copy_from_slice(&data[0x10..0x20]);
            let mut secret = Zeroizing::new([0u8; 0x10]);
            secret.copy_from_slice(&data[..0x10]);
            Rc4::<U16>::new(&(*key).into()).apply_keystream(&mut secret[..]);
            Ok(SessionCipher::Rc4(Rc4Cipher {
                enc: Some(Rc4::new(&(*key).into())),
                dec: Some(Rc4::new(&(*key).into())),
                secret,
            }))
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, SessionCipher::None)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionCipher::None => "none",
            SessionCipher::Aes(_) => "aes",
            SessionCipher::AesNgs(_) => "aes-ngs",
            SessionCipher::Rc4(_) => "rc4",
        }
    }

    /// Stream ciphers decrypt bytes on arrival rather than per unit
    pub fn is_stream(&self) -> bool {
        matches!(self, SessionCipher::Rc4(_))
    }

    pub fn length_kind(&self) -> LengthKind {
        match self {
            SessionCipher::Aes(_) | SessionCipher::AesNgs(_) => LengthKind::Envelope,
            SessionCipher::None | SessionCipher::Rc4(_) => LengthKind::Frame,
        }
    }

    /// Negotiated secret, echoed back in the encryption response
    pub fn secret(&self) -> &[u8] {
        match self {
            SessionCipher::None => &[],
            SessionCipher::Aes(c) => &c.secret,
            SessionCipher::AesNgs(c) => &c.secret,
            SessionCipher::Rc4(c) => &c.secret[..],
        }
    }

    /// Decrypt stream bytes in place (RC4 only; other modes are untouched)
    pub fn apply_incoming_stream(&mut self, data: &mut [u8]) {
        if let SessionCipher::Rc4(Rc4Cipher { dec: Some(dec), .. }) = self {
            dec.apply_keystream(data);
        }
    }

    /// Decrypt one complete envelope. Non-envelope modes return the input.
    pub fn decrypt_envelope(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            SessionCipher::Aes(c) => c.decrypt(data),
            SessionCipher::AesNgs(c) => c.decrypt(data),
            SessionCipher::None | SessionCipher::Rc4(_) => Ok(data.to_vec()),
        }
    }

    /// Encrypt outgoing bytes (one or more whole frames)
    pub fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            SessionCipher::None => Ok(data.to_vec()),
            SessionCipher::Aes(c) => c.encrypt(data),
            SessionCipher::AesNgs(c) => c.encrypt(data),
            SessionCipher::Rc4(c) => {
                let enc = c.enc.as_mut().ok_or_else(|| {
                    ProtocolError::EncryptionError(constants::ERR_NO_OUTGOING_KEYSTREAM.into())
                })?;
                let mut out = data.to_vec();
                enc.apply_keystream(&mut out);
                Ok(out)
            }
        }
    }

    /// Separate the incoming and outgoing state, returned in that order.
    ///
    /// The incoming half only decrypts and the outgoing half only encrypts.
    /// RC4 keystreams move to their half; AES state is copied.
    pub fn split(self) -> (SessionCipher, SessionCipher) {
        match self {
            SessionCipher::None => (SessionCipher::None, SessionCipher::None),
            SessionCipher::Aes(c) => (SessionCipher::Aes(c.clone()), SessionCipher::Aes(c)),
            SessionCipher::AesNgs(c) => {
                (SessionCipher::AesNgs(c.clone()), SessionCipher::AesNgs(c))
            }
            SessionCipher::Rc4(mut c) => {
                let incoming = Rc4Cipher {
                    enc: None,
                    dec: c.dec.take(),
                    secret: c.secret.clone(),
                };
                (SessionCipher::Rc4(incoming), SessionCipher::Rc4(c))
            }
        }
    }
}

/// AES-256-CBC with per-envelope random IV
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesCipher {
    key: [u8; 0x20],
    secret: Vec<u8>,
}

impl fmt::Debug for AesCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesCipher")
    }
}

impl AesCipher {
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < AES_ENVELOPE_HEADER_LEN {
            return Err(ProtocolError::EncryptionError(
                constants::ERR_ENVELOPE_TOO_SHORT.into(),
            ));
        }
        let mut iv = [0u8; 0x10];
        iv.copy_from_slice(&data[ENVELOPE_HEADER_LEN..AES_ENVELOPE_HEADER_LEN]);
        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&data[AES_ENVELOPE_HEADER_LEN..])
            .map_err(|_| ProtocolError::EncryptionError(constants::ERR_DECRYPTION_FAILED.into()))
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; 0x10];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext =
            Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(data);

        let mut out = Vec::with_capacity(AES_ENVELOPE_HEADER_LEN + ciphertext.len());
        out.put_bytes(0, 0x40);
        out.put_u32(ENVELOPE_MARKER);
        out.put_u32_le((ciphertext.len() + AES_ENVELOPE_HEADER_LEN) as u32);
        out.put_slice(&iv);
        out.put_slice(&ciphertext);

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(HMAC_KEY).map_err(crypto_err)?;
        mac.update(&out[ENVELOPE_LENGTH_OFFSET..]);
        out[0x20..0x40].copy_from_slice(&mac.finalize().into_bytes());
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(HMAC_KEY).map_err(crypto_err)?;
        mac.update(&out[..AES_ENVELOPE_HEADER_LEN]);
        out[..0x20].copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}

/// AES-256-CBC with chained IVs per direction
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesNgsCipher {
    key: [u8; 0x20],
    iv_in: [u8; 0x10],
    iv_out: [u8; 0x10],
    secret: Vec<u8>,
}

impl fmt::Debug for AesNgsCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesNgsCipher")
    }
}

impl AesNgsCipher {
    fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < ENVELOPE_HEADER_LEN + 0x10 {
            return Err(ProtocolError::EncryptionError(
                constants::ERR_ENVELOPE_TOO_SHORT.into(),
            ));
        }
        let mut next_iv = [0u8; 0x10];
        next_iv.copy_from_slice(&data[data.len() - 0x10..]);
        let plain = Aes256CbcDec::new(&self.key.into(), &self.iv_in.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&data[ENVELOPE_HEADER_LEN..])
            .map_err(|_| ProtocolError::EncryptionError(constants::ERR_DECRYPTION_FAILED.into()))?;
        self.iv_in = next_iv;
        if compression::is_zstd_frame(&plain) {
            compression::decompress(&plain)
        } else {
            Ok(plain)
        }
    }

    fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &self.iv_out.into())
            .encrypt_padded_vec_mut::<Pkcs7>(data);

        let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + ciphertext.len());
        out.put_bytes(0, 0x40);
        out.put_u32(ENVELOPE_MARKER);
        out.put_u32_le((ciphertext.len() + ENVELOPE_HEADER_LEN) as u32);
        out.put_slice(&ciphertext);

        let hash = Sha256::digest(&out[ENVELOPE_LENGTH_OFFSET..]);
        out[0x20..0x40].copy_from_slice(&hash);
        let hash = Sha256::digest(&out[..ENVELOPE_HEADER_LEN]);
        out[..0x20].copy_from_slice(&hash);

        self.iv_out.copy_from_slice(&out[out.len() - 0x10..]);
        Ok(out)
    }
}

/// RC4 keystreams, one per direction. A split cipher keeps only one.
pub struct Rc4Cipher {
    enc: Option<Rc4<U16>>,
    dec: Option<Rc4<U16>>,
    secret: Zeroizing<[u8; 0x10]>,
}

impl fmt::Debug for Rc4Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rc4Cipher")
    }
}

/// Build AES key material: the secret is wrapped with `key`, then the key is
/// appended. The result is what a client encrypts under the server's RSA key.
pub fn aes_key_material(secret: &[u8; 0x20], key: &[u8; 0x20]) -> Vec<u8> {
    let mut out = Aes256CbcEnc::new(&(*key).into(), &KEY_MATERIAL_IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(secret);
    out.extend_from_slice(key);
    out
}

/// Build RC4 key material: RC4-encrypted secret followed by the key
pub fn rc4_key_material(secret: &[u8; 0x10], key: &[u8; 0x10]) -> Vec<u8> {
    let mut out = secret.to_vec();
    Rc4::<U16>::new(&(*key).into()).apply_keystream(&mut out);
    out.extend_from_slice(key);
    out
}

/// Fresh random key material for the given dialect's cipher family
pub fn random_key_material(use_aes: bool) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    if use_aes {
        let mut secret = Zeroizing::new([0u8; 0x20]);
        let mut key = Zeroizing::new([0u8; 0x20]);
        rng.fill_bytes(&mut secret[..]);
        rng.fill_bytes(&mut key[..]);
        aes_key_material(&secret, &key)
    } else {
        let mut secret = Zeroizing::new([0u8; 0x10]);
        let mut key = Zeroizing::new([0u8; 0x10]);
        rng.fill_bytes(&mut secret[..]);
        rng.fill_bytes(&mut key[..]);
        rc4_key_material(&secret, &key)
    }
}
