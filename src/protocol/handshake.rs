//! Key exchange handshake.
//!
//! A session starts in plaintext. The client sends an encryption request
//! carrying symmetric key material wrapped under the server's RSA public key
//! (PKCS#1 v1.5). Once either side has the material it installs the session
//! cipher described in [`crate::utils::crypto`] for every later frame.
//!
//! **Per-Connection State**
//! The handshake phase lives in a [`KeyExchange`] owned by each connection, so
//! two connections never share cipher state.

use super::Packet;
use crate::core::header::{EncryptionPolicy, PacketType};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::SessionCipher;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Source of the server's RSA private key (PKCS#8 PEM)
#[derive(Clone, Default)]
pub enum PrivateKey {
    #[default]
    None,
    Path(PathBuf),
    Pem(String),
    Key(RsaPrivateKey),
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::None => f.write_str("PrivateKey::None"),
            PrivateKey::Path(path) => write!(f, "PrivateKey::Path({})", path.display()),
            PrivateKey::Pem(_) => f.write_str("PrivateKey::Pem(..)"),
            PrivateKey::Key(_) => f.write_str("PrivateKey::Key(..)"),
        }
    }
}

impl PrivateKey {
    /// Resolve the source into a usable key
    pub fn load(self) -> Result<Option<RsaPrivateKey>> {
        let pem = match self {
            PrivateKey::None => return Ok(None),
            PrivateKey::Key(key) => return Ok(Some(key)),
            PrivateKey::Pem(pem) => pem,
            PrivateKey::Path(path) => std::fs::read_to_string(&path).map_err(|e| {
                ProtocolError::EncryptionError(format!(
                    "failed to read private key {}: {e}",
                    path.display()
                ))
            })?,
        };
        RsaPrivateKey::from_pkcs8_pem(&pem)
            .map(Some)
            .map_err(|e| ProtocolError::EncryptionError(format!("invalid private key: {e}")))
    }
}

/// Source of the server's RSA public key (SPKI PEM), used by clients
#[derive(Debug, Clone, Default)]
pub enum PublicKey {
    #[default]
    None,
    Path(PathBuf),
    Pem(String),
    Key(RsaPublicKey),
}

impl PublicKey {
    pub fn load(self) -> Result<Option<RsaPublicKey>> {
        let pem = match self {
            PublicKey::None => return Ok(None),
            PublicKey::Key(key) => return Ok(Some(key)),
            PublicKey::Pem(pem) => pem,
            PublicKey::Path(path) => std::fs::read_to_string(&path).map_err(|e| {
                ProtocolError::EncryptionError(format!(
                    "failed to read public key {}: {e}",
                    path.display()
                ))
            })?,
        };
        RsaPublicKey::from_public_key_pem(&pem)
            .map(Some)
            .map_err(|e| ProtocolError::EncryptionError(format!("invalid public key: {e}")))
    }
}

/// Handshake phase of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyExchangePhase {
    #[default]
    AwaitingKeyExchange,
    KeyEstablished,
}

/// Key exchange state machine scoped to one connection
#[derive(Default)]
pub struct KeyExchange {
    phase: KeyExchangePhase,
    private_key: Option<RsaPrivateKey>,
    public_key: Option<RsaPublicKey>,
    passthrough: bool,
}

impl fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyExchange")
            .field("phase", &self.phase)
            .field("has_private_key", &self.private_key.is_some())
            .field("has_public_key", &self.public_key.is_some())
            .field("passthrough", &self.passthrough)
            .finish()
    }
}

impl KeyExchange {
    pub fn new(private_key: Option<RsaPrivateKey>, public_key: Option<RsaPublicKey>) -> Self {
        Self {
            private_key,
            public_key,
            ..Default::default()
        }
    }

    /// Deliver key exchange packets untouched when no private key is configured
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }

    pub fn phase(&self) -> KeyExchangePhase {
        self.phase
    }

    pub fn is_established(&self) -> bool {
        self.phase == KeyExchangePhase::KeyEstablished
    }

    pub fn set_private_key(&mut self, key: Option<RsaPrivateKey>) {
        self.private_key = key;
    }

    pub fn set_public_key(&mut self, key: Option<RsaPublicKey>) {
        self.public_key = key;
    }

    fn ensure_awaiting(&self) -> Result<()> {
        if self.is_established() {
            return Err(ProtocolError::EncryptionError(
                constants::ERR_KEY_ALREADY_ESTABLISHED.into(),
            ));
        }
        Ok(())
    }

    /// Server side: unwrap an incoming encryption request.
    ///
    /// On success the packet's `rsa_data` is replaced by the plain key material
    /// and the cipher to install is returned. Packets other than the key
    /// exchange pass through with `Ok(None)`.
    #[instrument(skip(self, packet))]
    pub fn accept_incoming(
        &mut self,
        packet: &mut Packet,
        packet_type: PacketType,
    ) -> Result<Option<SessionCipher>> {
        if packet_type.encryption_policy() == EncryptionPolicy::Never {
            return Ok(None);
        }
        let Some(rsa_data) = packet.mut_enc_data() else {
            return Ok(None);
        };
        self.ensure_awaiting()?;
        let Some(key) = &self.private_key else {
            if self.passthrough {
                debug!("no private key, passing key exchange through");
                return Ok(None);
            }
            warn!("key exchange received without a private key");
            return Err(ProtocolError::EncryptionError(
                constants::ERR_NO_PRIVATE_KEY.into(),
            ));
        };

        let block = fit_block(rsa_data, key.size())?;
        let material = key.decrypt(Pkcs1v15Encrypt, &block).map_err(|e| {
            ProtocolError::EncryptionError(format!("{}: {e}", constants::ERR_DECRYPTION_FAILED))
        })?;
        let cipher = SessionCipher::from_key_material(&material, packet_type)?;
        *rsa_data = material;
        self.phase = KeyExchangePhase::KeyEstablished;
        info!(cipher = cipher.name(), "session key established");
        Ok(Some(cipher))
    }

    /// Client side: wrap an outgoing encryption request.
    ///
    /// With a public key configured, a request holding plain key material is
    /// replaced by its RSA-encrypted form and the matching cipher is returned.
    /// Without one the packet is sent as is.
    #[instrument(skip(self, packet))]
    pub fn prepare_outgoing(
        &mut self,
        packet: &Packet,
        packet_type: PacketType,
    ) -> Result<Option<(Packet, SessionCipher)>> {
        if packet_type.encryption_policy() == EncryptionPolicy::Never {
            return Ok(None);
        }
        let Some(material) = packet.as_enc_data() else {
            return Ok(None);
        };
        let Some(key) = &self.public_key else {
            return Ok(None);
        };
        self.ensure_awaiting()?;
        let cipher = SessionCipher::from_key_material(material, packet_type)?;
        let wrapped = key
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, material)
            .map_err(|e| {
                ProtocolError::EncryptionError(format!("{}: {e}", constants::ERR_ENCRYPTION_FAILED))
            })?;
        let mut out = packet.clone();
        if let Some(rsa_data) = out.mut_enc_data() {
            *rsa_data = wrapped;
        }
        self.phase = KeyExchangePhase::KeyEstablished;
        info!(cipher = cipher.name(), "session key sent");
        Ok(Some((out, cipher)))
    }
}

/// Size a big-endian RSA block to the modulus length.
///
/// Request blocks carry zero padding beyond the modulus, and shorter blocks
/// are left-padded. Non-zero bytes beyond the modulus are an error.
fn fit_block(data: &[u8], size: usize) -> Result<Vec<u8>> {
    if data.len() >= size {
        let (excess, block) = data.split_at(data.len() - size);
        if excess.iter().any(|&b| b != 0) {
            return Err(ProtocolError::EncryptionError(
                constants::ERR_RSA_BLOCK_TOO_LONG.into(),
            ));
        }
        return Ok(block.to_vec());
    }
    let mut block = vec![0u8; size - data.len()];
    block.extend_from_slice(data);
    Ok(block)
}
