//! Login and key exchange packets (0x11 family).

use super::models::ShipEntry;
use super::server::empty_packet;
use super::PacketBody;
use crate::core::header::{Flags, PacketType};
use crate::core::wire::{WireFormat, WireReader, WireWriter};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size of the RSA block carried by an encryption request
pub const RSA_BLOCK_LEN: usize = 0x104;

/// (0x11, 0x0B) Encryption request.
///
/// On the wire `rsa_data` is byte-reversed and zero padded to
/// [`RSA_BLOCK_LEN`]. Reading keeps the whole big-endian block, padding
/// included, so a decoded request re-encodes byte for byte. Once a connection
/// has decrypted it, `rsa_data` holds the plain key material instead.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionRequestPacket {
    pub rsa_data: Vec<u8>,
}

impl WireFormat for EncryptionRequestPacket {
    fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
        let mut rsa_data = reader.read_rest();
        rsa_data.reverse();
        Ok(Self { rsa_data })
    }

    fn write(&self, writer: &mut WireWriter, _: PacketType) {
        let mut data = self.rsa_data.clone();
        data.reverse();
        if data.len() < RSA_BLOCK_LEN {
            data.resize(RSA_BLOCK_LEN, 0);
        }
        writer.write_bytes(&data);
    }
}

impl PacketBody for EncryptionRequestPacket {
    const ID: u8 = 0x11;
    const SUBID: u8 = 0x0B;
}

/// (0x11, 0x0C) Encryption response. Sent encrypted with the new session key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionResponsePacket {
    pub data: Vec<u8>,
}

impl WireFormat for EncryptionResponsePacket {
    fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
        Ok(Self {
            data: reader.read_rest(),
        })
    }

    fn write(&self, writer: &mut WireWriter, _: PacketType) {
        writer.write_bytes(&self.data);
    }
}

impl PacketBody for EncryptionResponsePacket {
    const ID: u8 = 0x11;
    const SUBID: u8 = 0x0C;
}

/// (0x11, 0x0D) Client ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientPingPacket {
    pub time: Duration,
}

impl WireFormat for ClientPingPacket {
    fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
        Ok(Self {
            time: reader.read_psotime()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, _: PacketType) {
        writer.write_psotime(self.time);
    }
}

impl PacketBody for ClientPingPacket {
    const ID: u8 = 0x11;
    const SUBID: u8 = 0x0D;
}

/// (0x11, 0x0E) Client pong, echoing the ping time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientPongPacket {
    pub client_time: Duration,
    pub server_time: Duration,
    pub unk1: u32,
}

impl WireFormat for ClientPongPacket {
    fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
        Ok(Self {
            client_time: reader.read_psotime()?,
            server_time: reader.read_psotime()?,
            unk1: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, _: PacketType) {
        writer.write_psotime(self.client_time);
        writer.write_psotime(self.server_time);
        writer.write_u32(self.unk1);
    }
}

impl PacketBody for ClientPongPacket {
    const ID: u8 = 0x11;
    const SUBID: u8 = 0x0E;
}

empty_packet!(
    /// (0x11, 0x2B) Client is disconnecting
    ClientGoodbyePacket,
    0x11,
    0x2B
);

/// (0x11, 0x3D) Available ships
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipListPacket {
    pub ships: Vec<ShipEntry>,
    pub timestamp: Duration,
    pub unk: u32,
}

impl ShipListPacket {
    const XOR: u32 = 0xE418;
    const SUB: u32 = 0x51;
}

impl WireFormat for ShipListPacket {
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self> {
        Ok(Self {
            ships: reader.read_magic_vec(Self::XOR, Self::SUB, packet_type)?,
            timestamp: reader.read_duration_secs()?,
            unk: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, packet_type: PacketType) {
        writer.write_magic_vec(&self.ships, Self::XOR, Self::SUB, packet_type);
        writer.write_duration_secs(self.timestamp);
        writer.write_u32(self.unk);
    }
}

impl PacketBody for ShipListPacket {
    const ID: u8 = 0x11;
    const SUBID: u8 = 0x3D;
    const FLAGS: Flags = Flags::PACKED;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn body_of<T: WireFormat>(value: &T) -> Vec<u8> {
        let mut w = WireWriter::new();
        value.write(&mut w, PacketType::NGS);
        w.into_vec()
    }

    #[test]
    fn test_encryption_request_is_reversed_and_padded() {
        let packet = EncryptionRequestPacket {
            rsa_data: vec![1, 2, 3],
        };
        let body = body_of(&packet);
        assert_eq!(body.len(), RSA_BLOCK_LEN);
        assert_eq!(&body[..3], &[3, 2, 1]);
        assert!(body[3..].iter().all(|&b| b == 0));

        let mut r = WireReader::new(&body);
        let back = EncryptionRequestPacket::read(&mut r, PacketType::NGS).unwrap();
        assert_eq!(back.rsa_data.len(), RSA_BLOCK_LEN);
        assert!(back.rsa_data.ends_with(&[1, 2, 3]));
        assert_eq!(body_of(&back), body);
    }

    #[test]
    fn test_encryption_request_keeps_leading_zero_ciphertext() {
        // big-endian ciphertext whose top byte is zero
        let mut block = vec![0u8; 4];
        block.push(0);
        block.extend((1..=0xFF).map(|b| b as u8));
        assert_eq!(block.len(), RSA_BLOCK_LEN);

        let body: Vec<u8> = block.iter().rev().copied().collect();
        let mut r = WireReader::new(&body);
        let back = EncryptionRequestPacket::read(&mut r, PacketType::NGS).unwrap();
        assert_eq!(back.rsa_data, block);
        assert_eq!(body_of(&back), body);
    }

    #[test]
    fn test_ship_list_uses_magic_count() {
        let packet = ShipListPacket {
            ships: vec![ShipEntry::default(); 2],
            timestamp: Duration::from_secs(1_700_000_000),
            unk: 0,
        };
        let body = body_of(&packet);
        let count = u32::from_le_bytes(body[..4].try_into().unwrap());
        assert_eq!((count ^ 0xE418).wrapping_sub(0x51), 2);

        let mut r = WireReader::new(&body);
        assert_eq!(
            ShipListPacket::read(&mut r, PacketType::NGS).unwrap(),
            packet
        );
        assert_eq!(r.remaining(), 0);
    }
}
