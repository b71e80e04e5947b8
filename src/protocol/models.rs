//! Field types shared by several packet bodies.

use crate::core::header::PacketType;
use crate::core::wire::{WireFormat, WireReader, WireWriter};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Declares a fieldless enum stored as a fixed-width integer. Undefined
/// discriminants are a parse error.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $repr:ident via $read:ident / $write:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[repr($repr)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl TryFrom<$repr> for $name {
            type Error = ProtocolError;

            fn try_from(value: $repr) -> Result<Self> {
                match value {
                    $( v if v == $value => Ok($name::$variant), )+
                    other => Err(ProtocolError::ParseError(format!(
                        concat!("invalid ", stringify!($name), " discriminant {}"),
                        other
                    ))),
                }
            }
        }

        impl WireFormat for $name {
            fn read(reader: &mut WireReader<'_>, _: PacketType) -> Result<Self> {
                $name::try_from(reader.$read()?)
            }

            fn write(&self, writer: &mut WireWriter, _: PacketType) {
                writer.$write(*self as $repr);
            }
        }
    };
}

wire_enum! {
    /// Kind of entity an object header refers to
    pub enum EntityType: u16 via read_u16 / write_u16 {
        #[default]
        Unknown = 0,
        Player = 4,
        Map = 5,
        Object = 6,
        Unk1 = 7,
        Unk2 = 22,
    }
}

wire_enum! {
    /// Chat channel
    pub enum ChatArea: u8 via read_u8 / write_u8 {
        #[default]
        Map = 0,
        Party = 1,
        Alliance = 2,
        Whisper = 3,
        Group = 4,
    }
}

wire_enum! {
    /// Presentation of a system message
    pub enum MessageType: u32 via read_u32 / write_u32 {
        AdminMessage = 1,
        AdminMessageInstant = 2,
        #[default]
        SystemMessage = 3,
        GoldenMessage = 4,
        EventInformationYellow = 5,
        EventInformationGreen = 6,
        ImportantMessage = 7,
        PopupMessage = 8,
    }
}

wire_enum! {
    /// Load state of a ship in the ship list
    pub enum ShipStatus: u16 via read_u16 / write_u16 {
        #[default]
        Unknown = 0,
        Online = 1,
        Busy = 2,
        Full = 3,
        Offline = 4,
    }
}

/// Identifies the object a packet concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub id: u32,
    pub unk: u32,
    pub entity_type: EntityType,
    pub unk2: u16,
}

impl WireFormat for ObjectHeader {
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self> {
        Ok(Self {
            id: reader.read_u32()?,
            unk: reader.read_u32()?,
            entity_type: EntityType::read(reader, packet_type)?,
            unk2: reader.read_u16()?,
        })
    }

    fn write(&self, writer: &mut WireWriter, packet_type: PacketType) {
        writer.write_u32(self.id);
        writer.write_u32(self.unk);
        self.entity_type.write(writer, packet_type);
        writer.write_u16(self.unk2);
    }
}

/// One row of the ship list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipEntry {
    pub id: u32,
    /// At most 16 UTF-16 units
    pub name: String,
    pub ip: Ipv4Addr,
    pub status: ShipStatus,
    pub order: u16,
}

impl Default for ShipEntry {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            ip: Ipv4Addr::UNSPECIFIED,
            status: ShipStatus::default(),
            order: 0,
        }
    }
}

impl WireFormat for ShipEntry {
    fn read(reader: &mut WireReader<'_>, packet_type: PacketType) -> Result<Self> {
        let id = reader.read_u32()?;
        let name = reader.read_fixed_string(0x10)?;
        let ip = reader.read_ipv4()?;
        reader.skip(4)?;
        let status = ShipStatus::read(reader, packet_type)?;
        let order = reader.read_u16()?;
        reader.skip(4)?;
        Ok(Self {
            id,
            name,
            ip,
            status,
            order,
        })
    }

    fn write(&self, writer: &mut WireWriter, packet_type: PacketType) {
        writer.write_u32(self.id);
        writer.write_fixed_string(&self.name, 0x10);
        writer.write_ipv4(self.ip);
        writer.write_zeros(4);
        self.status.write(writer, packet_type);
        writer.write_u16(self.order);
        writer.write_zeros(4);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_discriminants_are_strict() {
        assert_eq!(EntityType::try_from(4).unwrap(), EntityType::Player);
        assert!(EntityType::try_from(3).is_err());
        assert!(MessageType::try_from(0).is_err());
        assert!(ChatArea::try_from(0xFF).is_err());
    }

    #[test]
    fn test_ship_entry_layout() {
        let entry = ShipEntry {
            id: 1,
            name: "Ship01".into(),
            ip: Ipv4Addr::new(127, 0, 0, 1),
            status: ShipStatus::Online,
            order: 1,
        };
        let mut w = WireWriter::new();
        entry.write(&mut w, PacketType::NA);
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), 4 + 0x20 + 4 + 4 + 2 + 2 + 4);
        let mut r = WireReader::new(&bytes);
        assert_eq!(ShipEntry::read(&mut r, PacketType::NA).unwrap(), entry);
    }
}
