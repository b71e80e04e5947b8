//! # Protocol Catalog
//!
//! Maps `(dialect, id, subid)` to the packet kind that decodes the body.
//!
//! Most kinds are shared by every decoding dialect. A few opcodes changed shape
//! in NGS and are registered twice with disjoint availability. The `Raw`
//! dialect has an empty catalog.

use super::PacketKind;
use crate::core::header::PacketType;

/// Which dialects recognize a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Every dialect except `Raw`
    All,
    /// Classic, NA, JP and Vita
    Base,
    NgsOnly,
}

impl Availability {
    pub fn includes(self, packet_type: PacketType) -> bool {
        match self {
            Availability::All => packet_type != PacketType::Raw,
            Availability::Base => packet_type.is_base(),
            Availability::NgsOnly => packet_type.is_ngs(),
        }
    }
}

/// One catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: u8,
    pub subid: u8,
    pub kind: PacketKind,
}

/// Kind registered for an opcode under `packet_type`
pub fn lookup(packet_type: PacketType, id: u8, subid: u8) -> Option<PacketKind> {
    PacketKind::ALL
        .iter()
        .copied()
        .find(|kind| kind.opcode() == (id, subid) && kind.availability().includes(packet_type))
}

/// Every entry visible under `packet_type`, in catalog order
pub fn entries(packet_type: PacketType) -> Vec<CatalogEntry> {
    PacketKind::ALL
        .iter()
        .copied()
        .filter(|kind| kind.availability().includes(packet_type))
        .map(|kind| {
            let (id, subid) = kind.opcode();
            CatalogEntry { id, subid, kind }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_opcodes_are_unique_per_dialect() {
        for ty in PacketType::ALL {
            let mut seen = HashSet::new();
            for entry in entries(ty) {
                assert!(
                    seen.insert((entry.id, entry.subid)),
                    "{ty}: duplicate opcode {:?}",
                    (entry.id, entry.subid)
                );
            }
        }
    }

    #[test]
    fn test_dialect_specific_shapes() {
        assert_eq!(lookup(PacketType::NGS, 3, 8), Some(PacketKind::ServerHelloNGS));
        assert_eq!(lookup(PacketType::NA, 3, 8), Some(PacketKind::ServerHello));
        assert_eq!(lookup(PacketType::Vita, 7, 0), Some(PacketKind::ChatMessage));
        assert_eq!(lookup(PacketType::NGS, 7, 0), Some(PacketKind::ChatMessageNGS));
        assert_eq!(lookup(PacketType::JP, 0xFF, 0xFF), None);
    }

    #[test]
    fn test_raw_catalog_is_empty() {
        assert!(entries(PacketType::Raw).is_empty());
        assert_eq!(lookup(PacketType::Raw, 3, 4), None);
    }
}
