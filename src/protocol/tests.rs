// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::header::{build_frame, Flags, PacketHeader, PacketType};
use crate::core::serialization::{MultiFormat, SerializedFormat};
use crate::error::ProtocolError;
use crate::protocol::models::*;
use crate::protocol::*;
use std::net::Ipv4Addr;
use std::time::Duration;

fn sample_packets(packet_type: PacketType) -> Vec<Packet> {
    let mut packets = vec![
        Packet::InitialLoad(InitialLoadPacket {}),
        Packet::LoadLevel(LoadLevelPacket {}),
        Packet::ServerPing(ServerPingPacket {}),
        Packet::ServerPong(ServerPongPacket {}),
        Packet::FinishLoading(FinishLoadingPacket {}),
        Packet::UnlockControls(UnlockControlsPacket {}),
        Packet::SetPlayerID(SetPlayerIDPacket {
            player_id: 1234,
            unk1: 1,
            unk2: 2,
        }),
        Packet::EncryptionRequest(EncryptionRequestPacket {
            rsa_data: vec![0xAA; crate::protocol::login::RSA_BLOCK_LEN],
        }),
        Packet::EncryptionResponse(EncryptionResponsePacket {
            data: vec![0x55; 0x30],
        }),
        Packet::ClientPing(ClientPingPacket {
            time: Duration::from_millis(1_700_000_000_000),
        }),
        Packet::ClientPong(ClientPongPacket {
            client_time: Duration::from_millis(1_700_000_000_000),
            server_time: Duration::from_millis(1_700_000_000_250),
            unk1: 0,
        }),
        Packet::ClientGoodbye(ClientGoodbyePacket {}),
        Packet::ShipList(ShipListPacket {
            ships: vec![
                ShipEntry {
                    id: 1,
                    name: "Ship01".into(),
                    ip: Ipv4Addr::new(10, 0, 0, 1),
                    status: ShipStatus::Online,
                    order: 1,
                },
                ShipEntry {
                    id: 2,
                    name: "Ship02".into(),
                    ip: Ipv4Addr::new(10, 0, 0, 2),
                    status: ShipStatus::Full,
                    order: 2,
                },
            ],
            timestamp: Duration::from_secs(1_700_000_000),
            unk: 0,
        }),
        Packet::SystemMessage(SystemMessagePacket {
            message: "Maintenance at 10:00".into(),
            unk: String::new(),
            msg_type: MessageType::GoldenMessage,
            msg_num: 0,
        }),
        Packet::LobbyMonitor(LobbyMonitorPacket { video_id: 3 }),
    ];
    let object = ObjectHeader {
        id: 100,
        unk: 0,
        entity_type: EntityType::Player,
        unk2: 0,
    };
    if packet_type.is_ngs() {
        packets.push(Packet::ServerHelloNGS(ServerHelloNGSPacket {
            unk1: 3,
            blockid: 201,
            unk2: 0x6601_0000,
            unk3: 0,
        }));
        packets.push(Packet::ChatMessageNGS(ChatMessageNGS {
            object,
            channel: ChatArea::Map,
            message: "hi there".into(),
            ..Default::default()
        }));
    } else {
        packets.push(Packet::ServerHello(ServerHelloPacket {
            unk1: 3,
            blockid: 201,
            unk2: 0x6601_0000,
        }));
        packets.push(Packet::ChatMessage(ChatMessage {
            object,
            channel: ChatArea::Party,
            message: "hi there".into(),
            ..Default::default()
        }));
    }
    packets
}

// =================== Raw round-trips ===================

#[test]
fn test_every_catalog_kind_roundtrips() {
    for ty in [PacketType::NGS, PacketType::NA, PacketType::Vita] {
        for packet in sample_packets(ty) {
            let raw = packet.write(ty);
            assert_eq!(raw.len() % 4, 0, "{ty} {}: unaligned", packet.name());
            let back = Packet::read(&raw, ty).unwrap();
            assert_eq!(back, vec![packet.clone()], "{ty} {}", packet.name());
            assert_eq!(back[0].write(ty), raw);
        }
    }
}

#[test]
fn test_catalog_covers_samples() {
    let mut kinds: Vec<_> = sample_packets(PacketType::NGS)
        .iter()
        .chain(sample_packets(PacketType::NA).iter())
        .filter_map(Packet::kind)
        .collect();
    kinds.sort_by_key(|k| k.name());
    kinds.dedup();
    assert_eq!(kinds.len(), PacketKind::ALL.len());
}

#[test]
fn test_header_carries_flags() {
    let raw = Packet::ShipList(ShipListPacket::default()).write(PacketType::NGS);
    assert_eq!(raw[4..8], [0x11, 0x3D, Flags::PACKED.bits(), 0]);
    let raw = Packet::ChatMessageNGS(ChatMessageNGS::default()).write(PacketType::NGS);
    assert_eq!(raw[6], 0x44);
}

// =================== Concrete parses ===================

#[test]
fn test_load_level_parse() {
    let packets = Packet::read(&[8, 0, 0, 0, 3, 4, 0, 0], PacketType::NGS).unwrap();
    assert_eq!(packets, vec![Packet::LoadLevel(LoadLevelPacket {})]);
    assert_eq!(packets[0].category(), PacketCategory::Server);
}

#[test]
fn test_server_hello_shape_depends_on_dialect() {
    let body = [3, 0, 201, 0, 0, 0, 0, 0, 0, 0, 1, 0x66, 7, 0, 0, 0];
    let frame = build_frame(&PacketHeader::new(3, 8, Flags::NONE), &body, true);
    match Packet::read_frame(&frame, PacketType::NGS).unwrap() {
        Packet::ServerHelloNGS(hello) => {
            assert_eq!(hello.blockid, 201);
            assert_eq!(hello.unk3, 7);
        }
        other => panic!("unexpected {other:?}"),
    }
    // the base layout is 4 bytes shorter, the extra word is trailing data
    let err = Packet::read_frame(&frame, PacketType::NA).unwrap_err();
    assert!(matches!(err, ProtocolError::ParseError(_)));
}

#[test]
fn test_padding_is_tolerated_but_not_more() {
    let frame = build_frame(&PacketHeader::new(3, 4, Flags::NONE), &[0, 0, 0], false);
    assert!(Packet::read_frame(&frame, PacketType::NGS).is_ok());
    let frame = build_frame(&PacketHeader::new(3, 4, Flags::NONE), &[0; 4], false);
    assert!(Packet::read_frame(&frame, PacketType::NGS).is_err());
}

#[test]
fn test_bad_discriminant_is_parse_error() {
    let mut raw = Packet::SystemMessage(SystemMessagePacket::default()).write(PacketType::NA);
    let at = raw.len() - 8;
    raw[at] = 0x42;
    let err = Packet::read(&raw, PacketType::NA).unwrap_err();
    assert!(err.to_string().contains("MessageType"));
}

// =================== Unknown and Raw ===================

#[test]
fn test_unknown_opcode_is_preserved_verbatim() {
    let frame = build_frame(&PacketHeader::new(0x4A, 0x02, Flags::FLAG10), &[1, 2, 3, 4, 5], false);
    let packet = Packet::read_frame(&frame, PacketType::JP).unwrap();
    match &packet {
        Packet::Unknown(unknown) => {
            assert_eq!(unknown.header.opcode(), (0x4A, 0x02));
            assert_eq!(unknown.data, [1, 2, 3, 4, 5]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(packet.write(PacketType::JP), frame);
    assert_eq!(packet.category(), PacketCategory::Unknown);
}

#[test]
fn test_raw_dialect_passes_frames_through() {
    let mut data = vec![8, 0, 0, 0, 3, 4, 0, 0];
    data.extend_from_slice(&[12, 0, 0, 0, 0x11, 0x2B, 0, 0, 9, 9, 9, 9]);
    let packets = Packet::read(&data, PacketType::Raw).unwrap();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[1], Packet::Raw(data[8..].to_vec()));
    assert_eq!(packets[1].category(), PacketCategory::Login);
    assert_eq!(packets[1].write(PacketType::Raw), data[8..]);
}

#[test]
fn test_short_raw_is_zero_filled() {
    assert_eq!(
        Packet::Raw(vec![1, 2]).write(PacketType::Raw),
        [8, 0, 0, 0, 0, 0, 0, 0]
    );
}

// =================== Serialized forms ===================

#[test]
fn test_json_shape() {
    let json = Packet::LoadLevel(LoadLevelPacket {})
        .serialize_format(SerializedFormat::JSON)
        .unwrap();
    assert_eq!(json, br#"{"LoadLevel":{}}"#);

    let packet = Packet::deserialize_format(
        br#"{"SetPlayerID":{"player_id":5}}"#,
        SerializedFormat::JSON,
    )
    .unwrap();
    assert_eq!(
        packet,
        Packet::SetPlayerID(SetPlayerIDPacket {
            player_id: 5,
            ..Default::default()
        })
    );
}

#[test]
fn test_unknown_variant_is_serde_error() {
    let err = Packet::deserialize_format(br#"{"Invalid":{}}"#, SerializedFormat::JSON).unwrap_err();
    assert!(matches!(err, ProtocolError::SerdeError(_)));
    assert!(err.to_string().contains("Invalid"));
}

#[test]
fn test_enc_data_accessors() {
    let mut packet = Packet::EncryptionRequest(EncryptionRequestPacket {
        rsa_data: vec![1, 2],
    });
    assert!(packet.is_enc_data());
    packet.mut_enc_data().unwrap().push(3);
    assert_eq!(packet.as_enc_data().unwrap(), &[1, 2, 3]);
    assert!(!Packet::None.is_enc_data());
    assert_eq!(Packet::None.as_enc_data(), None);
}
