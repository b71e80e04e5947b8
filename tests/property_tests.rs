//! Property-based tests using proptest
//!
//! These tests validate codec invariants across a wide range of randomly
//! generated packets and byte strings.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use packetlib::core::header::{split_frames, PacketType};
use packetlib::core::serialization::{MultiFormat, SerializedFormat};
use packetlib::protocol::models::{ChatArea, EntityType, MessageType, ObjectHeader};
use packetlib::protocol::{
    ChatMessage, ChatMessageNGS, ClientPongPacket, LobbyMonitorPacket, Packet, PacketWorker,
    SetPlayerIDPacket, SystemMessagePacket,
};
use packetlib::utils::compression::{decompress, encoder};
use proptest::prelude::*;
use std::io::Write;
use std::time::Duration;

const DIALECTS: [PacketType; 5] = [
    PacketType::NGS,
    PacketType::Classic,
    PacketType::NA,
    PacketType::JP,
    PacketType::Vita,
];

fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,.!?]{0,40}"
}

fn object_header() -> impl Strategy<Value = ObjectHeader> {
    (
        any::<u32>(),
        any::<u32>(),
        prop_oneof![
            Just(EntityType::Player),
            Just(EntityType::Map),
            Just(EntityType::Object)
        ],
        any::<u16>(),
    )
        .prop_map(|(id, unk, entity_type, unk2)| ObjectHeader {
            id,
            unk,
            entity_type,
            unk2,
        })
}

fn chat_area() -> impl Strategy<Value = ChatArea> {
    prop_oneof![
        Just(ChatArea::Map),
        Just(ChatArea::Party),
        Just(ChatArea::Alliance),
        Just(ChatArea::Whisper),
        Just(ChatArea::Group)
    ]
}

/// Game clock values: millisecond precision, after the epoch
fn psotime() -> impl Strategy<Value = Duration> {
    (0u64..4_000_000_000_000).prop_map(Duration::from_millis)
}

/// Packets valid under every non-Raw dialect
fn common_packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        (any::<u32>(), any::<u32>(), any::<u32>()).prop_map(|(player_id, unk1, unk2)| {
            Packet::SetPlayerID(SetPlayerIDPacket {
                player_id,
                unk1,
                unk2,
            })
        }),
        any::<u32>().prop_map(|video_id| Packet::LobbyMonitor(LobbyMonitorPacket { video_id })),
        (text(), text(), any::<u32>()).prop_map(|(message, unk, msg_num)| {
            Packet::SystemMessage(SystemMessagePacket {
                message,
                unk,
                msg_type: MessageType::GoldenMessage,
                msg_num,
            })
        }),
        (psotime(), psotime(), any::<u32>()).prop_map(|(client_time, server_time, unk1)| {
            Packet::ClientPong(ClientPongPacket {
                client_time,
                server_time,
                unk1,
            })
        }),
    ]
}

fn chat_packet(packet_type: PacketType) -> BoxedStrategy<Packet> {
    let fields = (object_header(), chat_area(), any::<u8>(), any::<u16>(), text(), text());
    if packet_type == PacketType::NGS {
        (fields, any::<u16>(), any::<u16>())
            .prop_map(|((object, channel, unk3, unk4, unk7, message), unk5, unk6)| {
                Packet::ChatMessageNGS(ChatMessageNGS {
                    object,
                    channel,
                    unk3,
                    unk4,
                    unk5,
                    unk6,
                    unk7,
                    message,
                })
            })
            .boxed()
    } else {
        fields
            .prop_map(|(object, channel, unk3, unk4, unk5, message)| {
                Packet::ChatMessage(ChatMessage {
                    object,
                    channel,
                    unk3,
                    unk4,
                    unk5,
                    message,
                })
            })
            .boxed()
    }
}

fn dialect_and_packet() -> impl Strategy<Value = (PacketType, Packet)> {
    prop::sample::select(DIALECTS.to_vec()).prop_flat_map(|packet_type| {
        (
            Just(packet_type),
            prop_oneof![common_packet(), chat_packet(packet_type)],
        )
    })
}

// Property: canonical raw encoding round-trips through the worker
proptest! {
    #[test]
    fn prop_raw_roundtrip((packet_type, packet) in dialect_and_packet()) {
        let mut worker = PacketWorker::new(packet_type, SerializedFormat::JSON);
        let raw = worker.packet_to_raw(&packet).expect("encoding should not fail");

        prop_assert_eq!(raw.len() % 4, 0);
        prop_assert_eq!(u32::from_le_bytes(raw[..4].try_into().unwrap()) as usize, raw.len());

        let decoded = worker.raw_to_packet(&raw).expect("decoding should not fail");
        prop_assert_eq!(&decoded, &packet);
        prop_assert_eq!(worker.packet_to_raw(&decoded).unwrap(), raw);
    }
}

// Property: every serialized format carries the same value
proptest! {
    #[test]
    fn prop_format_equivalence((packet_type, packet) in dialect_and_packet()) {
        let mut worker = PacketWorker::new(packet_type, SerializedFormat::JSON);
        let raw = worker.packet_to_raw(&packet).unwrap();

        for format in SerializedFormat::ALL {
            worker.set_serde_format(format);
            let ser = worker.parse_packet(&raw).expect("parse_packet should not fail");
            prop_assert_eq!(worker.create_packet(&ser).expect("create_packet should not fail"), raw.clone());
        }
    }
}

// Property: concatenated frames split back into the same frames, decoded in order
proptest! {
    #[test]
    fn prop_multi_frame_order(packets in prop::collection::vec(common_packet(), 1..8)) {
        let frames: Vec<Vec<u8>> = packets.iter().map(|p| p.write(PacketType::NGS)).collect();
        let data = frames.concat();

        let split = split_frames(&data).unwrap();
        prop_assert_eq!(split.len(), frames.len());

        let mut worker = PacketWorker::default();
        let first = worker.raw_to_packet(&data).unwrap();
        let mut decoded = vec![first];
        while let Some(next) = worker.next_queued() {
            decoded.push(next);
        }
        prop_assert_eq!(&decoded, &packets);

        // the same order comes back through repeated raw_to_packet calls
        let mut drained = vec![worker.raw_to_packet(&data).unwrap()];
        while worker.queued_len() > 0 {
            drained.push(worker.raw_to_packet(&[]).unwrap());
        }
        prop_assert_eq!(drained, packets);
    }
}

// Property: arbitrary input never panics the decoder, and failures leave the worker usable
proptest! {
    #[test]
    fn prop_arbitrary_bytes_do_not_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut worker = PacketWorker::default();
        if worker.raw_to_packet(&data).is_none() {
            prop_assert!(worker.last_error().is_some());
        }
        while worker.next_queued().is_some() {}
        let load_level = worker.raw_to_packet(&[8, 0, 0, 0, 3, 4, 0, 0]);
        prop_assert!(matches!(load_level, Some(Packet::LoadLevel(_))));
        prop_assert!(worker.last_error().is_none());
    }
}

// Property: unknown opcodes survive verbatim
proptest! {
    #[test]
    fn prop_unknown_body_verbatim(body in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut raw = vec![0u8; 4];
        raw.extend_from_slice(&[0xEE, 0x01, 0, 0]);
        raw.extend_from_slice(&body);
        let len = raw.len() as u32;
        raw[..4].copy_from_slice(&len.to_le_bytes());

        let packet = Packet::read_frame(&raw, PacketType::NGS).unwrap();
        prop_assert!(matches!(packet, Packet::Unknown(_)));
        prop_assert_eq!(packet.write(PacketType::NGS), raw);
    }
}

// Property: zstd compression roundtrip preserves data
proptest! {
    #[test]
    fn prop_zstd_compression_roundtrip(data in prop::collection::vec(any::<u8>(), 0..50000)) {
        let mut stream = encoder(Vec::new(), 3).expect("Encoder should build");
        stream.write_all(&data).expect("Compression should not fail");
        let compressed = stream.finish().expect("Compression should not fail");
        let decompressed = decompress(&compressed).expect("Decompression should not fail");

        prop_assert_eq!(decompressed, data);
    }
}

// Property: MessagePack with names is never smaller than positional
proptest! {
    #[test]
    fn prop_positional_msgpack_is_compact(packet in common_packet()) {
        let positional = packet.serialize_format(SerializedFormat::MessagePack).unwrap();
        let named = packet.serialize_format(SerializedFormat::MessagePackNamed).unwrap();
        prop_assert!(positional.len() <= named.len());
    }
}
