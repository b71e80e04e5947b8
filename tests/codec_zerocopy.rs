//! Integration tests for the frame codec
//!
//! These tests validate the zero-copy split behavior of the decoder and run
//! encrypted frame streams through `Framed` halves over an in-memory pipe.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use packetlib::core::codec::FrameCodec;
use packetlib::protocol::{LobbyMonitorPacket, Packet};
use packetlib::utils::crypto::{random_key_material, SessionCipher};
use packetlib::PacketType;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

fn frame(video_id: u32) -> Vec<u8> {
    Packet::LobbyMonitor(LobbyMonitorPacket { video_id }).write(PacketType::NGS)
}

fn codec_pair(aes: bool, packet_type: PacketType) -> (FrameCodec, FrameCodec) {
    let material = random_key_material(aes);
    let mut sender = FrameCodec::default();
    sender.set_cipher(SessionCipher::from_key_material(&material, packet_type).unwrap());
    let mut receiver = FrameCodec::default();
    receiver.set_cipher(SessionCipher::from_key_material(&material, packet_type).unwrap());
    (sender, receiver)
}

#[test]
fn test_codec_decode_zero_copy_split() {
    let mut codec = FrameCodec::default();

    let bytes = frame(1);
    let mut buffer = BytesMut::from(&bytes[..]);
    let original_capacity = buffer.capacity();

    // Decode splits the buffer without copying
    let decoded = codec.decode(&mut buffer).expect("Failed to decode");
    assert_eq!(decoded.as_deref(), Some(&bytes[..]));

    assert_eq!(buffer.len(), 0);
    assert!(buffer.capacity() <= original_capacity);
}

#[test]
fn test_codec_plaintext_encode_is_identity() {
    let mut codec = FrameCodec::default();
    let mut buffer = BytesMut::new();

    codec.encode(frame(2), &mut buffer).expect("Failed to encode");
    assert_eq!(&buffer[..], &frame(2)[..]);
}

#[test]
fn test_codec_oversized_frame_rejected_and_buffer_dropped() {
    let mut codec = FrameCodec::new(64);
    let mut buffer = BytesMut::from(&[0x00, 0x01, 0x00, 0x00, 3, 4, 0, 0][..]);

    assert!(codec.decode(&mut buffer).is_err());
    assert!(buffer.is_empty());
}

#[test]
fn test_codec_byte_at_a_time_all_ciphers() {
    for (aes, packet_type) in [
        (false, PacketType::Vita),
        (true, PacketType::JP),
        (true, PacketType::NGS),
    ] {
        let (mut sender, mut receiver) = codec_pair(aes, packet_type);
        let mut wire = BytesMut::new();
        for id in 0..4 {
            sender.encode(frame(id), &mut wire).unwrap();
        }

        let mut buffer = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in wire.iter() {
            buffer.extend_from_slice(&[*byte]);
            while let Some(item) = receiver.decode(&mut buffer).unwrap() {
                decoded.push(item.to_vec());
            }
        }
        assert_eq!(decoded, (0..4).map(frame).collect::<Vec<_>>(), "{packet_type}");
    }
}

#[tokio::test]
async fn test_framed_encrypted_stream() {
    for (aes, packet_type) in [(false, PacketType::NA), (true, PacketType::NGS)] {
        let (sender, receiver) = codec_pair(aes, packet_type);
        let (client, server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            let mut framed = FramedWrite::new(client, sender);
            for id in 0..100 {
                framed.send(frame(id)).await.unwrap();
            }
            framed.into_inner().shutdown().await.unwrap();
        });

        let mut framed = FramedRead::new(server, receiver);
        for id in 0..100 {
            let item = framed.next().await.expect("stream ended early").unwrap();
            assert_eq!(&item[..], &frame(id)[..]);
        }
        assert!(framed.next().await.is_none());
        writer.await.unwrap();
    }
}
