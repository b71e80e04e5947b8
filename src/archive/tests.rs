// test-only module included via archive/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::*;
use crate::config::ArchiveConfig;
use crate::core::header::PacketType;
use crate::error::{ArchiveErrorKind, ProtocolError};
use crate::protocol::{LoadLevelPacket, LobbyMonitorPacket, Packet, SetPlayerIDPacket};
use std::io::Cursor;
use std::time::Duration;

const LOAD_LEVEL: [u8; 8] = [8, 0, 0, 0, 3, 4, 0, 0];
/// SetPlayerID with a body cut short: declared length covers only the header
const BROKEN_PLAYER_ID: [u8; 12] = [12, 0, 0, 0, 6, 0, 0, 0, 1, 0, 0, 0];

fn monitor(video_id: u32) -> Packet {
    Packet::LobbyMonitor(LobbyMonitorPacket { video_id })
}

fn archive(compress: bool, fill: impl FnOnce(&mut PPACWriter<Vec<u8>>)) -> Vec<u8> {
    let mut writer = PPACWriter::new(Vec::new(), PacketType::NGS, compress).unwrap();
    fill(&mut writer);
    writer.into_inner().unwrap()
}

/// Version 2 file: no dialect, no compression byte
fn legacy_v2(records: &[(u128, u8, &[u8])]) -> Vec<u8> {
    let mut out = b"PPAC".to_vec();
    out.push(2);
    for (nanos, direction, raw) in records {
        out.extend_from_slice(&nanos.to_le_bytes());
        out.push(*direction);
        out.extend_from_slice(&(raw.len() as u64).to_le_bytes());
        out.extend_from_slice(raw);
    }
    out
}

// =================== Traversal ===================

#[test]
fn test_n_records_then_eof() {
    for compress in [false, true] {
        let file = archive(compress, |w| {
            for i in 0..5 {
                w.write_packet(Duration::from_secs(i), Direction::ToClient, &monitor(i as u32))
                    .unwrap();
            }
        });
        let mut reader = PPACReader::open(file.as_slice()).unwrap();
        assert_eq!(reader.version(), CURRENT_VERSION);
        assert_eq!(reader.packet_type(), PacketType::NGS);
        for i in 0..5 {
            assert_eq!(reader.read_packet(), ReaderResult::Ok);
            let record = reader.get_reader_data().unwrap();
            assert_eq!(record.timestamp_secs(), i);
            assert_eq!(record.packet, Some(monitor(i as u32)));
            assert!(reader.get_reader_data().is_none());
        }
        assert_eq!(reader.read_packet(), ReaderResult::ReaderEOF);
        assert_eq!(reader.read_packet(), ReaderResult::ReaderEOF);
    }
}

#[test]
fn test_write_data_splits_frames() {
    let mut data = LOAD_LEVEL.to_vec();
    data.extend_from_slice(&monitor(9).write(PacketType::NGS));
    let file = archive(false, |w| {
        w.write_data(Duration::from_millis(1500), Direction::ToServer, &data)
            .unwrap();
    });
    let records: Vec<_> = PPACReader::open(file.as_slice())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].raw.as_deref(), Some(&LOAD_LEVEL[..]));
    assert_eq!(records[0].packet, Some(Packet::LoadLevel(LoadLevelPacket {})));
    assert_eq!(records[1].packet, Some(monitor(9)));
    assert_eq!(records[1].direction, Direction::ToServer);
    assert_eq!(records[1].time, Duration::from_millis(1500));
}

#[test]
fn test_write_data_rejects_malformed() {
    let mut writer = PPACWriter::new(Vec::new(), PacketType::NGS, false).unwrap();
    let err = writer
        .write_data(Duration::ZERO, Direction::ToServer, &[12, 0, 0, 0, 3, 4])
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::ArchiveError(ArchiveErrorKind::CorruptedPacket)
    ));
}

// =================== Output types ===================

#[test]
fn test_unparsable_record_is_raw_only_under_both() {
    let file = archive(false, |w| {
        w.write_data_unchecked(Duration::ZERO, Direction::ToClient, &BROKEN_PLAYER_ID)
            .unwrap();
        w.write_data(Duration::ZERO, Direction::ToClient, &LOAD_LEVEL)
            .unwrap();
    });
    let mut reader = PPACReader::open(file.as_slice()).unwrap();
    reader.set_out_type(OutputType::Both);

    assert_eq!(reader.read_packet(), ReaderResult::RawOnly);
    let record = reader.get_reader_data().unwrap();
    assert_eq!(record.raw.as_deref(), Some(&BROKEN_PLAYER_ID[..]));
    assert!(record.packet.is_none());
    assert!(record.parse_error.is_some());

    assert_eq!(reader.read_packet(), ReaderResult::Ok);
    assert_eq!(reader.read_packet(), ReaderResult::ReaderEOF);
}

#[test]
fn test_packet_output_falls_back_to_raw() {
    let file = archive(false, |w| {
        w.write_data_unchecked(Duration::ZERO, Direction::ToClient, &BROKEN_PLAYER_ID)
            .unwrap();
    });
    let mut reader = PPACReader::open(file.as_slice()).unwrap();
    reader.set_out_type(OutputType::Packet);
    assert_eq!(reader.read_packet(), ReaderResult::RawOnly);
}

#[test]
fn test_raw_output_skips_decoding() {
    let packet = Packet::SetPlayerID(SetPlayerIDPacket {
        player_id: 7,
        unk1: 0,
        unk2: 0,
    });
    let file = archive(true, |w| {
        w.write_packet(Duration::ZERO, Direction::ToServer, &packet)
            .unwrap();
    });
    let mut reader = PPACReader::open(Cursor::new(file)).unwrap();
    reader.set_out_type(OutputType::Raw);
    assert_eq!(reader.read_packet(), ReaderResult::RawOnly);
    let record = reader.get_reader_data().unwrap();
    assert_eq!(record.raw, Some(packet.write(PacketType::NGS)));
    assert!(record.parse_error.is_none());
}

#[test]
fn test_legacy_records_are_expanded_per_frame() {
    let mut both = LOAD_LEVEL.to_vec();
    both.extend_from_slice(&LOAD_LEVEL);
    let file = legacy_v2(&[(1_000_000_000, 1, &both[..]), (2_000_000_000, 0, &[0u8; 0][..])]);
    let mut reader = PPACReader::open(file.as_slice()).unwrap();
    assert_eq!(reader.version(), 2);
    assert_eq!(reader.packet_type(), PacketType::NGS);

    let first = reader.read().unwrap().unwrap();
    let second = reader.read().unwrap().unwrap();
    assert_eq!(first.raw, second.raw);
    assert_eq!(first.direction, Direction::ToClient);
    assert_eq!(first.timestamp_secs(), 1);
    assert!(reader.read().unwrap().is_none());
}

// =================== Corruption ===================

#[test]
fn test_bad_magic_and_version() {
    let err = PPACReader::open(&b"PPAX\x05"[..]).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::ArchiveError(ArchiveErrorKind::InvalidFile)
    ));

    for version in [0u8, 6, 255] {
        let file = [b'P', b'P', b'A', b'C', version, 1, 0];
        let err = PPACReader::open(&file[..]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ArchiveError(ArchiveErrorKind::UnsupportedVersion(v)) if v == version
        ));
    }

    let err = PPACReader::open(&b"PPAC\x05\x09\x00"[..]).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::ArchiveError(ArchiveErrorKind::InvalidPacketType(9))
    ));
}

#[test]
fn test_truncated_record_is_terminal() {
    let mut file = archive(false, |w| {
        w.write_data(Duration::ZERO, Direction::ToClient, &LOAD_LEVEL)
            .unwrap();
        w.write_data(Duration::ZERO, Direction::ToClient, &LOAD_LEVEL)
            .unwrap();
    });
    file.truncate(file.len() - 3);

    let mut reader = PPACReader::open(file.as_slice()).unwrap();
    assert_eq!(reader.read_packet(), ReaderResult::Ok);
    assert_eq!(reader.read_packet(), ReaderResult::PPACError);
    let message = reader.last_error().unwrap().to_string();
    assert!(message.contains("truncated"));
    assert_eq!(reader.read_packet(), ReaderResult::PPACError);
    assert_eq!(reader.last_error(), Some(message.as_str()));
}

#[test]
fn test_corrupt_zstd_stream_is_archive_error() {
    let mut file = archive(true, |w| {
        w.write_data(Duration::ZERO, Direction::ToClient, &LOAD_LEVEL)
            .unwrap();
    });
    // keep the file header, replace the stream with a bad frame
    file.truncate(7);
    file.extend_from_slice(&[0x28, 0xB5, 0x2F, 0xFD, 0xFF, 0xFF, 0xFF, 0xFF]);
    file.extend_from_slice(&[0xAB; 64]);

    let mut reader = PPACReader::open(file.as_slice()).unwrap();
    let err = reader.read().unwrap_err();
    assert!(
        matches!(
            err,
            ProtocolError::ArchiveError(ArchiveErrorKind::CorruptStream(_))
        ),
        "{err}"
    );
    assert_eq!(reader.read_packet(), ReaderResult::PPACError);
}

#[test]
fn test_bad_direction_is_terminal() {
    let file = legacy_v2(&[(0, 7, &LOAD_LEVEL[..])]);
    let mut reader = PPACReader::open(file.as_slice()).unwrap();
    let err = reader.read().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::ArchiveError(ArchiveErrorKind::InvalidDirection(7))
    ));
    assert!(matches!(
        reader.read().unwrap_err(),
        ProtocolError::ArchiveError(ArchiveErrorKind::Poisoned)
    ));
}

#[test]
fn test_iterator_yields_error_once() {
    let file = legacy_v2(&[(0, 0, &LOAD_LEVEL[..]), (0, 3, &LOAD_LEVEL[..])]);
    let mut reader = PPACReader::open(file.as_slice()).unwrap();
    assert!(reader.next().unwrap().is_ok());
    assert!(reader.next().unwrap().is_err());
    assert!(reader.next().is_none());
}

#[test]
fn test_record_size_limit_checked_before_allocation() {
    let mut file = b"PPAC\x02".to_vec();
    file.extend_from_slice(&0u128.to_le_bytes());
    file.push(0);
    file.extend_from_slice(&u64::MAX.to_le_bytes());

    let config = ArchiveConfig {
        max_record_size: 1024,
        ..ArchiveConfig::default()
    };
    let mut reader = PPACReader::open(file.as_slice())
        .unwrap()
        .with_config(&config);
    assert!(matches!(
        reader.read().unwrap_err(),
        ProtocolError::ArchiveError(ArchiveErrorKind::RecordTooLarge { limit: 1024, .. })
    ));
}

// =================== Writer ===================

#[test]
fn test_raw_dialect_cannot_be_archived() {
    let err = PPACWriter::new(Vec::new(), PacketType::Raw, false).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::ArchiveError(ArchiveErrorKind::InvalidPacketType(5))
    ));
}

#[test]
fn test_change_packet_type_rewrites_header() {
    for compress in [false, true] {
        let mut writer =
            PPACWriter::new(Cursor::new(Vec::new()), PacketType::NGS, compress).unwrap();
        writer
            .write_data(Duration::ZERO, Direction::ToClient, &LOAD_LEVEL)
            .unwrap();
        writer.change_packet_type(PacketType::NA).unwrap();
        assert_eq!(writer.packet_type(), PacketType::NA);
        writer
            .write_data(Duration::ZERO, Direction::ToClient, &LOAD_LEVEL)
            .unwrap();
        let file = writer.into_inner().unwrap().into_inner();
        assert_eq!(file[5], PacketType::NA.archive_byte().unwrap());

        let records: Vec<_> = PPACReader::open(file.as_slice())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].packet_type, PacketType::NGS);
        assert_eq!(records[1].packet_type, PacketType::NA);
    }
}

#[test]
fn test_dropped_writer_finishes_stream() {
    let mut sink = Vec::new();
    {
        let mut writer = PPACWriter::new(&mut sink, PacketType::JP, true).unwrap();
        writer
            .write_data(Duration::ZERO, Direction::ToServer, &LOAD_LEVEL)
            .unwrap();
    }
    let mut reader = PPACReader::open(sink.as_slice()).unwrap();
    assert_eq!(reader.packet_type(), PacketType::JP);
    assert_eq!(reader.read_packet(), ReaderResult::Ok);
    assert_eq!(reader.read_packet(), ReaderResult::ReaderEOF);
}

#[test]
fn test_direction_discriminants() {
    assert_eq!(Direction::try_from(0).unwrap(), Direction::ToServer);
    assert_eq!(Direction::try_from(1).unwrap(), Direction::ToClient);
    assert!(Direction::try_from(2).is_err());
    assert_eq!(Direction::ToServer.reverse(), Direction::ToClient);
}
