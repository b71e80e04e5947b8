#![allow(clippy::unwrap_used)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use packetlib::archive::{Direction, OutputType, PPACReader, PPACWriter, ReaderResult};
use packetlib::protocol::{LobbyMonitorPacket, Packet};
use packetlib::PacketType;
use std::io::Cursor;
use std::time::Duration;

const RECORDS: u32 = 1000;

fn archive(compress: bool) -> Vec<u8> {
    let mut writer = PPACWriter::new(Vec::new(), PacketType::NGS, compress).unwrap();
    for id in 0..RECORDS {
        let packet = Packet::LobbyMonitor(LobbyMonitorPacket { video_id: id });
        writer
            .write_packet(Duration::from_millis(u64::from(id)), Direction::ToClient, &packet)
            .unwrap();
    }
    writer.into_inner().unwrap()
}

fn bench_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive");
    group.throughput(Throughput::Elements(u64::from(RECORDS)));

    for compress in [false, true] {
        let label = if compress { "zstd" } else { "plain" };

        group.bench_function(format!("write_{label}"), |b| b.iter(|| archive(compress)));

        let data = archive(compress);
        for out_type in [OutputType::Raw, OutputType::Packet, OutputType::Both] {
            group.bench_function(format!("read_{label}_{out_type:?}"), |b| {
                b.iter_batched(
                    || Cursor::new(data.clone()),
                    |cursor| {
                        let mut reader = PPACReader::open(cursor).unwrap();
                        reader.set_out_type(out_type);
                        let mut count = 0;
                        while reader.read_packet() != ReaderResult::ReaderEOF {
                            count += 1;
                        }
                        assert_eq!(count, RECORDS);
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_archive);
criterion_main!(benches);
