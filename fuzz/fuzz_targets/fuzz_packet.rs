#![no_main]

use libfuzzer_sys::fuzz_target;
use packetlib::{MultiFormat, Packet, PacketType, SerializedFormat};

fuzz_target!(|data: &[u8]| {
    // Frame decoding must never panic, nor re-decoding what was encoded
    for packet_type in PacketType::ALL {
        if let Ok(packets) = Packet::read(data, packet_type) {
            for packet in packets {
                let raw = packet.write(packet_type);
                let _ = Packet::read(&raw, packet_type);
            }
        }
    }

    // Structured input from untrusted callers
    for format in SerializedFormat::ALL {
        let _ = Packet::deserialize_format(data, format);
    }
});
