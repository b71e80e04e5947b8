#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use packetlib::core::codec::FrameCodec;
use packetlib::utils::crypto::{aes_key_material, rc4_key_material, SessionCipher};
use packetlib::PacketType;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Untrusted bytes under each cipher mode
    let ciphers = [
        Ok(SessionCipher::None),
        SessionCipher::from_key_material(&rc4_key_material(&[1; 0x10], &[2; 0x10]), PacketType::NA),
        SessionCipher::from_key_material(&aes_key_material(&[3; 0x20], &[4; 0x20]), PacketType::JP),
        SessionCipher::from_key_material(&aes_key_material(&[5; 0x20], &[6; 0x20]), PacketType::NGS),
    ];
    for cipher in ciphers.into_iter().flatten() {
        let mut codec = FrameCodec::new(1 << 20);
        codec.set_cipher(cipher);
        let mut buf = BytesMut::from(data);
        while let Ok(Some(_)) = codec.decode(&mut buf) {}
    }
});
