#![no_main]

use libfuzzer_sys::fuzz_target;
use packetlib::archive::{OutputType, PPACReader, ReaderResult};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Corrupt archives end in PPACError, never a panic or a huge allocation
    let Ok(mut reader) = PPACReader::open(Cursor::new(data)) else {
        return;
    };
    reader.set_out_type(OutputType::Both);
    loop {
        match reader.read_packet() {
            ReaderResult::Ok | ReaderResult::RawOnly => {
                assert!(reader.get_reader_data().is_some());
            }
            ReaderResult::ReaderEOF | ReaderResult::PPACError => break,
        }
    }
});
