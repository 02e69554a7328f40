//! Fuzz target for pkt-line decoding.
//!
//! Both the strict reader and the lenient line decoder must handle arbitrary
//! input without panicking.

#![no_main]

use hoard_git::{decode_lines, encode_pkt_line, PktLineReader, MAX_PKT_PAYLOAD};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = PktLineReader::new(data);
    loop {
        match reader.read() {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }

    let lines = decode_lines(data);
    for line in &lines {
        assert!(line.len() <= MAX_PKT_PAYLOAD);
        // Every decoded line must re-encode.
        let _ = encode_pkt_line(line);
    }
});
