//! Fuzz target for request-body parsing in upload-pack and receive-pack.

#![no_main]

use hoard_git::{find_pack_signature, parse_commands, validate_ref_name, WantHave};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = WantHave::parse(data);

    let head = match find_pack_signature(data) {
        Some(start) => &data[..start],
        None => data,
    };
    for command in parse_commands(head) {
        let _ = validate_ref_name(&command.ref_name);
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = validate_ref_name(s);
    }
});
