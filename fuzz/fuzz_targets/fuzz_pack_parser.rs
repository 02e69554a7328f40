//! Fuzz target for pack file parsing.
//!
//! Tests that the pack parser and delta resolution handle arbitrary input
//! without panicking.

#![no_main]

use hoard_git::{resolve_entries, PackParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(entries) = PackParser::new(data).parse() {
        let _ = resolve_entries(entries, |_| None);
    }
});
