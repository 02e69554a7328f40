//! Fuzz target for `Authorization` header decoding.

#![no_main]

use hoard_auth::{constant_time_eq, BasicCredentials, PasswordRecord};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(credentials) = BasicCredentials::parse(s) {
        assert!(!credentials.identifier.is_empty());
        assert!(!credentials.secret.is_empty());
        let reparsed = BasicCredentials::parse(&credentials.to_header());
        assert_eq!(reparsed.ok(), Some(credentials));
    }

    let _ = PasswordRecord::parse(s);

    let (a, b) = data.split_at(data.len() / 2);
    assert_eq!(constant_time_eq(a, b), a == b);
});
