// Copyright (c) 2026 Attestd
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use attestd::core::chain::envelope::SealedEnvelope;
use attestd::core::security::verifier::verify;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic, and anything that decodes must re-encode to the same bytes.
    if let Ok(sealed) = SealedEnvelope::decode(data) {
        assert_eq!(sealed.bytes(), data);
        let resealed = SealedEnvelope::seal(sealed.envelope().clone()).expect("decoded envelope reseals");
        assert_eq!(resealed.hash(), sealed.hash());
        let _ = verify(sealed);
    }
});
