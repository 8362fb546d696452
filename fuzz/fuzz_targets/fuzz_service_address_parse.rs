// Copyright (c) 2026 Attestd
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use attestd::core::types::{NodeConfig, ServiceAddress};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    address: String,
    config: String,
}

fuzz_target!(|input: Input| {
    if let Ok(addr) = input.address.parse::<ServiceAddress>() {
        // Display output parses back to the same record.
        let again: ServiceAddress = addr.to_string().parse().expect("rendered address parses");
        assert_eq!(again, addr);
        let _ = addr.base_url();
    }
    let _ = NodeConfig::from_toml(&input.config);
});
