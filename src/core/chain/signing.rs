// Copyright (c) 2026 Attestd
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Domain-separated signing and hashing bytes for envelopes.

use crate::core::chain::envelope::Header;
use crate::core::types::{encode_canonical, CodecError, H256};
use ring::digest;
use serde::Serialize;

const SIGNING_DOMAIN: &[u8] = b"Attestd-Envelope-Sign-v1";
const HASH_DOMAIN: &[u8] = b"Attestd-Envelope-Hash-v1";

#[derive(Serialize)]
struct SignedPart<'a> {
    header: &'a Header,
    #[serde(with = "crate::core::types::hex_bytes")]
    msg: &'a [u8],
}

/// Canonical encoding of the signed part of an envelope: header followed by the payload.
pub fn encode_body(header: &Header, msg: &[u8]) -> Result<Vec<u8>, CodecError> {
    encode_canonical(&SignedPart { header, msg })
}

/// Signing payload: domain || encode_body(header, msg)
pub fn envelope_signing_bytes(header: &Header, msg: &[u8]) -> Result<Vec<u8>, CodecError> {
    let body = encode_body(header, msg)?;
    let mut out = Vec::with_capacity(SIGNING_DOMAIN.len() + body.len());
    out.extend_from_slice(SIGNING_DOMAIN);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Envelope hash: SHA-256( domain || canonical envelope bytes )
pub fn envelope_hash(canonical: &[u8]) -> H256 {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(HASH_DOMAIN);
    ctx.update(canonical);
    let d = ctx.finish();
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    H256::from_bytes(out)
}
