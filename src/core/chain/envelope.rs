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

//! Envelope types and the canonical envelope codec.
//!
//! An envelope is encoded with the canonical bincode rules from `core::types`. Its hash is
//! computed over the full encoding (signature included), so two envelopes with the same
//! hash are byte-identical.

use crate::core::chain::signing::{encode_body, envelope_hash};
use crate::core::types::{
    decode_canonical_limited, encode_canonical, hex_bytes, CodecError, PublicKey, Signature, H256,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Max accepted encoded envelope size.
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

/// Envelope codec errors. All of them mean `MalformedEnvelope`.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Bytes are truncated, trailing or not a valid encoding.
    #[error("malformed envelope: truncated or invalid encoding")]
    Decode,
    /// Encoding exceeds the envelope size limit.
    #[error("malformed envelope: exceeds size limit")]
    TooLarge,
    /// Canonical encoding failed.
    #[error("malformed envelope: encoding failed")]
    Encode,
    /// Genesis envelope with a non-zero height.
    #[error("malformed envelope: genesis must have height 0, got {0}")]
    GenesisHeight(u64),
    /// Non-genesis envelope claiming height 0.
    #[error("malformed envelope: non-genesis envelope at height 0")]
    ZeroHeight,
}

impl From<CodecError> for EnvelopeError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Serialize => EnvelopeError::Encode,
            CodecError::Deserialize => EnvelopeError::Decode,
            CodecError::TooLarge => EnvelopeError::TooLarge,
        }
    }
}

/// Links to the chain root and the direct predecessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ancestors {
    /// Hash of the signer's previous envelope on this chain (or the genesis).
    pub prev_msg: H256,
    /// Hash of the chain's genesis envelope.
    pub genesis: H256,
}

/// Envelope header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Signer identity.
    pub key: PublicKey,
    /// Absent only for a genesis envelope.
    pub ancestors: Option<Ancestors>,
    /// Position within the (genesis, key) lane.
    pub height: u64,
    /// Author wall-clock time in ms (informational only).
    #[serde(default)]
    pub sent_time_ms: u64,
}

/// Signed, hashable unit of the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Header.
    pub header: Header,
    /// Opaque application payload.
    #[serde(with = "hex_bytes")]
    pub msg: Vec<u8>,
    /// Signature over `signing::envelope_signing_bytes(header, msg)`.
    pub signature: Signature,
}

impl Envelope {
    /// True when this envelope roots a chain.
    pub fn is_genesis(&self) -> bool {
        self.header.ancestors.is_none()
    }

    /// Genesis hash this envelope belongs to, if it is not a genesis itself.
    pub fn genesis(&self) -> Option<H256> {
        self.header.ancestors.map(|a| a.genesis)
    }

    /// Canonical encoding of the signed part (`encode(header, msg)`).
    pub fn encode_body(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(encode_body(&self.header, &self.msg)?)
    }

    /// Structural checks independent of any chain state.
    pub fn check_shape(&self) -> Result<(), EnvelopeError> {
        match (&self.header.ancestors, self.header.height) {
            (None, 0) => Ok(()),
            (None, h) => Err(EnvelopeError::GenesisHeight(h)),
            (Some(_), 0) => Err(EnvelopeError::ZeroHeight),
            (Some(_), _) => Ok(()),
        }
    }
}

/// An envelope together with its canonical bytes and hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedEnvelope {
    hash: H256,
    bytes: Vec<u8>,
    envelope: Envelope,
}

impl SealedEnvelope {
    /// Encode and hash an envelope.
    pub fn seal(envelope: Envelope) -> Result<Self, EnvelopeError> {
        envelope.check_shape()?;
        let bytes = encode_canonical(&envelope)?;
        if bytes.len() > MAX_ENVELOPE_BYTES {
            return Err(EnvelopeError::TooLarge);
        }
        Ok(Self { hash: envelope_hash(&bytes), bytes, envelope })
    }

    /// Decode canonical bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Envelope = decode_canonical_limited(bytes, MAX_ENVELOPE_BYTES)?;
        envelope.check_shape()?;
        Ok(Self { hash: envelope_hash(bytes), bytes: bytes.to_vec(), envelope })
    }

    /// Content address.
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Canonical bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decoded envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Chain this envelope is admitted under: its declared genesis, or its own hash for a genesis.
    pub fn chain_id(&self) -> H256 {
        self.envelope.genesis().unwrap_or(self.hash)
    }

    /// Drop the encoding, keep the envelope.
    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ancestors: Option<Ancestors>, height: u64) -> Envelope {
        Envelope {
            header: Header {
                key: PublicKey::from_bytes([3u8; 32]),
                ancestors,
                height,
                sent_time_ms: 1_700_000_000_000,
            },
            msg: b"hello".to_vec(),
            signature: Signature(vec![9u8; 64]),
        }
    }

    #[test]
    fn decode_reproduces_hash() {
        let sealed = SealedEnvelope::seal(sample(None, 0)).unwrap();
        let again = SealedEnvelope::decode(sealed.bytes()).unwrap();
        assert_eq!(again.hash(), sealed.hash());
        assert_eq!(again.chain_id(), sealed.hash());
    }

    #[test]
    fn truncated_input_is_malformed() {
        let sealed = SealedEnvelope::seal(sample(None, 0)).unwrap();
        let cut = &sealed.bytes()[..sealed.bytes().len() - 3];
        assert!(matches!(SealedEnvelope::decode(cut), Err(EnvelopeError::Decode)));

        let mut extra = sealed.bytes().to_vec();
        extra.push(0);
        assert!(matches!(SealedEnvelope::decode(&extra), Err(EnvelopeError::Decode)));
    }

    #[test]
    fn shape_rules() {
        assert!(matches!(
            SealedEnvelope::seal(sample(None, 4)),
            Err(EnvelopeError::GenesisHeight(4))
        ));
        let anc = Ancestors { prev_msg: H256::from_bytes([1; 32]), genesis: H256::from_bytes([1; 32]) };
        assert!(matches!(SealedEnvelope::seal(sample(Some(anc), 0)), Err(EnvelopeError::ZeroHeight)));
        assert!(SealedEnvelope::seal(sample(Some(anc), 1)).is_ok());
    }

    #[test]
    fn signature_is_part_of_the_hash() {
        let a = sample(None, 0);
        let mut b = a.clone();
        b.signature = Signature(vec![8u8; 64]);
        let ha = SealedEnvelope::seal(a).unwrap().hash();
        let hb = SealedEnvelope::seal(b).unwrap().hash();
        assert_ne!(ha, hb);
    }

    #[test]
    fn json_mirror_uses_hex() {
        let e = sample(None, 0);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["msg"], "68656c6c6f");
        assert!(v["header"]["ancestors"].is_null());
        let back: Envelope = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }
}
