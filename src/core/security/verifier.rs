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

//! Envelope signature verification.
//!
//! `verify` is the only way to obtain a [`VerifiedEnvelope`], and the chain index only accepts
//! verified envelopes.

use crate::core::chain::envelope::{EnvelopeError, SealedEnvelope};
use crate::core::chain::signing::envelope_signing_bytes;
use crate::core::types::{PublicKey, Signature, H256};
use ring::signature::{UnparsedPublicKey, ED25519};
use std::ops::Deref;
use thiserror::Error;

/// Verification errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The envelope could not be re-encoded for verification.
    #[error(transparent)]
    Malformed(#[from] EnvelopeError),
    /// Signature does not verify against `header.key`.
    #[error("invalid signature on envelope {hash}")]
    InvalidSignature {
        /// Envelope hash.
        hash: H256,
    },
}

/// Verify signature given raw pubkey bytes.
pub fn verify_pubkey_bytes(pk: &PublicKey, msg: &[u8], sig: &Signature) -> bool {
    // ring requires signature length 64 for Ed25519
    if sig.0.len() != 64 {
        return false;
    }
    UnparsedPublicKey::new(&ED25519, pk.as_bytes())
        .verify(msg, &sig.0)
        .is_ok()
}

/// An envelope whose signature has been checked against its own `header.key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedEnvelope(SealedEnvelope);

impl VerifiedEnvelope {
    /// Unwrap the sealed envelope.
    pub fn into_sealed(self) -> SealedEnvelope {
        self.0
    }
}

impl Deref for VerifiedEnvelope {
    type Target = SealedEnvelope;

    fn deref(&self) -> &SealedEnvelope {
        &self.0
    }
}

/// Authenticate an envelope against the signer key embedded in its header.
pub fn verify(sealed: SealedEnvelope) -> Result<VerifiedEnvelope, VerifyError> {
    let env = sealed.envelope();
    let msg = envelope_signing_bytes(&env.header, &env.msg).map_err(EnvelopeError::from)?;
    if !verify_pubkey_bytes(&env.header.key, &msg, &env.signature) {
        return Err(VerifyError::InvalidSignature { hash: sealed.hash() });
    }
    Ok(VerifiedEnvelope(sealed))
}
