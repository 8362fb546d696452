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

//! Keystore: local user identities and Ed25519 envelope signing.
//!
//! Identities live in the `users` sled tree keyed by public key. An identity either carries a
//! PKCS#8 private key (created locally, can author envelopes) or is a nickname for a foreign
//! key. Private key buffers are zeroized when dropped.

use ring::{
    rand::SystemRandom,
    signature::{Ed25519KeyPair, KeyPair},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::core::chain::envelope::{Envelope, Header};
use crate::core::chain::signing::envelope_signing_bytes;
use crate::core::types::{decode_canonical_limited, encode_canonical, PublicKey, Signature};

const MAX_USER_RECORD_BYTES: usize = 64 * 1024;

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Backing store failure.
    #[error("keystore io")]
    Io,
    /// PKCS#8 document rejected.
    #[error("invalid key encoding")]
    InvalidKey,
    /// Key generation or signing failed.
    #[error("crypto")]
    Crypto,
    /// Stored record does not decode.
    #[error("codec")]
    Codec,
    /// Key not in the directory.
    #[error("unknown identity {0}")]
    UnknownIdentity(PublicKey),
    /// Key known, but only as a foreign public key.
    #[error("no private key held for {0}")]
    NoPrivateKey(PublicKey),
}

/// Signer backend abstraction (HSM compatible).
pub trait SignerBackend: Send + Sync {
    /// Return public key.
    fn public_key(&self) -> PublicKey;
    /// Sign message bytes.
    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError>;
}

/// In-memory Ed25519 signer.
pub struct Ed25519Signer {
    keypair: Ed25519KeyPair,
}

impl Ed25519Signer {
    /// Generate a fresh key. Returns the signer and its PKCS#8 encoding.
    pub fn generate() -> Result<(Self, Zeroizing<Vec<u8>>), KeystoreError> {
        let rng = SystemRandom::new();
        let doc = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| KeystoreError::Crypto)?;
        let pkcs8 = Zeroizing::new(doc.as_ref().to_vec());
        let signer = Self::from_pkcs8(&pkcs8)?;
        Ok((signer, pkcs8))
    }

    /// Parse a PKCS#8 document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, KeystoreError> {
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8).map_err(|_| KeystoreError::InvalidKey)?;
        Ok(Self { keypair })
    }
}

impl SignerBackend for Ed25519Signer {
    fn public_key(&self) -> PublicKey {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.keypair.public_key().as_ref());
        PublicKey::from_bytes(out)
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError> {
        Ok(Signature(self.keypair.sign(msg).as_ref().to_vec()))
    }
}

/// Sign `(header, msg)` and assemble the envelope. `header.key` is set from the signer.
pub fn sign_envelope(
    signer: &dyn SignerBackend,
    mut header: Header,
    msg: Vec<u8>,
) -> Result<Envelope, KeystoreError> {
    header.key = signer.public_key();
    let bytes = envelope_signing_bytes(&header, &msg).map_err(|_| KeystoreError::Codec)?;
    let signature = signer.sign(&bytes)?;
    Ok(Envelope { header, msg, signature })
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct UserRecord {
    nickname: String,
    pkcs8: Option<Vec<u8>>,
}

/// Local directory entry for a signer key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Signer key.
    pub pubkey: PublicKey,
    /// Display name.
    pub nickname: String,
    /// Whether this node can author envelopes for the key.
    pub has_private_key: bool,
}

/// Persistent identity directory.
#[derive(Clone)]
pub struct IdentityStore {
    tree: sled::Tree,
}

impl IdentityStore {
    /// Open the `users` tree.
    pub fn open(db: &sled::Db) -> Result<Self, KeystoreError> {
        let tree = db.open_tree("users").map_err(|_| KeystoreError::Io)?;
        Ok(Self { tree })
    }

    fn load(&self, pk: &PublicKey) -> Result<Option<UserRecord>, KeystoreError> {
        let Some(raw) = self.tree.get(pk.as_bytes()).map_err(|_| KeystoreError::Io)? else {
            return Ok(None);
        };
        let rec = decode_canonical_limited(&raw, MAX_USER_RECORD_BYTES)
            .map_err(|_| KeystoreError::Codec)?;
        Ok(Some(rec))
    }

    fn save(&self, pk: &PublicKey, rec: &UserRecord) -> Result<(), KeystoreError> {
        let bytes = Zeroizing::new(encode_canonical(rec).map_err(|_| KeystoreError::Codec)?);
        self.tree
            .insert(pk.as_bytes(), bytes.as_slice())
            .map_err(|_| KeystoreError::Io)?;
        self.tree.flush().map_err(|_| KeystoreError::Io)?;
        Ok(())
    }

    /// Generate a new key held by this node.
    pub fn create(&self, nickname: &str) -> Result<PublicKey, KeystoreError> {
        let (signer, pkcs8) = Ed25519Signer::generate()?;
        let pk = signer.public_key();
        let rec = UserRecord { nickname: nickname.to_string(), pkcs8: Some(pkcs8.to_vec()) };
        self.save(&pk, &rec)?;
        Ok(pk)
    }

    /// Register (or rename) a key without a private part. A held private key is kept.
    pub fn import(&self, pubkey: PublicKey, nickname: &str) -> Result<(), KeystoreError> {
        let pkcs8 = self.load(&pubkey)?.and_then(|r| r.pkcs8.clone());
        self.save(&pubkey, &UserRecord { nickname: nickname.to_string(), pkcs8 })
    }

    /// Signer for a locally held key.
    pub fn signer(&self, pubkey: &PublicKey) -> Result<Ed25519Signer, KeystoreError> {
        let rec = self.load(pubkey)?.ok_or(KeystoreError::UnknownIdentity(*pubkey))?;
        match rec.pkcs8.as_deref() {
            Some(pkcs8) => Ed25519Signer::from_pkcs8(pkcs8),
            None => Err(KeystoreError::NoPrivateKey(*pubkey)),
        }
    }

    /// Directory entry for a key.
    pub fn get(&self, pubkey: &PublicKey) -> Result<Option<UserIdentity>, KeystoreError> {
        Ok(self.load(pubkey)?.map(|rec| UserIdentity {
            pubkey: *pubkey,
            nickname: rec.nickname.clone(),
            has_private_key: rec.pkcs8.is_some(),
        }))
    }

    /// All directory entries, ordered by key.
    pub fn all_users(&self) -> Result<Vec<UserIdentity>, KeystoreError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (k, v) = item.map_err(|_| KeystoreError::Io)?;
            let key: [u8; 32] = k.as_ref().try_into().map_err(|_| KeystoreError::Codec)?;
            let rec: UserRecord = decode_canonical_limited(&v, MAX_USER_RECORD_BYTES)
                .map_err(|_| KeystoreError::Codec)?;
            out.push(UserIdentity {
                pubkey: PublicKey::from_bytes(key),
                nickname: rec.nickname.clone(),
                has_private_key: rec.pkcs8.is_some(),
            });
        }
        Ok(out)
    }
}
