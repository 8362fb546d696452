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

mod common;

use attestd::core::chain::index::Admission;
use attestd::core::security::verifier::verify;
use attestd::core::state::message_store::{MessageStore, StoreError};
use attestd::core::types::H256;

#[test]
fn put_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = MessageStore::open(&db).unwrap();

    let s = common::signer();
    let g = verify(common::genesis(&s, b"hello")).unwrap();

    let first = store.put(&g).unwrap();
    let second = store.put(&g).unwrap();
    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(first.hash, second.hash);
    assert_eq!(store.len(), 1);

    let back = store.get(&g.hash()).unwrap();
    assert_eq!(back.bytes(), g.bytes());
    assert_eq!(back.envelope(), g.envelope());
    assert!(store.is_validated(&g.hash()).unwrap());

    let snap = store.snapshot().unwrap();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap.get(&g.hash()), Some(g.envelope()));
}

#[test]
fn missing_hash_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = MessageStore::open(&db).unwrap();

    let h = H256::from_bytes([7; 32]);
    assert!(matches!(store.get(&h), Err(StoreError::NotFound(x)) if x == h));
    assert!(!store.contains(&h).unwrap());
}

#[test]
fn unverified_bytes_are_not_validated() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = MessageStore::open(&db).unwrap();

    let s = common::signer();
    let g = common::genesis(&s, b"raw");
    assert!(store.put_unverified(&g).unwrap().is_new);
    assert!(store.contains(&g.hash()).unwrap());
    assert!(!store.is_validated(&g.hash()).unwrap());
    assert!(store.validated_hashes().unwrap().is_empty());

    // a later verified put of the same bytes marks it validated
    let v = verify(g).unwrap();
    assert!(!store.put(&v).unwrap().is_new);
    assert!(store.is_validated(&v.hash()).unwrap());
    assert_eq!(store.validated_hashes().unwrap(), vec![v.hash()]);
}

#[test]
fn batch_submission_reports_each_envelope_in_order() {
    let n = common::node();
    let s = common::signer();
    let chain = common::lane(&s, 2);
    let mut tampered = chain[2].envelope().clone();
    tampered.msg = b"edited".to_vec();
    let tampered = attestd::core::chain::envelope::SealedEnvelope::seal(tampered).unwrap();

    let batch = vec![chain[0].clone(), chain[1].clone(), chain[0].clone(), tampered.clone()];
    let out = n.ledger.submit_batch(batch).unwrap();
    assert_eq!(out.len(), 4);
    assert_eq!(out[0].0, chain[0].hash());
    assert!(matches!(out[1].1.as_ref().unwrap().admission, Admission::Admitted { .. }));
    assert_eq!(out[2].1.as_ref().unwrap().admission, Admission::Duplicate { hash: chain[0].hash() });
    assert_eq!(out[3].0, tampered.hash());
    assert!(out[3].1.is_err());
    assert_eq!(n.ledger.tips(None).unwrap(), vec![chain[1].hash()]);
}

#[test]
fn ledger_submit_twice_is_duplicate() {
    let n = common::node();
    let s = common::signer();
    let g = common::genesis(&s, b"g");

    let first = n.ledger.submit(g.clone()).unwrap();
    assert!(first.is_new);
    assert!(matches!(first.admission, Admission::Admitted { .. }));

    let second = n.ledger.submit(g.clone()).unwrap();
    assert!(!second.is_new);
    assert_eq!(second.admission, Admission::Duplicate { hash: g.hash() });
    assert_eq!(n.ledger.tips(None).unwrap(), vec![g.hash()]);
    assert_eq!(n.metrics.envelopes_admitted_total.get(), 1);
    assert_eq!(n.metrics.envelopes_duplicate_total.get(), 1);
}
