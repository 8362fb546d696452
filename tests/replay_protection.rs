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

use attestd::core::chain::envelope::SealedEnvelope;
use attestd::core::chain::index::Admission;
use attestd::core::chain::ledger::LedgerError;

#[test]
fn resubmitting_an_old_envelope_changes_nothing() {
    let n = common::node();
    let a = common::signer();
    let chain = common::lane(&a, 3);
    for e in &chain {
        n.ledger.submit(e.clone()).unwrap();
    }
    let g = chain[0].hash();
    let heads = n.ledger.lane_heads().unwrap();

    for e in &chain {
        let r = n.ledger.submit(e.clone()).unwrap();
        assert_eq!(r.admission, Admission::Duplicate { hash: e.hash() });
        assert!(!r.is_new);
    }
    assert_eq!(n.ledger.tips(Some(&g)).unwrap(), vec![chain[3].hash()]);
    assert_eq!(n.ledger.lane_heads().unwrap(), heads);
    assert!(n.ledger.chains().unwrap()[0].conflicts.is_empty());
}

#[test]
fn moving_a_signed_envelope_to_another_chain_breaks_its_signature() {
    let n = common::node();
    let a = common::signer();
    let one = common::lane(&a, 1);
    let two = common::lane(&a, 0);
    for e in one.iter().chain(two.iter()) {
        n.ledger.submit(e.clone()).unwrap();
    }

    let mut moved = one[1].envelope().clone();
    moved.header.ancestors = moved.header.ancestors.map(|mut anc| {
        anc.genesis = two[0].hash();
        anc.prev_msg = two[0].hash();
        anc
    });
    let moved = SealedEnvelope::seal(moved).unwrap();
    assert!(matches!(
        n.ledger.submit(moved.clone()),
        Err(LedgerError::InvalidSignature { hash }) if hash == moved.hash()
    ));
    assert!(!n.ledger.contains(&moved.hash()).unwrap());
    assert_eq!(n.metrics.invalid_signatures_total.get(), 1);
}

#[test]
fn tampered_payload_or_key_is_rejected() {
    let n = common::node();
    let a = common::signer();
    let b = common::signer();
    let g = common::genesis(&a, b"original");

    let mut payload = g.envelope().clone();
    payload.msg = b"forged".to_vec();
    assert!(matches!(
        n.ledger.submit(SealedEnvelope::seal(payload).unwrap()),
        Err(LedgerError::InvalidSignature { .. })
    ));

    let mut key = g.envelope().clone();
    key.header.key = common::key_of(&b);
    assert!(matches!(
        n.ledger.submit(SealedEnvelope::seal(key).unwrap()),
        Err(LedgerError::InvalidSignature { .. })
    ));
    assert!(n.ledger.tips(None).unwrap().is_empty());
}

#[test]
fn dangerous_push_stores_but_only_indexes_valid_envelopes() {
    let n = common::node();
    let a = common::signer();
    let g = common::genesis(&a, b"g");

    let mut forged = g.envelope().clone();
    forged.msg = b"not what was signed".to_vec();
    let report = n.ledger.inject_unverified(forged).unwrap();
    assert!(report.is_new);
    assert!(!report.indexed);
    assert!(report.detail.is_some());
    assert!(n.ledger.contains(&report.hash).unwrap());
    assert!(!n.ledger.is_indexed(&report.hash).unwrap());

    let report = n.ledger.inject_unverified(g.envelope().clone()).unwrap();
    assert_eq!(report.hash, g.hash());
    assert!(report.indexed);
    assert_eq!(report.detail, None);
    assert_eq!(n.ledger.tips(None).unwrap(), vec![g.hash()]);
}
