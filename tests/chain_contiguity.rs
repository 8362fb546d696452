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

use attestd::core::chain::index::{Admission, ChainError, ConflictKind};
use attestd::core::chain::ledger::LedgerError;

fn conflict_kind(e: LedgerError) -> ConflictKind {
    match e {
        LedgerError::Chain(ChainError::HeightConflict { kind, .. }) => kind,
        other => panic!("expected height conflict, got {other:?}"),
    }
}

#[test]
fn tips_follow_the_lane_and_ignore_other_chains() {
    let n = common::node();
    let a = common::signer();
    let b = common::signer();

    let chain = common::lane(&a, 2);
    for e in &chain {
        n.ledger.submit(e.clone()).unwrap();
    }
    let (g, h2) = (chain[0].hash(), chain[2].hash());

    let other = common::lane(&b, 1);
    for e in &other {
        n.ledger.submit(e.clone()).unwrap();
    }

    assert_eq!(n.ledger.tips(Some(&g)).unwrap(), vec![h2]);
    assert!(!n.ledger.tips(Some(&g)).unwrap().contains(&other[1].hash()));
    // global frontier: ordered by height, then arrival
    assert_eq!(n.ledger.tips(None).unwrap(), vec![other[1].hash(), h2]);
}

#[test]
fn orphan_is_replayed_when_its_predecessor_arrives() {
    let n = common::node();
    let a = common::signer();
    let chain = common::lane(&a, 3);
    let (g, h1, h2, h3) = (&chain[0], &chain[1], &chain[2], &chain[3]);

    n.ledger.submit(g.clone()).unwrap();
    n.ledger.submit(h1.clone()).unwrap();

    // k+2 before k+1
    match n.ledger.submit(h3.clone()) {
        Err(LedgerError::Chain(ChainError::UnknownChain { hash, missing })) => {
            assert_eq!(hash, h3.hash());
            assert_eq!(missing, h2.hash());
        }
        other => panic!("expected orphan, got {other:?}"),
    }
    assert!(n.ledger.is_pending(&h3.hash()).unwrap());
    assert!(n.ledger.contains(&h3.hash()).unwrap());
    assert_eq!(n.metrics.orphans_pending.get(), 1);

    let report = n.ledger.submit(h2.clone()).unwrap();
    match report.admission {
        Admission::Admitted { hash, replayed, rejected } => {
            assert_eq!(hash, h2.hash());
            assert_eq!(replayed, vec![h3.hash()]);
            assert!(rejected.is_empty());
        }
        other => panic!("expected admission, got {other:?}"),
    }
    assert!(!n.ledger.is_pending(&h3.hash()).unwrap());
    assert_eq!(n.ledger.pending_len().unwrap(), 0);
    assert_eq!(n.ledger.tips(Some(&g.hash())).unwrap(), vec![h3.hash()]);
}

#[test]
fn orphans_wait_for_an_unknown_genesis() {
    let n = common::node();
    let a = common::signer();
    let chain = common::lane(&a, 2);

    assert!(n.ledger.submit(chain[2].clone()).is_err());
    assert!(n.ledger.submit(chain[1].clone()).is_err());
    assert_eq!(n.ledger.pending_len().unwrap(), 2);

    let report = n.ledger.submit(chain[0].clone()).unwrap();
    assert_eq!(
        report.admission.admitted_hashes(),
        vec![chain[0].hash(), chain[1].hash(), chain[2].hash()]
    );
}

#[test]
fn second_signer_starts_at_height_one() {
    let n = common::node();
    let a = common::signer();
    let b = common::signer();
    let chain = common::lane(&a, 1);
    let g = chain[0].hash();
    for e in &chain {
        n.ledger.submit(e.clone()).unwrap();
    }

    let b1 = common::child(&b, g, g, 1, b"b1");
    let b2 = common::child(&b, g, b1.hash(), 2, b"b2");
    n.ledger.submit(b1.clone()).unwrap();
    n.ledger.submit(b2.clone()).unwrap();

    let heads = n.ledger.lane_heads().unwrap();
    assert_eq!(heads.len(), 2);
    let b_head = heads.iter().find(|h| h.key == common::key_of(&b)).unwrap();
    assert_eq!((b_head.height, b_head.hash), (2, b2.hash()));

    let lane_b = n.ledger.lane_range(&g, &common::key_of(&b), 0, 10).unwrap();
    assert_eq!(lane_b.len(), 2);
    assert_eq!(lane_b[0].header.height, 1);

    let mut tips = n.ledger.tips(Some(&g)).unwrap();
    tips.sort();
    let mut want = vec![chain[1].hash(), b2.hash()];
    want.sort();
    assert_eq!(tips, want);
}

#[test]
fn height_gap_and_foreign_predecessor_are_conflicts() {
    let n = common::node();
    let a = common::signer();
    let b = common::signer();
    let chain = common::lane(&a, 1);
    let (g, h1) = (chain[0].hash(), chain[1].hash());
    for e in &chain {
        n.ledger.submit(e.clone()).unwrap();
    }

    let gap = common::child(&a, g, h1, 3, b"gap");
    assert_eq!(
        conflict_kind(n.ledger.submit(gap).unwrap_err()),
        ConflictKind::HeightGap { expected: 2, got: 3 }
    );

    let foreign = common::child(&b, g, h1, 2, b"foreign");
    assert_eq!(
        conflict_kind(n.ledger.submit(foreign).unwrap_err()),
        ConflictKind::ForeignPredecessor { predecessor: h1 }
    );

    // neither conflict diverges the lane
    let h2 = common::child(&a, g, h1, 2, b"ok");
    n.ledger.submit(h2.clone()).unwrap();
    assert_eq!(n.ledger.tips(Some(&g)).unwrap(), vec![h2.hash()]);
    assert_eq!(n.metrics.height_conflicts_total.get(), 2);
}

#[test]
fn height_reuse_diverges_the_lane() {
    let n = common::node();
    let a = common::signer();
    let b = common::signer();
    let chain = common::lane(&a, 1);
    let (g, h1) = (chain[0].hash(), chain[1].hash());
    for e in &chain {
        n.ledger.submit(e.clone()).unwrap();
    }

    let fork = common::child(&a, g, g, 1, b"fork");
    assert_eq!(
        conflict_kind(n.ledger.submit(fork.clone()).unwrap_err()),
        ConflictKind::HeightReuse { existing: h1 }
    );

    // a perfectly linked successor is still refused on a diverged lane
    let h2 = common::child(&a, g, h1, 2, b"after");
    assert_eq!(conflict_kind(n.ledger.submit(h2).unwrap_err()), ConflictKind::DivergedLane);

    // other lanes of the same chain are unaffected
    let b1 = common::child(&b, g, g, 1, b"b1");
    n.ledger.submit(b1).unwrap();

    let summary = n.ledger.chains().unwrap().into_iter().find(|c| c.genesis == g).unwrap();
    assert_eq!(summary.conflicts.len(), 2);
    assert_eq!(summary.conflicts[0].hash, fork.hash());
    assert_eq!(summary.envelopes, 3);
    assert!(!n.ledger.is_indexed(&fork.hash()).unwrap());

    // resubmitting a refused envelope repeats the verdict without growing the record
    for _ in 0..50 {
        assert_eq!(
            conflict_kind(n.ledger.submit(fork.clone()).unwrap_err()),
            ConflictKind::HeightReuse { existing: h1 }
        );
    }
    let summary = n.ledger.chains().unwrap().into_iter().find(|c| c.genesis == g).unwrap();
    assert_eq!(summary.conflicts.len(), 2);
    assert_eq!(n.metrics.height_conflicts_total.get(), 2);
}

#[test]
fn predecessor_from_another_chain_is_a_conflict() {
    let n = common::node();
    let a = common::signer();
    let one = common::lane(&a, 1);
    let two = common::lane(&common::signer(), 0);
    for e in one.iter().chain(two.iter()) {
        n.ledger.submit(e.clone()).unwrap();
    }

    let cross = common::child(&a, two[0].hash(), one[1].hash(), 2, b"cross");
    assert_eq!(
        conflict_kind(n.ledger.submit(cross).unwrap_err()),
        ConflictKind::WrongChain { predecessor_chain: one[0].hash() }
    );
}

#[test]
fn authored_envelopes_extend_the_signer_lane() {
    let n = common::node();
    let a = common::signer();
    let g = n.ledger.author_genesis(&a, b"root".to_vec()).unwrap().hash;
    let h1 = n.ledger.author_next(&a, g, b"one".to_vec()).unwrap().hash;
    let h2 = n.ledger.author_next(&a, g, b"two".to_vec()).unwrap().hash;

    let e2 = n.ledger.get(&h2).unwrap();
    assert_eq!(e2.envelope().header.height, 2);
    assert_eq!(e2.envelope().header.ancestors.map(|x| x.prev_msg), Some(h1));
    assert_eq!(n.ledger.tips(Some(&g)).unwrap(), vec![h2]);

    let missing = attestd::core::types::H256::from_bytes([9; 32]);
    assert!(matches!(
        n.ledger.author_next(&a, missing, b"x".to_vec()),
        Err(LedgerError::UnknownGenesis(h)) if h == missing
    ));
}
