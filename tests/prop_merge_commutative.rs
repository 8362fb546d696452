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
use attestd::core::chain::index::LaneHead;
use attestd::core::types::H256;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Two chains, three signers, nine envelopes. No conflicts among them.
fn fixture() -> &'static Vec<SealedEnvelope> {
    static FIXTURE: OnceLock<Vec<SealedEnvelope>> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let a = common::signer();
        let b = common::signer();
        let c = common::signer();

        let mut out = common::lane(&a, 3);
        let g = out[0].hash();
        let b1 = common::child(&b, g, g, 1, b"b1");
        let b2 = common::child(&b, g, b1.hash(), 2, b"b2");
        out.push(b1);
        out.push(b2);
        out.extend(common::lane(&c, 2));
        out
    })
}

fn final_state(order: &[usize]) -> (Vec<LaneHead>, BTreeSet<H256>, usize, usize) {
    let n = common::node();
    let envs = fixture();
    for &i in order {
        // orphans are expected on the way; the end state is what matters
        let _ = n.ledger.submit(envs[i].clone());
    }
    let tips: BTreeSet<H256> = n.ledger.tips(None).unwrap().into_iter().collect();
    let indexed = envs.iter().filter(|e| n.ledger.is_indexed(&e.hash()).unwrap()).count();
    (n.ledger.lane_heads().unwrap(), tips, n.ledger.pending_len().unwrap(), indexed)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_admission_order_does_not_matter(order in Just((0..9usize).collect::<Vec<_>>()).prop_shuffle()) {
        let reference = final_state(&(0..9).collect::<Vec<_>>());
        let shuffled = final_state(&order);

        prop_assert_eq!(reference.3, 9);
        prop_assert_eq!(&shuffled.0, &reference.0);
        prop_assert_eq!(&shuffled.1, &reference.1);
        prop_assert_eq!(shuffled.2, 0);
        prop_assert_eq!(shuffled.3, 9);
    }
}
