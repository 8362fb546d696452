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

use attestd::api::{router, AppState};
use attestd::core::security::keystore::IdentityStore;
use attestd::core::types::{ServiceAddress, H256};
use attestd::networking::peer_directory::PeerDirectory;
use attestd::networking::peer_health::BackoffParams;
use attestd::networking::sync::{fetch_round, SyncConfig};
use attestd::networking::transport::{HttpTransport, PeerTransport, PushStatus, RangeRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn serve(node: &common::Node) -> ServiceAddress {
    let state = Arc::new(AppState {
        ledger: node.ledger.clone(),
        directory: Arc::new(PeerDirectory::open(&node.db, node.metrics.clone()).unwrap()),
        identities: IdentityStore::open(&node.db).unwrap(),
        metrics: node.metrics.clone(),
        hidden_service: Some(ServiceAddress::new("abcdef.onion", 13329)),
        max_batch: 64,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    ServiceAddress::new("127.0.0.1", port)
}

async fn post(client: &reqwest::Client, addr: &ServiceAddress, path: &str, body: Value) -> (u16, Value) {
    let resp = client.post(format!("{}{path}", addr.base_url())).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get(client: &reqwest::Client, addr: &ServiceAddress, path: &str) -> (u16, Value) {
    let resp = client.get(format!("{}{path}", addr.base_url())).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

fn hash(v: &Value) -> H256 {
    v.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn control_api_authors_and_lists_chains() {
    let node = common::node();
    let addr = serve(&node).await;
    let client = reqwest::Client::new();

    let (status, g) = post(&client, &addr, "/make_genesis", json!({ "nickname": "alice", "msg": "6869" })).await;
    assert_eq!(status, 200);
    assert_eq!(g["success"], true);
    let genesis = hash(&g["genesis"]);

    let (status, next) = post(
        &client,
        &addr,
        "/attestation_chain/append",
        json!({ "genesis": g["genesis"], "key": g["key"], "msg": "01" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(next["height"], 1);

    let (_, chains) = get(&client, &addr, "/attestation_chain").await;
    assert_eq!(chains["chains"].as_array().unwrap().len(), 1);
    assert_eq!(hash(&chains["chains"][0]["genesis"]), genesis);

    let (_, created) = post(&client, &addr, "/attestation_chain/new", json!({ "nickname": "bob", "group": "league" })).await;
    assert_eq!(created["group"], "league");
    let (status, added) = post(
        &client,
        &addr,
        "/attestation_chain/commit_group/add_member",
        json!({ "group": "league", "genesis": genesis.to_hex() }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(added["added"], true);

    let (_, group) = post(&client, &addr, "/chain_commit_groups", json!({ "name": "league" })).await;
    assert_eq!(group["group"]["members"].as_array().unwrap().len(), 2);
    assert_eq!(group["group"]["all_msgs"].as_object().unwrap().len(), 3);

    let (_, st) = get(&client, &addr, "/status").await;
    assert_eq!(st["success"], true);
    assert_eq!(st["hidden_service"]["host"], "abcdef.onion");
    assert_eq!(st["all_users"].as_array().unwrap().len(), 2);
    assert_eq!(st["tips"].as_array().unwrap().len(), 2);

    let (_, snap) = get(&client, &addr, "/expensive_db_snapshot").await;
    assert_eq!(snap["envelopes"].as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn errors_carry_status_and_message() {
    let node = common::node();
    let addr = serve(&node).await;
    let client = reqwest::Client::new();

    let (status, body) = post(&client, &addr, "/chain_commit_groups", json!({ "name": "missing" })).await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    post(&client, &addr, "/attestation_chain/commit_group/new", json!({ "name": "g" })).await;
    let (status, _) = post(&client, &addr, "/attestation_chain/commit_group/new", json!({ "name": "g" })).await;
    assert_eq!(status, 409);

    let unknown = H256::from_bytes([3; 32]).to_hex();
    let (status, _) = post(
        &client,
        &addr,
        "/attestation_chain/commit_group/add_member",
        json!({ "group": "g", "genesis": unknown }),
    )
    .await;
    assert_eq!(status, 404);

    let (status, _) = post(&client, &addr, "/peer", json!({ "service_url": "", "port": 1 })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn peer_records_round_trip_through_the_api() {
    let node = common::node();
    let addr = serve(&node).await;
    let client = reqwest::Client::new();

    let rec = json!({ "service_url": "peer.example", "port": 7000, "fetch_from": true, "push_to": false });
    let (_, first) = post(&client, &addr, "/peer", rec.clone()).await;
    assert_eq!(first["existed"], false);
    let (_, again) = post(&client, &addr, "/service", rec).await;
    assert_eq!(again["existed"], true);

    let (_, peers) = get(&client, &addr, "/peer").await;
    assert_eq!(peers["peers"].as_array().unwrap().len(), 1);

    let resp = client
        .delete(format!("{}/peer", addr.base_url()))
        .json(&json!({ "service_url": "peer.example", "port": 7000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let (_, peers) = get(&client, &addr, "/peer").await;
    assert!(peers["peers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn http_transport_speaks_the_peer_protocol() {
    let remote = common::node();
    let a = common::signer();
    let chain = common::lane(&a, 3);
    for e in &chain {
        remote.ledger.submit(e.clone()).unwrap();
    }
    let addr = serve(&remote).await;
    let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

    let heads = transport.manifest(&addr).await.unwrap();
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].height, 3);

    let req = RangeRequest { genesis: chain[0].hash(), key: common::key_of(&a), from_height: 2, limit: 10 };
    let envs = transport.fetch_range(&addr, &req).await.unwrap();
    assert_eq!(envs.len(), 2);
    assert_eq!(&envs[0], chain[2].envelope());

    // an orphan is held, a known envelope is a duplicate
    let other = common::lane(&common::signer(), 1);
    let results = transport
        .push(&addr, &[other[1].envelope().clone(), chain[1].envelope().clone()])
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, PushStatus::Pending);
    assert_eq!(results[1].status, PushStatus::Duplicate);

    let local = common::node();
    let cfg = SyncConfig {
        interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(5),
        backoff: BackoffParams::default(),
        max_batch: 64,
    };
    let report = fetch_round(&local.ledger, &transport, &addr, &cfg).await.unwrap();
    assert_eq!(report.admitted, 4);
    assert_eq!(local.ledger.lane_heads().unwrap(), remote.ledger.lane_heads().unwrap());

    let metrics = reqwest::get(format!("{}/metrics", addr.base_url())).await.unwrap().text().await.unwrap();
    assert!(metrics.contains("attestd_envelopes_admitted_total"));
}
