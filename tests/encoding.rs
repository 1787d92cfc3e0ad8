//! Wire payload round-trips: the replicated map, gateway beacons, and the
//! exported view shipped to subscribers.

mod fixtures;

use std::collections::BTreeMap;

use gwmon::{decode_exported_map, encode_exported_map, Availability, Beacon, GwMap, Tunables};

use fixtures::{beacon, grp, gw, key, RecordingFencing};

/// Three created gateways, two with nonce vectors, mid-failover state.
fn populated_map() -> GwMap {
    let fencing = RecordingFencing::new();
    let mut map = GwMap::default();
    map.add_gateway(gw("GW1"), key()).expect("add GW1");
    map.add_gateway(gw("GW2"), key()).expect("add GW2");
    map.add_gateway(gw("GW3"), key()).expect("add GW3");
    map.process_beacon(&fencing, beacon(&gw("GW1")));
    map.process_beacon(&fencing, beacon(&gw("GW2")));
    // GW3 stays in created state, never beaconing.
    map.gateway_down(&fencing, &gw("GW1"), &key()).expect("down");
    map
}

#[test]
fn map_payload_round_trips_bytewise() {
    let map = populated_map();
    let bytes = map.encode();
    let decoded = GwMap::decode(&bytes, Tunables::default()).expect("decode");
    assert_eq!(bytes, decoded.encode());
}

#[test]
fn decoded_map_preserves_rows_and_timers() {
    let map = populated_map();
    let decoded = GwMap::decode(&map.encode(), Tunables::default()).expect("decode");

    let gw2 = decoded.gateway(&key(), &gw("GW2")).expect("row GW2");
    assert_eq!(gw2.owned(), Some(grp(1)));
    assert_eq!(gw2.availability(), Availability::Available);
    assert_eq!(gw2.failover_peer(grp(0)), Some(&gw("GW1")));
    assert_eq!(
        gw2.blocklist_epoch(grp(0)),
        map.gateway(&key(), &gw("GW2")).expect("row").blocklist_epoch(grp(0))
    );

    let gw3 = decoded.gateway(&key(), &gw("GW3")).expect("row GW3");
    assert_eq!(gw3.availability(), Availability::Created);
    assert!(gw3.subsystems().is_empty());

    let cell = decoded.timer(&key(), &gw("GW2"), grp(0));
    assert!(cell.is_armed());
    assert_eq!(cell.deadline_ticks(), 6);
}

#[test]
fn decoded_map_keeps_coordinating() {
    // A decoded map is a working map: the pending failover completes on it.
    let fencing = RecordingFencing::new();
    let map = populated_map();
    let mut decoded = GwMap::decode(&map.encode(), Tunables::default()).expect("decode");

    fencing.bump_epoch();
    fencing.bump_epoch();
    decoded.process_beacon(&fencing, beacon(&gw("GW2")));
    assert_eq!(
        decoded.gateway(&key(), &gw("GW2")).expect("row").state(grp(0)),
        gwmon::GwAgroupState::Active
    );
}

#[test]
fn beacon_payload_round_trips() {
    let original = beacon(&gw("GW1"));
    let bytes = original.encode();
    let decoded = Beacon::decode(&bytes).expect("decode");
    assert_eq!(decoded, original);
    assert_eq!(decoded.encode(), bytes);
}

#[test]
fn beacon_with_sparse_nonce_map_round_trips() {
    let mut original = beacon(&gw("GW2"));
    original.nonce_map = BTreeMap::from([
        (grp(1), vec!["abc".to_string(), "def".to_string(), "hij".to_string()]),
        (grp(7), Vec::new()),
    ]);
    original.availability = Availability::Created;
    let decoded = Beacon::decode(&original.encode()).expect("decode");
    assert_eq!(decoded, original);
}

#[test]
fn exported_map_round_trips() {
    let map = populated_map();
    let exported = map.project_all();
    let bytes = encode_exported_map(&exported);
    let decoded = decode_exported_map(&bytes).expect("decode");
    assert_eq!(decoded, exported);
    assert_eq!(encode_exported_map(&decoded), bytes);
}

#[test]
fn exported_map_carries_redundant_owner_sentinel() {
    let fencing = RecordingFencing::new();
    let mut map = GwMap::default();
    map.add_redundant_gateway(gw("SPARE"), key()).expect("add");
    map.process_beacon(&fencing, beacon(&gw("SPARE")));

    let exported = map.project_all();
    let decoded = decode_exported_map(&encode_exported_map(&exported)).expect("decode");
    let group = decoded.get(&key()).expect("group");
    assert_eq!(group.get(&gw("SPARE")).expect("row").owned, None);
}

#[test]
fn truncated_beacon_fails_cleanly() {
    let bytes = beacon(&gw("GW1")).encode();
    for cut in [0, 1, bytes.len() / 2, bytes.len() - 1] {
        assert!(
            Beacon::decode(&bytes[..cut]).is_err(),
            "decode of {cut}-byte prefix should fail"
        );
    }
}

#[test]
fn nonce_ana_group_out_of_range_is_rejected() {
    // A nonce-map ana group id of 0xFF must fail enum validation, not
    // silently alias the redundant sentinel.
    fn put_str(w: &mut Vec<u8>, s: &str) {
        w.extend_from_slice(&(s.len() as u32).to_le_bytes());
        w.extend_from_slice(s.as_bytes());
    }
    let mut w = Vec::new();
    put_str(&mut w, "GW1");
    put_str(&mut w, "pool1");
    put_str(&mut w, "grp1");
    w.extend_from_slice(&0i32.to_le_bytes()); // no subsystems
    w.extend_from_slice(&1i32.to_le_bytes()); // one nonce entry
    w.extend_from_slice(&0xFFu32.to_le_bytes()); // bogus ana group id
    w.extend_from_slice(&0u32.to_le_bytes()); // empty nonce vector
    w.extend_from_slice(&1i32.to_le_bytes()); // availability: available
    w.extend_from_slice(&1u32.to_le_bytes()); // version
    assert!(Beacon::decode(&w).is_err());
}
