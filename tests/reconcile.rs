//! Reconcile sweep repairs and delete cleanup: abandoned groups get
//! re-covered, missed failbacks are retried, and deleted gateways leave no
//! references behind.

mod fixtures;

use gwmon::{Availability, GwAgroupState, GwMap};

use fixtures::{beacon, grp, gw, key, RecordingFencing};

fn two_gateway_cluster(fencing: &RecordingFencing) -> GwMap {
    let mut map = GwMap::default();
    map.add_gateway(gw("GW1"), key()).expect("add GW1");
    map.add_gateway(gw("GW2"), key()).expect("add GW2");
    map.process_beacon(fencing, beacon(&gw("GW1")));
    map.process_beacon(fencing, beacon(&gw("GW2")));
    map.take_proposal_pending();
    map
}

/// GW1 recovered while GW2 was still fencing its takeover: GW1 sits
/// available and standby on its own group, GW2 holds the fence.
fn recovery_during_fencing(fencing: &RecordingFencing) -> GwMap {
    let mut map = two_gateway_cluster(fencing);
    map.gateway_down(fencing, &gw("GW1"), &key()).expect("down");
    map.process_beacon(fencing, beacon(&gw("GW1")));
    let gw1 = map.gateway(&key(), &gw("GW1")).expect("row");
    assert_eq!(gw1.availability(), Availability::Available);
    assert_eq!(gw1.state(grp(0)), GwAgroupState::Standby);
    assert_eq!(
        map.gateway(&key(), &gw("GW2")).expect("row").state(grp(0)),
        GwAgroupState::WaitFailoverPrepared
    );
    map
}

#[test]
fn sweep_reclaims_abandoned_group_for_live_owner() {
    let fencing = RecordingFencing::new();
    let mut map = recovery_during_fencing(&fencing);
    // The fencing holder disappears entirely.
    map.delete_gateway(&gw("GW2"), &key()).expect("delete GW2");
    map.take_proposal_pending();

    map.sweep_abandoned(&fencing);

    let gw1 = map.gateway(&key(), &gw("GW1")).expect("row");
    assert_eq!(gw1.state(grp(0)), GwAgroupState::Active);
    assert!(map.proposal_pending());
}

#[test]
fn sweep_defers_while_fencing_is_in_flight() {
    let fencing = RecordingFencing::new();
    let mut map = recovery_during_fencing(&fencing);
    map.take_proposal_pending();

    map.sweep_abandoned(&fencing);

    // GW2 still owns the fence; nothing may double-claim group 0.
    assert_eq!(
        map.gateway(&key(), &gw("GW1")).expect("row").state(grp(0)),
        GwAgroupState::Standby
    );
    assert_eq!(
        map.gateway(&key(), &gw("GW2")).expect("row").state(grp(0)),
        GwAgroupState::WaitFailoverPrepared
    );
}

#[test]
fn sweep_retries_missed_failback_via_handshake() {
    let fencing = RecordingFencing::new();
    let mut map = recovery_during_fencing(&fencing);

    // GW2's keep-alive completes the takeover after the epoch moves on;
    // the recovered owner is still sitting standby.
    fencing.bump_epoch();
    map.process_beacon(&fencing, beacon(&gw("GW2")));
    assert_eq!(
        map.gateway(&key(), &gw("GW2")).expect("row").state(grp(0)),
        GwAgroupState::Active
    );

    map.sweep_abandoned(&fencing);

    let gw1 = map.gateway(&key(), &gw("GW1")).expect("row GW1");
    let gw2 = map.gateway(&key(), &gw("GW2")).expect("row GW2");
    assert_eq!(gw2.state(grp(0)), GwAgroupState::WaitFailbackPrepared);
    assert_eq!(gw1.state(grp(0)), GwAgroupState::BlockedAgroupOwner);
    let cell = map.timer(&key(), &gw("GW2"), grp(0));
    assert!(cell.is_armed());
    assert_eq!(cell.deadline_ticks(), 2);

    // And the timer completes the handback as usual.
    map.tick(&fencing);
    map.tick(&fencing);
    assert_eq!(
        map.gateway(&key(), &gw("GW1")).expect("row").state(grp(0)),
        GwAgroupState::Active
    );
}

#[test]
fn sweep_recovers_missed_failover_without_nonces() {
    let fencing = RecordingFencing::new();
    let mut map = two_gateway_cluster(&fencing);
    map.gateway_down(&fencing, &gw("GW1"), &key()).expect("down");

    // Let the failover preparation rot: the epoch never advances, so the
    // timer expires and GW2 steps back.
    for _ in 0..6 {
        map.tick(&fencing);
    }
    assert_eq!(
        map.gateway(&key(), &gw("GW2")).expect("row").state(grp(0)),
        GwAgroupState::Standby
    );

    // GW1's nonces were consumed by the first fence, so the retry takes the
    // degraded path and activates the candidate directly.
    map.sweep_abandoned(&fencing);
    assert_eq!(
        map.gateway(&key(), &gw("GW2")).expect("row").state(grp(0)),
        GwAgroupState::Active
    );
    assert!(!map.timer(&key(), &gw("GW2"), grp(0)).is_armed());
}

#[test]
fn down_of_failback_holder_rolls_back_blocked_owner() {
    let fencing = RecordingFencing::new();
    let mut map = two_gateway_cluster(&fencing);
    map.gateway_down(&fencing, &gw("GW1"), &key()).expect("down");
    fencing.bump_epoch();
    map.process_beacon(&fencing, beacon(&gw("GW2")));
    map.process_beacon(&fencing, beacon(&gw("GW1")));
    assert_eq!(
        map.gateway(&key(), &gw("GW1")).expect("row").state(grp(0)),
        GwAgroupState::BlockedAgroupOwner
    );

    map.gateway_down(&fencing, &gw("GW2"), &key()).expect("down");

    let gw1 = map.gateway(&key(), &gw("GW1")).expect("row GW1");
    let gw2 = map.gateway(&key(), &gw("GW2")).expect("row GW2");
    assert_eq!(gw1.state(grp(0)), GwAgroupState::Standby);
    assert_eq!(gw2.availability(), Availability::Unavailable);
    assert_eq!(gw2.state(grp(0)), GwAgroupState::Standby);
    assert!(!map.timer(&key(), &gw("GW2"), grp(0)).is_armed());

    // The sweep then hands the abandoned group straight back.
    map.sweep_abandoned(&fencing);
    assert_eq!(
        map.gateway(&key(), &gw("GW1")).expect("row").state(grp(0)),
        GwAgroupState::Active
    );
}

#[test]
fn delete_clears_references_from_pending_failover() {
    let fencing = RecordingFencing::new();
    let mut map = two_gateway_cluster(&fencing);
    map.gateway_down(&fencing, &gw("GW1"), &key()).expect("down");
    assert_eq!(
        map.gateway(&key(), &gw("GW2")).expect("row").failover_peer(grp(0)),
        Some(&gw("GW1"))
    );

    map.delete_gateway(&gw("GW1"), &key()).expect("delete GW1");

    let gw2 = map.gateway(&key(), &gw("GW2")).expect("row GW2");
    for g in 0..16 {
        assert_ne!(gw2.failover_peer(grp(g)), Some(&gw("GW1")));
    }
    assert_eq!(gw2.state(grp(0)), GwAgroupState::Standby);
    assert!(!map.timer(&key(), &gw("GW2"), grp(0)).is_armed());
    assert!(map.gateway(&key(), &gw("GW1")).is_none());
}

#[test]
fn delete_of_blocked_owner_releases_failback_partner() {
    let fencing = RecordingFencing::new();
    let mut map = two_gateway_cluster(&fencing);
    map.gateway_down(&fencing, &gw("GW1"), &key()).expect("down");
    fencing.bump_epoch();
    map.process_beacon(&fencing, beacon(&gw("GW2")));
    map.process_beacon(&fencing, beacon(&gw("GW1")));

    map.delete_gateway(&gw("GW1"), &key()).expect("delete GW1");

    let gw2 = map.gateway(&key(), &gw("GW2")).expect("row GW2");
    assert_eq!(gw2.state(grp(0)), GwAgroupState::Standby);
    assert!(gw2.failover_peer(grp(0)).is_none());
    assert!(!map.timer(&key(), &gw("GW2"), grp(0)).is_armed());
}
