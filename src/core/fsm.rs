//! The per-group failover/failback state machine.
//!
//! All transitions for one (pool, group) scope run through a `GroupView`,
//! an exclusive borrow of that group's rows and timers. Transitions
//! routinely touch two rows (owner + partner); holding the whole group
//! keeps every cross-gateway edit atomic within one event.
//!
//! Event families: beacon (first contact / recovery / keep-alive), down,
//! delete, timer expiry, and the reconcile sweep that repairs missed
//! failovers and failbacks.

use std::collections::BTreeMap;

use super::beacon::BeaconSubsystem;
use super::domain::{AnaGroupId, Availability, GwAgroupState};
use super::error::NoNonces;
use super::fencing::{Fencing, OsdEpoch};
use super::gateway::CreatedGateway;
use super::identity::{GatewayId, GroupKey};
use super::timer::TimerSlab;
use super::tunables::Tunables;

/// Exclusive handle over one group's rows and timers for the duration of a
/// single event.
///
/// `fencing` is absent only on the delete path, which never fences.
pub(crate) struct GroupView<'a> {
    key: &'a GroupKey,
    gws: &'a mut BTreeMap<GatewayId, CreatedGateway>,
    timers: &'a mut BTreeMap<GatewayId, TimerSlab>,
    fencing: Option<&'a dyn Fencing>,
    tunables: &'a Tunables,
    pending: bool,
}

impl<'a> GroupView<'a> {
    pub(crate) fn new(
        key: &'a GroupKey,
        gws: &'a mut BTreeMap<GatewayId, CreatedGateway>,
        timers: &'a mut BTreeMap<GatewayId, TimerSlab>,
        fencing: Option<&'a dyn Fencing>,
        tunables: &'a Tunables,
    ) -> Self {
        Self {
            key,
            gws,
            timers,
            fencing,
            tunables,
            pending: false,
        }
    }

    /// Whether any persisted state changed during this event.
    pub(crate) fn take_pending(self) -> bool {
        self.pending
    }

    fn fencing(&self) -> &dyn Fencing {
        self.fencing
            .unwrap_or_else(|| panic!("event on group {} requires a fencing handle", self.key))
    }

    fn row(&self, gw: &GatewayId) -> &CreatedGateway {
        self.gws
            .get(gw)
            .unwrap_or_else(|| panic!("gateway {gw} not registered in group {}", self.key))
    }

    fn row_mut(&mut self, gw: &GatewayId) -> &mut CreatedGateway {
        let key = self.key;
        self.gws
            .get_mut(gw)
            .unwrap_or_else(|| panic!("gateway {gw} not registered in group {key}"))
    }

    fn arm_timer(&mut self, gw: &GatewayId, group: AnaGroupId, deadline_ticks: u8) {
        self.timers
            .entry(gw.clone())
            .or_default()
            .arm(group, deadline_ticks);
    }

    fn cancel_timer(&mut self, gw: &GatewayId, group: AnaGroupId) {
        if let Some(slab) = self.timers.get_mut(gw) {
            slab.cancel(group);
        }
    }

    fn timer_armed(&self, gw: &GatewayId, group: AnaGroupId) -> bool {
        self.timers.get(gw).is_some_and(|slab| slab.is_armed(group))
    }

    // =========================================================================
    // Beacon events
    // =========================================================================

    /// Swap in the beacon's subsystem and nonce snapshots; returns the
    /// availability the dispatcher branches on.
    pub(crate) fn refresh_registry(
        &mut self,
        gw: &GatewayId,
        subsystems: Vec<BeaconSubsystem>,
        nonce_map: BTreeMap<AnaGroupId, Vec<String>>,
    ) -> Availability {
        let row = self.row_mut(gw);
        row.subsystems = subsystems;
        row.nonce_map = nonce_map;
        row.availability
    }

    /// First beacon ever: allow traffic and claim the owned group.
    pub(crate) fn first_contact(&mut self, gw: &GatewayId) {
        let row = self.row_mut(gw);
        row.availability = Availability::Available;
        for group in AnaGroupId::all() {
            row.set_standby(group);
        }
        if let Some(owned) = row.owned() {
            row.sm_state[owned.index()] = GwAgroupState::Active;
        }
        tracing::debug!("first beacon from {gw} in {}, claiming ownership", self.key);
        self.pending = true;
    }

    /// Beacon after an unavailable spell: start failing back the owned group.
    pub(crate) fn recovery(&mut self, gw: &GatewayId) {
        let owned = {
            let row = self.row_mut(gw);
            row.availability = Availability::Available;
            row.owned()
        };
        match owned {
            None => {
                // Redundant standby: nothing to reclaim.
                let row = self.row_mut(gw);
                for group in AnaGroupId::all() {
                    row.set_standby(group);
                }
            }
            Some(owned) => {
                tracing::debug!("{gw} recovered in {}, preparing failback of {owned}", self.key);
                self.prepare_failback(gw, owned);
            }
        }
        self.pending = true;
    }

    /// Keep-alive: complete any failover whose blocklist epoch has passed.
    pub(crate) fn keep_alive(&mut self, gw: &GatewayId) {
        for group in AnaGroupId::all() {
            let (state, fenced_at) = {
                let row = self.row(gw);
                (row.state(group), row.blocklist_epoch(group))
            };
            if state != GwAgroupState::WaitFailoverPrepared {
                continue;
            }
            let current = self.fencing().current_epoch();
            if current > fenced_at {
                // The fenced peer is guaranteed refused at the storage layer.
                tracing::debug!(
                    "osd epoch advanced past {fenced_at}, {gw} takes over ana group {group}"
                );
                self.row_mut(gw).sm_state[group.index()] = GwAgroupState::Active;
                self.cancel_timer(gw, group);
                self.pending = true;
            }
        }
    }

    // =========================================================================
    // Down / delete
    // =========================================================================

    /// Missed-beacon verdict from the enclosing timeout detector.
    pub(crate) fn down(&mut self, gw: &GatewayId) {
        self.row_mut(gw).availability = Availability::Unavailable;
        tracing::debug!("gateway {gw} down in {}", self.key);
        for group in AnaGroupId::all() {
            match self.row(gw).state(group) {
                GwAgroupState::Standby | GwAgroupState::Idle => {}
                GwAgroupState::BlockedAgroupOwner => {
                    // Partner's failback timer expires on its own.
                }
                GwAgroupState::WaitFailoverPrepared => {
                    self.cancel_timer(gw, group);
                }
                GwAgroupState::WaitFailbackPrepared => {
                    self.cancel_timer(gw, group);
                    self.rollback_blocked_owner(group);
                }
                GwAgroupState::Active => {
                    self.find_failover_candidate(gw, group);
                }
            }
            self.row_mut(gw).set_standby(group);
        }
    }

    /// Per-cell unwind before the row is erased by the admin delete path.
    pub(crate) fn delete(&mut self, gw: &GatewayId) {
        let owned = self.row(gw).owned();
        for group in AnaGroupId::all() {
            match self.row(gw).state(group) {
                GwAgroupState::Standby
                | GwAgroupState::Idle
                | GwAgroupState::BlockedAgroupOwner => {
                    if Some(group) == owned {
                        self.release_interim_holder(gw, group);
                    }
                }
                GwAgroupState::WaitFailoverPrepared => {
                    self.cancel_timer(gw, group);
                }
                GwAgroupState::WaitFailbackPrepared => {
                    self.cancel_timer(gw, group);
                    self.rollback_blocked_owner(group);
                }
                GwAgroupState::Active => {
                    self.pending = true;
                }
            }
            self.row_mut(gw).set_standby(group);
        }
        self.drop_peer_references(gw);
    }

    /// A gateway temporarily holding (or handing back) the deleted owner's
    /// group goes back to standby; the group id is being freed.
    fn release_interim_holder(&mut self, owner: &GatewayId, group: AnaGroupId) {
        let holder = self.gws.iter().find_map(|(id, row)| {
            (id != owner
                && matches!(
                    row.state(group),
                    GwAgroupState::Active | GwAgroupState::WaitFailbackPrepared
                ))
            .then(|| (id.clone(), row.state(group)))
        });
        if let Some((holder_id, state)) = holder {
            if state == GwAgroupState::WaitFailbackPrepared {
                self.cancel_timer(&holder_id, group);
            }
            self.row_mut(&holder_id).set_standby(group);
            self.pending = true;
        }
    }

    /// No surviving row may name the deleted gateway as a peer.
    fn drop_peer_references(&mut self, gone: &GatewayId) {
        let stale: Vec<(GatewayId, AnaGroupId)> = self
            .gws
            .iter()
            .filter(|(id, _)| *id != gone)
            .flat_map(|(id, row)| {
                AnaGroupId::all().filter_map(move |group| {
                    (row.state(group).is_transitional()
                        && row.failover_peer(group) == Some(gone))
                    .then(|| (id.clone(), group))
                })
            })
            .collect();
        for (id, group) in stale {
            tracing::debug!("clearing stale peer reference to {gone} on {id} ana group {group}");
            self.cancel_timer(&id, group);
            self.row_mut(&id).set_standby(group);
            self.pending = true;
        }
    }

    /// Roll an outgoing failback back: the blocked owner returns to standby.
    fn rollback_blocked_owner(&mut self, group: AnaGroupId) {
        let blocked = self.gws.iter().find_map(|(id, row)| {
            (row.state(group) == GwAgroupState::BlockedAgroupOwner).then(|| id.clone())
        });
        if let Some(owner_id) = blocked {
            tracing::debug!(
                "failback of ana group {group} abandoned, owner {owner_id} back to standby"
            );
            self.row_mut(&owner_id).set_standby(group);
            self.pending = true;
        }
    }

    // =========================================================================
    // Timer expiry
    // =========================================================================

    pub(crate) fn expired(&mut self, gw: &GatewayId, group: AnaGroupId) {
        if !self.timer_armed(gw, group) {
            // An earlier handler in this tick batch already resolved the cell.
            return;
        }
        match self.row(gw).state(group) {
            GwAgroupState::WaitFailbackPrepared => {
                tracing::debug!("failback timer expired on {gw} for ana group {group}");
                self.cancel_timer(gw, group);
                self.finish_failback(gw, group);
                self.pending = true;
            }
            GwAgroupState::WaitFailoverPrepared => {
                // The epoch check in keep-alive normally pre-empts this.
                tracing::debug!("failover-prepare timer expired on {gw} for ana group {group}");
                self.cancel_timer(gw, group);
                self.row_mut(gw).set_standby(group);
                self.pending = true;
            }
            other => panic!(
                "timer expired on {gw} ana group {group} in non-wait state {other}"
            ),
        }
    }

    /// Hand the group back to its blocked owner, or to the owner alone if it
    /// restarted during the persistency window.
    fn finish_failback(&mut self, holder: &GatewayId, group: AnaGroupId) {
        let blocked_owner = self.gws.iter().find_map(|(id, row)| {
            (row.state(group) == GwAgroupState::BlockedAgroupOwner
                && row.availability() == Availability::Available)
                .then(|| id.clone())
        });
        if let Some(owner_id) = blocked_owner {
            self.row_mut(holder).set_standby(group);
            self.row_mut(&owner_id).sm_state[group.index()] = GwAgroupState::Active;
            tracing::debug!("failback of ana group {group} complete: {holder} -> {owner_id}");
            return;
        }
        let lone_owner = self.gws.iter().find_map(|(id, row)| {
            (row.owned() == Some(group) && row.availability() == Availability::Available)
                .then(|| id.clone())
        });
        if let Some(owner_id) = lone_owner {
            // Owner failed and came back while the failback was pending.
            self.row_mut(&owner_id).sm_state[group.index()] = GwAgroupState::Active;
            self.row_mut(holder).set_standby(group);
            tracing::debug!("owner {owner_id} reclaims ana group {group} after restart");
            return;
        }
        // Nobody available to hand the group to; the sweep re-covers it.
        self.row_mut(holder).set_standby(group);
        tracing::debug!("failback of ana group {group} found no live owner");
    }

    // =========================================================================
    // Failover / failback preparation
    // =========================================================================

    /// Pick the least-loaded available gateway for the failed owner's group,
    /// fence the failed owner, and arm the preparation timer.
    pub(crate) fn find_failover_candidate(&mut self, failed: &GatewayId, group: AnaGroupId) {
        let mut best: Option<(GatewayId, usize)> = None;
        for (id, row) in self.gws.iter() {
            if row.availability() != Availability::Available || row.is_busy() {
                continue;
            }
            let load = row.active_load();
            let better = match &best {
                None => true,
                Some((_, min)) => load < *min,
            };
            if better {
                best = Some((id.clone(), load));
            }
        }
        let Some((candidate, load)) = best else {
            tracing::debug!(
                "no failover candidate for ana group {group} of {failed} in {}",
                self.key
            );
            // Still propose: subscribers must see the group go inaccessible.
            self.pending = true;
            return;
        };
        tracing::debug!(
            "{candidate} (load {load}) takes over ana group {group} from {failed}"
        );
        self.pending = true;
        {
            let row = self.row_mut(&candidate);
            row.sm_state[group.index()] = GwAgroupState::WaitFailoverPrepared;
            row.failover_peer[group.index()] = Some(failed.clone());
        }
        match self.blocklist_peer(failed, group) {
            Ok(epoch) => {
                let deadline = self.tunables.failover_prepare_ticks;
                self.row_mut(&candidate).blocklist_epoch[group.index()] = epoch;
                self.arm_timer(&candidate, group, deadline);
            }
            Err(err) => {
                // Degraded path: nothing to fence, activate immediately. The
                // peer reference stays, so a later failback still matches.
                tracing::warn!("{err}; activating {candidate} without fencing");
                self.row_mut(&candidate).sm_state[group.index()] = GwAgroupState::Active;
            }
        }
    }

    /// Start handing `group` back to its returning owner: the interim holder
    /// enters the failback wait, the owner is blocked until the holder's
    /// paths are fenced or the timer runs out.
    pub(crate) fn prepare_failback(&mut self, owner: &GatewayId, group: AnaGroupId) {
        let mut active_holder = None;
        let mut fencing_holder = None;
        for (id, row) in self.gws.iter() {
            if id == owner {
                continue;
            }
            match row.state(group) {
                GwAgroupState::Active => active_holder = Some(id.clone()),
                GwAgroupState::WaitFailoverPrepared => fencing_holder = Some(id.clone()),
                _ => {}
            }
        }
        if let Some(holder_id) = active_holder {
            assert_eq!(
                self.row(&holder_id).failover_peer(group),
                Some(owner),
                "interim holder of ana group {group} must reference the returning owner"
            );
            tracing::debug!(
                "{holder_id} holds ana group {group}, preparing failback to {owner}"
            );
            let deadline = self.tunables.failback_prepare_ticks;
            self.row_mut(&holder_id).sm_state[group.index()] =
                GwAgroupState::WaitFailbackPrepared;
            self.arm_timer(&holder_id, group, deadline);
            self.row_mut(owner).sm_state[group.index()] = GwAgroupState::BlockedAgroupOwner;
            match self.blocklist_peer(&holder_id, group) {
                Ok(epoch) => {
                    self.row_mut(&holder_id).blocklist_epoch[group.index()] = epoch;
                }
                Err(err) => {
                    // Degraded: the timer alone bounds the handover.
                    tracing::warn!("{err}; failback of ana group {group} proceeds unfenced");
                }
            }
            self.pending = true;
        } else if let Some(holder_id) = fencing_holder {
            assert_eq!(
                self.row(&holder_id).failover_peer(group),
                Some(owner),
                "pending failover of ana group {group} must reference the returning owner"
            );
            // Fencing still in flight; the sweep retries the failback.
            tracing::debug!(
                "{holder_id} still preparing failover of ana group {group}, failback deferred"
            );
        } else {
            // Nobody took over (single-gateway start): claim the group now.
            self.row_mut(owner).sm_state[group.index()] = GwAgroupState::Active;
            self.pending = true;
        }
    }

    /// Blocklist every nonce the fenced gateway published for `group`.
    ///
    /// A successful call consumes the nonce vector; the next beacon
    /// repopulates it. Returns the epoch the blocklist was accepted at.
    fn blocklist_peer(
        &mut self,
        gw: &GatewayId,
        group: AnaGroupId,
    ) -> Result<OsdEpoch, NoNonces> {
        let addrs = {
            let row = self.row_mut(gw);
            match row.nonce_map.get_mut(&group) {
                Some(nonces) if !nonces.is_empty() => std::mem::take(nonces),
                _ => {
                    return Err(NoNonces {
                        gw: gw.clone(),
                        group,
                    })
                }
            }
        };
        let ttl = self.tunables.blocklist_ttl_secs;
        tracing::debug!(
            "blocklisting {} nonce(s) of {gw} for ana group {group} (ttl {ttl}s)",
            addrs.len()
        );
        Ok(self.fencing().blocklist(&addrs, ttl))
    }

    // =========================================================================
    // Reconcile sweep
    // =========================================================================

    /// Repair missed failovers and failbacks for this group.
    ///
    /// (a) an unavailable owner whose group no live gateway serves gets a
    /// failover candidate; (b) a live owner sitting standby on its own group
    /// reclaims it, via the failback handshake when an interim holder is
    /// still active, directly when the group is unheld.
    pub(crate) fn sweep_abandoned(&mut self) {
        let ids: Vec<GatewayId> = self.gws.keys().cloned().collect();
        for id in &ids {
            let (availability, owned) = {
                let row = self.row(id);
                (row.availability(), row.owned())
            };
            let Some(owned) = owned else {
                continue;
            };
            match availability {
                Availability::Unavailable => {
                    if self.group_in_transition(owned) {
                        continue;
                    }
                    let covered = self.gws.values().any(|r| {
                        r.availability() == Availability::Available
                            && r.state(owned) == GwAgroupState::Active
                    });
                    if !covered {
                        tracing::debug!(
                            "ana group {owned} of {id} is uncovered, retrying failover"
                        );
                        self.find_failover_candidate(id, owned);
                    }
                }
                Availability::Available if self.row(id).state(owned) == GwAgroupState::Standby => {
                    let mut failback_pending = false;
                    let mut fencing_pending = false;
                    let mut active_holder = false;
                    for r in self.gws.values() {
                        match r.state(owned) {
                            GwAgroupState::WaitFailbackPrepared => failback_pending = true,
                            GwAgroupState::WaitFailoverPrepared => fencing_pending = true,
                            GwAgroupState::Active => active_holder = true,
                            _ => {}
                        }
                    }
                    if failback_pending || fencing_pending {
                        continue;
                    }
                    if active_holder {
                        tracing::debug!("retrying missed failback of ana group {owned} to {id}");
                        self.prepare_failback(id, owned);
                    } else {
                        tracing::debug!("{id} reclaims its abandoned ana group {owned}");
                        self.row_mut(id).sm_state[owned.index()] = GwAgroupState::Active;
                        self.pending = true;
                    }
                }
                _ => {}
            }
        }
    }

    fn group_in_transition(&self, group: AnaGroupId) -> bool {
        self.gws
            .values()
            .any(|row| row.state(group).is_transitional())
    }
}
