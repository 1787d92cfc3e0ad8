//! Layer 5: The aggregate gateway map.
//!
//! The single object replicated through the consensus log: created gateway
//! rows and their timer slabs, keyed by (pool, group). Every mutation is
//! serialized by the enclosing consensus layer (single-writer); the map
//! raises `proposal_pending` whenever persisted state changed.

use std::collections::BTreeMap;

use crate::core::beacon::Beacon;
use crate::core::domain::{AnaGroupId, Availability, MAX_ANA_GROUPS};
use crate::core::error::MapError;
use crate::core::fencing::Fencing;
use crate::core::fsm::GroupView;
use crate::core::gateway::CreatedGateway;
use crate::core::identity::{GatewayId, GroupKey};
use crate::core::timer::{TimerCell, TimerSlab};
use crate::core::tunables::Tunables;

/// In-memory map of all gateway fleets the monitor coordinates.
#[derive(Clone, Debug)]
pub struct GwMap {
    pub(crate) created: BTreeMap<GroupKey, BTreeMap<GatewayId, CreatedGateway>>,
    pub(crate) timers: BTreeMap<GroupKey, BTreeMap<GatewayId, TimerSlab>>,
    tunables: Tunables,
    proposal_pending: bool,
}

impl GwMap {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            created: BTreeMap::new(),
            timers: BTreeMap::new(),
            tunables,
            proposal_pending: false,
        }
    }

    pub(crate) fn from_parts(
        created: BTreeMap<GroupKey, BTreeMap<GatewayId, CreatedGateway>>,
        timers: BTreeMap<GroupKey, BTreeMap<GatewayId, TimerSlab>>,
        tunables: Tunables,
    ) -> Self {
        Self {
            created,
            timers,
            tunables,
            proposal_pending: false,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &BTreeMap<GatewayId, CreatedGateway>)> {
        self.created.iter()
    }

    pub fn group(&self, key: &GroupKey) -> Option<&BTreeMap<GatewayId, CreatedGateway>> {
        self.created.get(key)
    }

    pub fn gateway(&self, key: &GroupKey, gw: &GatewayId) -> Option<&CreatedGateway> {
        self.created.get(key)?.get(gw)
    }

    pub fn timer(&self, key: &GroupKey, gw: &GatewayId, group: AnaGroupId) -> TimerCell {
        self.timers
            .get(key)
            .and_then(|slabs| slabs.get(gw))
            .map(|slab| slab.cell(group))
            .unwrap_or_default()
    }

    /// True when an event since the last `take_proposal_pending` changed
    /// persisted state and the map should be proposed through consensus.
    pub fn proposal_pending(&self) -> bool {
        self.proposal_pending
    }

    pub fn take_proposal_pending(&mut self) -> bool {
        std::mem::take(&mut self.proposal_pending)
    }

    // =========================================================================
    // Admin mutations
    // =========================================================================

    /// Register a gateway and allocate it the lowest free ANA group id.
    pub fn add_gateway(&mut self, gw: GatewayId, key: GroupKey) -> Result<(), MapError> {
        let group = self.created.entry(key.clone()).or_default();
        if group.contains_key(&gw) {
            return Err(MapError::AlreadyExists { gw, key });
        }
        let mut used = [false; MAX_ANA_GROUPS];
        for row in group.values() {
            if let Some(owned) = row.owned() {
                used[owned.index()] = true;
            }
        }
        let Some(owned) = AnaGroupId::all().find(|g| !used[g.index()]) else {
            return Err(MapError::NoAnaIdAvailable { key });
        };
        tracing::debug!("created gateway {gw} in {key}, owns ana group {owned}");
        group.insert(gw.clone(), CreatedGateway::new(Some(owned)));
        self.timers.entry(key).or_default().insert(gw, TimerSlab::new());
        self.proposal_pending = true;
        Ok(())
    }

    /// Register a gateway that owns no ANA group: a redundant standby that
    /// only ever serves groups taken over from failed owners.
    pub fn add_redundant_gateway(&mut self, gw: GatewayId, key: GroupKey) -> Result<(), MapError> {
        let group = self.created.entry(key.clone()).or_default();
        if group.contains_key(&gw) {
            return Err(MapError::AlreadyExists { gw, key });
        }
        tracing::debug!("created redundant gateway {gw} in {key}");
        group.insert(gw.clone(), CreatedGateway::new(None));
        self.timers.entry(key).or_default().insert(gw, TimerSlab::new());
        self.proposal_pending = true;
        Ok(())
    }

    /// Unwind all state involving the gateway, then erase its row and timers.
    pub fn delete_gateway(&mut self, gw: &GatewayId, key: &GroupKey) -> Result<(), MapError> {
        let exists = self
            .created
            .get(key)
            .is_some_and(|group| group.contains_key(gw));
        if !exists {
            return Err(MapError::NotFound {
                gw: gw.clone(),
                key: key.clone(),
            });
        }
        self.with_group(key, None, |view| view.delete(gw));
        tracing::debug!("deleting gateway {gw} from {key}");
        if let Some(group) = self.created.get_mut(key) {
            group.remove(gw);
            if group.is_empty() {
                self.created.remove(key);
            }
        }
        if let Some(slabs) = self.timers.get_mut(key) {
            slabs.remove(gw);
            if slabs.is_empty() {
                self.timers.remove(key);
            }
        }
        self.proposal_pending = true;
        Ok(())
    }

    // =========================================================================
    // Beacon ingest
    // =========================================================================

    /// Apply a gateway heartbeat: refresh the registry snapshot, then
    /// dispatch first-contact / recovery / keep-alive on the stored
    /// availability. Beacons from unregistered gateways are dropped.
    pub fn process_beacon(&mut self, fencing: &dyn Fencing, beacon: Beacon) {
        let Beacon {
            gw_id,
            key,
            subsystems,
            nonce_map,
            availability: _,
            version: _,
        } = beacon;
        let registered = self
            .created
            .get(&key)
            .is_some_and(|group| group.contains_key(&gw_id));
        if !registered {
            tracing::debug!("dropping beacon from unregistered gateway {gw_id} in {key}");
            return;
        }
        self.with_group(&key, Some(fencing), |view| {
            let prior = view.refresh_registry(&gw_id, subsystems, nonce_map);
            match prior {
                Availability::Created => view.first_contact(&gw_id),
                Availability::Unavailable => view.recovery(&gw_id),
                Availability::Available => view.keep_alive(&gw_id),
                Availability::Deleted => unreachable!("deleted gateways are erased from the map"),
            }
        });
    }

    /// Missed-beacon verdict from the enclosing timeout detector.
    pub fn gateway_down(
        &mut self,
        fencing: &dyn Fencing,
        gw: &GatewayId,
        key: &GroupKey,
    ) -> Result<(), MapError> {
        let exists = self
            .created
            .get(key)
            .is_some_and(|group| group.contains_key(gw));
        if !exists {
            return Err(MapError::NotFound {
                gw: gw.clone(),
                key: key.clone(),
            });
        }
        self.with_group(key, Some(fencing), |view| view.down(gw));
        Ok(())
    }

    // =========================================================================
    // Tick / reconcile
    // =========================================================================

    /// Advance every armed timer by one tick and dispatch the expirations.
    pub fn tick(&mut self, fencing: &dyn Fencing) {
        let mut expired: Vec<(GroupKey, GatewayId, AnaGroupId)> = Vec::new();
        for (key, slabs) in self.timers.iter_mut() {
            for (gw, slab) in slabs.iter_mut() {
                for group in AnaGroupId::all() {
                    if slab.advance(group) {
                        expired.push((key.clone(), gw.clone(), group));
                    }
                }
            }
        }
        for (key, gw, group) in expired {
            self.with_group(&key, Some(fencing), |view| view.expired(&gw, group));
        }
    }

    /// Periodic repair pass over every group: re-cover ANA groups of failed
    /// owners nobody serves, and hand abandoned groups back to live owners.
    pub fn sweep_abandoned(&mut self, fencing: &dyn Fencing) {
        let keys: Vec<GroupKey> = self.created.keys().cloned().collect();
        for key in keys {
            self.with_group(&key, Some(fencing), |view| view.sweep_abandoned());
        }
    }

    // =========================================================================
    // Dispatch plumbing
    // =========================================================================

    fn with_group<R>(
        &mut self,
        key: &GroupKey,
        fencing: Option<&dyn Fencing>,
        f: impl FnOnce(&mut GroupView<'_>) -> R,
    ) -> R {
        let gws = self
            .created
            .get_mut(key)
            .unwrap_or_else(|| panic!("event dispatched on unknown group {key}"));
        let slabs = self.timers.entry(key.clone()).or_default();
        let mut view = GroupView::new(key, gws, slabs, fencing, &self.tunables);
        let out = f(&mut view);
        self.proposal_pending |= view.take_pending();
        out
    }
}

impl Default for GwMap {
    fn default() -> Self {
        Self::new(Tunables::default())
    }
}
