//! Layer 4: The per-gateway registry row.
//!
//! One `CreatedGateway` per gateway within a (pool, group) scope. The owned
//! ANA group is assigned at creation and never changes for the life of the
//! row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::beacon::BeaconSubsystem;
use super::domain::{AnaGroupId, Availability, GwAgroupState, MAX_ANA_GROUPS};
use super::fencing::OsdEpoch;
use super::identity::GatewayId;

/// Registry row for one created gateway.
///
/// The three fixed arrays are indexed by ANA group id. `failover_peer` is
/// meaningful only for cells in a wait state: the gateway being fenced
/// (failover) or the original owner returning (failback).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedGateway {
    owned: Option<AnaGroupId>,
    pub(crate) availability: Availability,
    pub(crate) sm_state: [GwAgroupState; MAX_ANA_GROUPS],
    pub(crate) failover_peer: [Option<GatewayId>; MAX_ANA_GROUPS],
    pub(crate) nonce_map: BTreeMap<AnaGroupId, Vec<String>>,
    pub(crate) subsystems: Vec<BeaconSubsystem>,
    /// Epoch at which the most recent blocklist relevant to this row's wait
    /// cell was accepted; `OsdEpoch::MAX` until first fenced.
    pub(crate) blocklist_epoch: [OsdEpoch; MAX_ANA_GROUPS],
}

impl CreatedGateway {
    pub(crate) fn new(owned: Option<AnaGroupId>) -> Self {
        Self {
            owned,
            availability: Availability::Created,
            sm_state: [GwAgroupState::Standby; MAX_ANA_GROUPS],
            failover_peer: std::array::from_fn(|_| None),
            nonce_map: BTreeMap::new(),
            subsystems: Vec::new(),
            blocklist_epoch: [OsdEpoch::MAX; MAX_ANA_GROUPS],
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        owned: Option<AnaGroupId>,
        availability: Availability,
        subsystems: Vec<BeaconSubsystem>,
        nonce_map: BTreeMap<AnaGroupId, Vec<String>>,
        sm_state: [GwAgroupState; MAX_ANA_GROUPS],
        failover_peer: [Option<GatewayId>; MAX_ANA_GROUPS],
        blocklist_epoch: [OsdEpoch; MAX_ANA_GROUPS],
    ) -> Self {
        Self {
            owned,
            availability,
            sm_state,
            failover_peer,
            nonce_map,
            subsystems,
            blocklist_epoch,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The ANA group this gateway owns, or None for a redundant standby.
    pub fn owned(&self) -> Option<AnaGroupId> {
        self.owned
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn state(&self, group: AnaGroupId) -> GwAgroupState {
        self.sm_state[group.index()]
    }

    pub fn failover_peer(&self, group: AnaGroupId) -> Option<&GatewayId> {
        self.failover_peer[group.index()].as_ref()
    }

    pub fn nonce_map(&self) -> &BTreeMap<AnaGroupId, Vec<String>> {
        &self.nonce_map
    }

    pub fn subsystems(&self) -> &[BeaconSubsystem] {
        &self.subsystems
    }

    pub fn blocklist_epoch(&self, group: AnaGroupId) -> OsdEpoch {
        self.blocklist_epoch[group.index()]
    }

    /// A gateway with any cell mid-transition is not a failover candidate.
    pub(crate) fn is_busy(&self) -> bool {
        self.sm_state.iter().any(|s| s.is_transitional())
    }

    /// How many ANA groups this gateway currently serves.
    pub(crate) fn active_load(&self) -> usize {
        self.sm_state
            .iter()
            .filter(|s| **s == GwAgroupState::Active)
            .count()
    }

    // =========================================================================
    // Mutations (engine-internal)
    // =========================================================================

    /// Reset one cell to Standby and drop its peer reference.
    pub(crate) fn set_standby(&mut self, group: AnaGroupId) {
        self.sm_state[group.index()] = GwAgroupState::Standby;
        self.failover_peer[group.index()] = None;
    }
}
