//! Exported view projector.
//!
//! Flattens the six internal per-cell states into the two states initiators
//! see: a cell is Optimized iff it is Active, Inaccessible otherwise. The
//! projection is read-only and recomputed on demand; callers hand the owned
//! snapshot off to the beacon/transmission plumbing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::domain::{AnaGroupId, ExportedState, GwAgroupState, MAX_ANA_GROUPS};
use crate::core::gateway::CreatedGateway;
use crate::core::identity::{GatewayId, GroupKey, Nqn};
use crate::core::map::GwMap;

/// ANA state vector advertised for one subsystem.
pub type AnaStateVector = [ExportedState; MAX_ANA_GROUPS];

/// Initiator-visible state of one gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedGwState {
    pub owned: Option<AnaGroupId>,
    /// Reserved; always 0 until map versioning is wired through.
    pub version: u64,
    pub subsystems: BTreeMap<Nqn, AnaStateVector>,
}

/// The full monitor-to-subscriber payload.
pub type ExportedMap = BTreeMap<GroupKey, BTreeMap<GatewayId, ExportedGwState>>;

fn flatten(row: &CreatedGateway) -> AnaStateVector {
    let mut states = [ExportedState::Inaccessible; MAX_ANA_GROUPS];
    for group in AnaGroupId::all() {
        if row.state(group) == GwAgroupState::Active {
            states[group.index()] = ExportedState::Optimized;
        }
    }
    states
}

fn project_row(row: &CreatedGateway) -> ExportedGwState {
    let states = flatten(row);
    ExportedGwState {
        owned: row.owned(),
        version: 0,
        subsystems: row
            .subsystems()
            .iter()
            .map(|sub| (sub.nqn.clone(), states))
            .collect(),
    }
}

impl GwMap {
    /// Project one group's initiator-visible map.
    pub fn project(&self, key: &GroupKey) -> BTreeMap<GatewayId, ExportedGwState> {
        self.group(key)
            .map(|group| {
                group
                    .iter()
                    .map(|(id, row)| (id.clone(), project_row(row)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Project every group, as shipped to subscribers.
    pub fn project_all(&self) -> ExportedMap {
        self.groups()
            .map(|(key, group)| {
                (
                    key.clone(),
                    group
                        .iter()
                        .map(|(id, row)| (id.clone(), project_row(row)))
                        .collect(),
                )
            })
            .collect()
    }
}
