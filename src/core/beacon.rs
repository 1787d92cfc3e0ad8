//! Layer 3: Beacon snapshot types
//!
//! A beacon is the periodic heartbeat a gateway sends to the monitor. It
//! carries a full snapshot, never a delta: the subsystem list and the nonce
//! map replace whatever the registry held before.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{AnaGroupId, Availability};
use super::identity::{GatewayId, GroupKey, Nqn};

/// One listener endpoint a subsystem is reachable on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconListener {
    /// "IPv4" or "IPv6".
    pub address_family: String,
    pub address: String,
    /// Port, as the transport service id string.
    pub svcid: String,
}

/// One namespace a subsystem exports, tied to an ANA group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconNamespace {
    pub ana_group: AnaGroupId,
    /// Network identity published for fencing of this namespace's paths.
    pub nonce: String,
}

/// One exported subsystem as reported by a gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconSubsystem {
    pub nqn: Nqn,
    pub listeners: Vec<BeaconListener>,
    pub namespaces: Vec<BeaconNamespace>,
}

/// A gateway heartbeat, as handed to the ingest path after wire decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub gw_id: GatewayId,
    pub key: GroupKey,
    pub subsystems: Vec<BeaconSubsystem>,
    /// Fencing targets per ANA group, ordered as published.
    pub nonce_map: BTreeMap<AnaGroupId, Vec<String>>,
    /// The gateway's own view of its availability; the monitor dispatches on
    /// its stored view, not this field.
    pub availability: Availability,
    pub version: u32,
}
