//! Core domain types for the gateway monitor (Layers 1-5)
//!
//! Module hierarchy follows type dependency order:
//! - identity: GatewayId, Nqn, GroupKey (Layer 1)
//! - domain: AnaGroupId, state/availability enums (Layer 2)
//! - beacon: heartbeat snapshot types (Layer 3)
//! - gateway, timer: registry row + logical countdowns (Layer 4)
//! - fsm, map: the state machine engine and the aggregate map (Layer 5)
//! - view, codec: projections and the wire format over the map

pub mod beacon;
pub mod codec;
pub mod domain;
pub mod error;
pub mod fencing;
mod fsm;
pub mod gateway;
pub mod identity;
pub mod map;
pub mod timer;
pub mod tunables;
pub mod view;

pub use beacon::{Beacon, BeaconListener, BeaconNamespace, BeaconSubsystem};
pub use codec::{decode_exported_map, encode_exported_map, DecodeError};
pub use domain::{
    AnaGroupId, Availability, ExportedState, GwAgroupState, MAX_ANA_GROUPS,
};
pub use error::{InvalidId, MapError, NoNonces, RangeError};
pub use fencing::{Fencing, OsdEpoch};
pub use gateway::CreatedGateway;
pub use identity::{GatewayId, GroupKey, Nqn};
pub use map::GwMap;
pub use timer::{TimerCell, TimerSlab};
pub use tunables::Tunables;
pub use view::{AnaStateVector, ExportedGwState, ExportedMap};
