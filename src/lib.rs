#![forbid(unsafe_code)]

pub mod core;
pub mod error;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    decode_exported_map, encode_exported_map, AnaGroupId, AnaStateVector, Availability, Beacon,
    BeaconListener, BeaconNamespace, BeaconSubsystem, CreatedGateway, DecodeError, ExportedGwState,
    ExportedMap, ExportedState, Fencing, GatewayId, GroupKey, GwAgroupState, GwMap, InvalidId,
    MapError, NoNonces, Nqn, OsdEpoch, RangeError, TimerCell, TimerSlab, Tunables,
    MAX_ANA_GROUPS,
};
