//! Layer 2: Domain enums and the bounded ANA group id
//!
//! AnaGroupId: index into the per-gateway state arrays
//! GwAgroupState: internal per-cell state machine state
//! Availability: gateway lifecycle as seen by the monitor
//! ExportedState: what initiators are told per ANA group

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::RangeError;

/// Number of ANA groups a (pool, group) scope can carve out.
pub const MAX_ANA_GROUPS: usize = 16;

/// Wire sentinel for a gateway that owns no ANA group.
pub(crate) const REDUNDANT_WIRE_ID: u32 = 0xFF;

/// ANA group identifier, always in `[0, MAX_ANA_GROUPS)`.
///
/// A gateway that owns no group ("redundant" standby) is modelled as
/// `Option<AnaGroupId>::None`; the 0xFF sentinel exists only on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnaGroupId(u8);

impl AnaGroupId {
    pub fn new(id: u8) -> Result<Self, RangeError> {
        if (id as usize) < MAX_ANA_GROUPS {
            Ok(Self(id))
        } else {
            Err(RangeError {
                field: "ana group id",
                value: id as u32,
                max: MAX_ANA_GROUPS as u32 - 1,
            })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Index into the fixed-size per-gateway arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// All valid ids, in ascending order.
    pub fn all() -> impl Iterator<Item = AnaGroupId> {
        (0..MAX_ANA_GROUPS as u8).map(AnaGroupId)
    }
}

impl fmt::Debug for AnaGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnaGroupId({})", self.0)
    }
}

impl fmt::Display for AnaGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-(gateway, ANA group) state machine state.
///
/// `Idle` is the invalid resting value and is never produced by the engine;
/// it exists because the wire format reserves code 0 for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GwAgroupState {
    Idle,
    Standby,
    Active,
    BlockedAgroupOwner,
    WaitFailbackPrepared,
    WaitFailoverPrepared,
}

impl GwAgroupState {
    pub fn as_str(self) -> &'static str {
        match self {
            GwAgroupState::Idle => "idle",
            GwAgroupState::Standby => "standby",
            GwAgroupState::Active => "active",
            GwAgroupState::BlockedAgroupOwner => "blocked-agroup-owner",
            GwAgroupState::WaitFailbackPrepared => "wait-failback-prepared",
            GwAgroupState::WaitFailoverPrepared => "wait-failover-prepared",
        }
    }

    /// States that hold a running timer and make their gateway ineligible
    /// as a failover candidate.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            GwAgroupState::BlockedAgroupOwner
                | GwAgroupState::WaitFailbackPrepared
                | GwAgroupState::WaitFailoverPrepared
        )
    }

    pub fn wire_code(self) -> i32 {
        match self {
            GwAgroupState::Idle => 0,
            GwAgroupState::Standby => 1,
            GwAgroupState::Active => 2,
            GwAgroupState::BlockedAgroupOwner => 3,
            GwAgroupState::WaitFailbackPrepared => 4,
            GwAgroupState::WaitFailoverPrepared => 5,
        }
    }

    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            0 => Some(GwAgroupState::Idle),
            1 => Some(GwAgroupState::Standby),
            2 => Some(GwAgroupState::Active),
            3 => Some(GwAgroupState::BlockedAgroupOwner),
            4 => Some(GwAgroupState::WaitFailbackPrepared),
            5 => Some(GwAgroupState::WaitFailoverPrepared),
            _ => None,
        }
    }
}

impl fmt::Display for GwAgroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway availability as tracked by the monitor.
///
/// `Created` means registered but never heard from; the first beacon moves
/// it to `Available`. `Deleted` is a wire-only value: deleted rows are
/// erased from the map, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    Created,
    Available,
    Unavailable,
    Deleted,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Created => "created",
            Availability::Available => "available",
            Availability::Unavailable => "unavailable",
            Availability::Deleted => "deleted",
        }
    }

    pub fn wire_code(self) -> i32 {
        match self {
            Availability::Created => 0,
            Availability::Available => 1,
            Availability::Unavailable => 2,
            Availability::Deleted => 3,
        }
    }

    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            0 => Some(Availability::Created),
            1 => Some(Availability::Available),
            2 => Some(Availability::Unavailable),
            3 => Some(Availability::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ANA path state advertised to initiators.
///
/// The six internal states flatten to two exported ones: a cell is
/// `Optimized` iff it is `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportedState {
    Optimized,
    Inaccessible,
}

impl ExportedState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportedState::Optimized => "optimized",
            ExportedState::Inaccessible => "inaccessible",
        }
    }

    pub fn wire_code(self) -> i32 {
        match self {
            ExportedState::Optimized => 0,
            ExportedState::Inaccessible => 1,
        }
    }

    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExportedState::Optimized),
            1 => Some(ExportedState::Inaccessible),
            _ => None,
        }
    }
}

impl fmt::Display for ExportedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
