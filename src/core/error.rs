//! Core capability errors (identifiers, admin mutations, fencing refusal).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details. Invariant violations are not errors;
//! they abort.

use thiserror::Error;

use super::domain::AnaGroupId;
use super::identity::{GatewayId, GroupKey};

/// Invalid identifier string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("gateway id `{raw}` is invalid: {reason}")]
    Gateway { raw: String, reason: String },
    #[error("subsystem nqn `{raw}` is invalid: {reason}")]
    Nqn { raw: String, reason: String },
}

/// Generic range violation.
#[derive(Debug, Error, Clone)]
#[error("{field} value {value} out of range 0..={max}")]
pub struct RangeError {
    pub field: &'static str,
    pub value: u32,
    pub max: u32,
}

/// Admin mutation refusals on the gateway map.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum MapError {
    #[error("gateway `{gw}` already exists in group {key}")]
    AlreadyExists { gw: GatewayId, key: GroupKey },
    #[error("gateway `{gw}` not found in group {key}")]
    NotFound { gw: GatewayId, key: GroupKey },
    #[error("no free ana group id left in group {key}")]
    NoAnaIdAvailable { key: GroupKey },
}

/// The fencing bridge had no nonces to blocklist.
///
/// Not fatal: the state machine continues with a degraded direct-Active
/// transition and the condition is logged.
#[derive(Debug, Error, Clone)]
#[error("no nonces recorded for gateway `{gw}` ana group {group}")]
pub struct NoNonces {
    pub gw: GatewayId,
    pub group: AnaGroupId,
}
