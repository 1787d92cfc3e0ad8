//! Layer 1: Identity atoms
//!
//! GatewayId: gateway self-identification from its beacon
//! Nqn: NVMe qualified name of an exported subsystem
//! GroupKey: (pool, group) scope a gateway belongs to

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::InvalidId;

/// Gateway identifier - non-empty opaque string.
///
/// Gateways name themselves in their beacons. No validation beyond non-empty.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayId(String);

impl GatewayId {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidId> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Gateway {
                raw: s,
                reason: "empty".into(),
            })
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GatewayId({:?})", self.0)
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// NVMe qualified name - non-empty opaque string.
///
/// Initiators address subsystems by NQN; the monitor treats it as opaque.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nqn(String);

impl Nqn {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidId> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Nqn {
                raw: s,
                reason: "empty".into(),
            })
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Nqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nqn({:?})", self.0)
    }
}

impl fmt::Display for Nqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scope of a gateway fleet: the (pool, group) pair.
///
/// All coordination (ownership, failover, timers) happens within one key;
/// gateways in different keys never interact.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pool: String,
    group: String,
}

impl GroupKey {
    pub fn new(pool: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            group: group.into(),
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey({:?}, {:?})", self.pool, self.group)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pool, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_id_rejects_empty() {
        assert!(GatewayId::new("").is_err());
        assert!(GatewayId::new("gw-a").is_ok());
    }

    #[test]
    fn nqn_rejects_empty() {
        assert!(Nqn::new("").is_err());
        assert!(Nqn::new("nqn.2016-06.io.example:sub1").is_ok());
    }

    #[test]
    fn group_key_orders_by_pool_then_group() {
        let a = GroupKey::new("pool1", "grp2");
        let b = GroupKey::new("pool2", "grp1");
        let c = GroupKey::new("pool1", "grp1");
        assert!(c < a);
        assert!(a < b);
    }

    #[test]
    fn group_key_displays_as_path() {
        let key = GroupKey::new("rbd", "gw-group0");
        assert_eq!(key.to_string(), "rbd/gw-group0");
    }
}
