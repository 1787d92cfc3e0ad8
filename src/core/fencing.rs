//! Fencing seam: OSD epoch reader + blocklist issuer.
//!
//! The core never owns this collaborator; every mutation borrows it for the
//! duration of the call. Injecting it as a trait keeps the engine
//! deterministic under test.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonically increasing version of the storage cluster's map.
///
/// `OsdEpoch::MAX` is the "never fenced" sentinel carried by freshly created
/// gateway rows.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OsdEpoch(u32);

impl OsdEpoch {
    pub const MAX: OsdEpoch = OsdEpoch(u32::MAX);

    pub fn new(epoch: u32) -> Self {
        Self(epoch)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for OsdEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == OsdEpoch::MAX {
            write!(f, "OsdEpoch(MAX)")
        } else {
            write!(f, "OsdEpoch({})", self.0)
        }
    }
}

impl fmt::Display for OsdEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage-layer fencing as seen by the coordination engine.
///
/// `blocklist` refuses I/O from the named addresses for `ttl_secs` relative
/// to current cluster time and returns the epoch at which the entry was
/// accepted. The call is synchronous from the core's perspective.
pub trait Fencing {
    fn current_epoch(&self) -> OsdEpoch;

    fn blocklist(&self, addrs: &[String], ttl_secs: u64) -> OsdEpoch;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_orders_numerically() {
        assert!(OsdEpoch::new(3) < OsdEpoch::new(4));
        assert!(OsdEpoch::new(u32::MAX - 1) < OsdEpoch::MAX);
    }

    #[test]
    fn max_sentinel_debug() {
        assert_eq!(format!("{:?}", OsdEpoch::MAX), "OsdEpoch(MAX)");
        assert_eq!(format!("{:?}", OsdEpoch::new(7)), "OsdEpoch(7)");
    }
}
