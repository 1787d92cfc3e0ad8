//! Coordination tunables (normative defaults).
//!
//! Values are intentionally explicit about their units to avoid confusion.

use serde::{Deserialize, Serialize};

/// Deadlines and fencing knobs for the failover/failback engine.
///
/// Deadlines are in ticks of the outer scheduling period; the blocklist TTL
/// is in cluster-time seconds handed through to the fencing layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Bound on WaitFailoverPrepared while a blocklist settles.
    pub failover_prepare_ticks: u8,
    /// Bound on WaitFailbackPrepared before ownership is handed back.
    pub failback_prepare_ticks: u8,
    /// How long fenced addresses stay refused, relative to cluster time.
    pub blocklist_ttl_secs: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            failover_prepare_ticks: 6,
            failback_prepare_ticks: 2,
            blocklist_ttl_secs: 30,
        }
    }
}
