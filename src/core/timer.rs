//! Layer 4: Logical per-cell countdowns.
//!
//! Timers run only while a cell sits in a wait state. A tick is the outer
//! scheduling period; the core never reads a wall clock, so cancellation is
//! immediate and race-free.

use serde::{Deserialize, Serialize};

use super::domain::{AnaGroupId, MAX_ANA_GROUPS};

/// Sentinel in `ticks_elapsed` marking a disarmed cell.
const DISARMED: u32 = 0xFFFF;

/// One countdown: elapsed ticks against a deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerCell {
    ticks_elapsed: u32,
    deadline_ticks: u8,
}

impl TimerCell {
    pub fn disarmed() -> Self {
        Self {
            ticks_elapsed: DISARMED,
            deadline_ticks: 0,
        }
    }

    pub(crate) fn from_raw(ticks_elapsed: u32, deadline_ticks: u8) -> Self {
        Self {
            ticks_elapsed,
            deadline_ticks,
        }
    }

    pub fn is_armed(self) -> bool {
        self.ticks_elapsed != DISARMED
    }

    pub fn ticks_elapsed(self) -> u32 {
        self.ticks_elapsed
    }

    pub fn deadline_ticks(self) -> u8 {
        self.deadline_ticks
    }
}

impl Default for TimerCell {
    fn default() -> Self {
        Self::disarmed()
    }
}

/// The per-gateway timer row: one cell per ANA group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSlab {
    cells: [TimerCell; MAX_ANA_GROUPS],
}

impl TimerSlab {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_cells(cells: [TimerCell; MAX_ANA_GROUPS]) -> Self {
        Self { cells }
    }

    pub fn cell(&self, group: AnaGroupId) -> TimerCell {
        self.cells[group.index()]
    }

    pub fn is_armed(&self, group: AnaGroupId) -> bool {
        self.cells[group.index()].is_armed()
    }

    pub(crate) fn arm(&mut self, group: AnaGroupId, deadline_ticks: u8) {
        self.cells[group.index()] = TimerCell {
            ticks_elapsed: 0,
            deadline_ticks,
        };
    }

    pub(crate) fn cancel(&mut self, group: AnaGroupId) {
        self.cells[group.index()] = TimerCell::disarmed();
    }

    /// Advance one cell by a tick. Returns true when the deadline is reached;
    /// the cell stays armed until the expiry handler cancels it.
    pub(crate) fn advance(&mut self, group: AnaGroupId) -> bool {
        let cell = &mut self.cells[group.index()];
        if !cell.is_armed() {
            return false;
        }
        cell.ticks_elapsed += 1;
        cell.ticks_elapsed >= cell.deadline_ticks as u32
    }

    /// True if no cell is armed.
    pub fn is_idle(&self) -> bool {
        self.cells.iter().all(|c| !c.is_armed())
    }
}
