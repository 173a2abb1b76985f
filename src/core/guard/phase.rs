/*!
 * Activation Phases
 *
 * The arm/fire/disarm state machine shared by every guard type.
 *
 * ```text
 * Idle --arm--> Armed --fire----> Fired
 *                     --disarm--> Disarmed
 * ```
 *
 * Leaving `Armed` is a single compare-and-swap, so `Fired` and `Disarmed`
 * can never both be observed for one activation.
 */

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of one guard activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Armed = 1,
    Fired = 2,
    Disarmed = 3,
}

impl Phase {
    #[inline]
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Armed,
            2 => Self::Fired,
            3 => Self::Disarmed,
            _ => Self::Idle,
        }
    }

    /// Phase name for logging
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Fired => "fired",
            Self::Disarmed => "disarmed",
        }
    }

    /// Fired or Disarmed
    #[inline]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Fired | Self::Disarmed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lock-free phase cell
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(Phase::Idle as u8))
    }

    #[inline]
    pub fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Idle -> Armed
    ///
    /// Returns `false` unless the cell was idle.
    #[inline]
    pub fn arm(&self) -> bool {
        self.transition(Phase::Idle, Phase::Armed)
    }

    /// Armed -> Fired
    ///
    /// Returns `false` if the activation already settled or never armed.
    #[inline]
    pub fn fire(&self) -> bool {
        self.transition(Phase::Armed, Phase::Fired)
    }

    /// Armed -> Disarmed
    ///
    /// Returns `false` if the activation already settled or never armed.
    #[inline]
    pub fn disarm(&self) -> bool {
        self.transition(Phase::Armed, Phase::Disarmed)
    }

    #[inline]
    fn transition(&self, from: Phase, to: Phase) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}
