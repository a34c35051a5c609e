//! Pin identifiers and logic levels
//!
//! A [`PinIndex`] names one of the expander's pins. On the MCP23017 indices
//! 0..=7 are GPA0..GPA7 and 8..=15 are GPB0..GPB7.

use core::fmt;
use core::ops::Not;

use serde::{Deserialize, Serialize};

/// Number of addressable pins on the MCP23017
pub const MCP23017_PIN_COUNT: usize = 16;

/// Index of a pin on the expander.
///
/// The range check is performed against the table or chip that consumes the
/// index, so the same type serves expanders of any width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinIndex(u8);

impl PinIndex {
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the index if it lies in `[0, limit)`
    pub const fn checked(raw: u8, limit: usize) -> Option<Self> {
        if (raw as usize) < limit {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub const fn is_within(self, limit: usize) -> bool {
        (self.0 as usize) < limit
    }
}

impl From<u8> for PinIndex {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for PinIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logic level observed on (or driven onto) a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinState {
    Low,
    High,
}

impl PinState {
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }

    pub const fn is_low(self) -> bool {
        matches!(self, Self::Low)
    }

    /// Level of bit `bit` in a port register value
    pub const fn from_bit(value: u8, bit: u8) -> Self {
        if value & (1 << bit) != 0 {
            Self::High
        } else {
            Self::Low
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::High => "HIGH",
        }
    }
}

impl Not for PinState {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_rejects_out_of_range() {
        assert_eq!(PinIndex::checked(15, MCP23017_PIN_COUNT), Some(PinIndex::new(15)));
        assert_eq!(PinIndex::checked(16, MCP23017_PIN_COUNT), None);
    }

    #[test]
    fn test_state_from_bit() {
        assert_eq!(PinState::from_bit(0b0000_1000, 3), PinState::High);
        assert_eq!(PinState::from_bit(0b0000_1000, 2), PinState::Low);
        assert_eq!(!PinState::High, PinState::Low);
    }
}
