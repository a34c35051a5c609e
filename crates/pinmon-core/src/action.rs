//! Interrupt actions
//!
//! An action is what runs when a monitored pin's interrupt fires. The
//! dispatcher only knows the [`PinAction`] trait; configuration selects one of
//! the concrete variants of [`InterruptAction`] through an [`ActionKind`].

use core::cell::RefCell;
use core::convert::Infallible;
use core::fmt::Debug;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::i2c::I2c;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::mcp23017::{Mcp23017, Mcp23017Error};
use crate::pin::{PinIndex, PinState};

/// Expander shared between the monitor loop and the actions that drive its
/// outputs. Every access holds the lock for a whole read-modify-write.
pub type SharedExpander<I2C> = Mutex<CriticalSectionRawMutex, RefCell<Mcp23017<I2C>>>;

pub const fn shared_expander<I2C>(expander: Mcp23017<I2C>) -> SharedExpander<I2C> {
    Mutex::new(RefCell::new(expander))
}

/// Something to do when a pin changes state
pub trait PinAction {
    type Error: Debug;

    fn act(&self, pin: PinIndex, state: PinState) -> Result<(), Self::Error>;
}

/// Action selected for a pin in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ActionKind {
    /// Log the change and do nothing else
    #[default]
    Trace,
    /// Drive `output` to the inverse of the observed input level
    Toggle { output: PinIndex },
}

impl ActionKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Toggle { .. } => "toggle",
        }
    }

    /// Pin driven by this action, if any
    pub const fn output(self) -> Option<PinIndex> {
        match self {
            Self::Trace => None,
            Self::Toggle { output } => Some(output),
        }
    }
}

#[derive(Error, Debug)]
pub enum ActionError<E> {
    #[error("Expander error: {0}")]
    Expander(Mcp23017Error<E>),
    #[error("Expander is already borrowed by another action")]
    Busy,
}

/// Default action: diagnostic trace only
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceAction;

impl PinAction for TraceAction {
    type Error = Infallible;

    fn act(&self, pin: PinIndex, state: PinState) -> Result<(), Self::Error> {
        info!("Pin {} changed to {}", pin, state);
        Ok(())
    }
}

/// Mirrors an input onto an output, inverted.
///
/// With the usual wiring (button to ground, pull-up enabled, LED on the
/// output) a press reads LOW and lights the LED.
pub struct ToggleAction<'a, I2C> {
    expander: &'a SharedExpander<I2C>,
    output: PinIndex,
}

impl<'a, I2C: I2c> ToggleAction<'a, I2C> {
    pub const fn new(expander: &'a SharedExpander<I2C>, output: PinIndex) -> Self {
        Self { expander, output }
    }

    pub const fn output(&self) -> PinIndex {
        self.output
    }
}

impl<I2C: I2c> PinAction for ToggleAction<'_, I2C> {
    type Error = ActionError<I2C::Error>;

    fn act(&self, pin: PinIndex, state: PinState) -> Result<(), Self::Error> {
        let level = !state;
        debug!("Pin {} is {}: driving pin {} {}", pin, state, self.output, level);
        self.expander.lock(|cell| match cell.try_borrow_mut() {
            Ok(mut expander) => expander
                .write_pin(self.output, level)
                .map_err(ActionError::Expander),
            Err(_) => Err(ActionError::Busy),
        })
    }
}

/// The concrete action stored in a dispatch table slot
pub enum InterruptAction<'a, I2C> {
    Trace(TraceAction),
    Toggle(ToggleAction<'a, I2C>),
}

impl<'a, I2C: I2c> InterruptAction<'a, I2C> {
    pub const fn from_kind(kind: ActionKind, expander: &'a SharedExpander<I2C>) -> Self {
        match kind {
            ActionKind::Trace => Self::Trace(TraceAction),
            ActionKind::Toggle { output } => Self::Toggle(ToggleAction::new(expander, output)),
        }
    }

    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Trace(_) => ActionKind::Trace,
            Self::Toggle(action) => ActionKind::Toggle {
                output: action.output(),
            },
        }
    }
}

impl<I2C: I2c> PinAction for InterruptAction<'_, I2C> {
    type Error = ActionError<I2C::Error>;

    fn act(&self, pin: PinIndex, state: PinState) -> Result<(), Self::Error> {
        match self {
            Self::Trace(action) => match action.act(pin, state) {
                Ok(()) => Ok(()),
                Err(never) => match never {},
            },
            Self::Toggle(action) => action.act(pin, state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp23017::{DEFAULT_ADDRESS, Direction};
    use crate::sim::SimulatedMcp23017;

    #[test]
    fn test_toggle_drives_inverse_level() {
        let bus = SimulatedMcp23017::new(DEFAULT_ADDRESS);
        let sim = bus.handle();
        let mut mcp = Mcp23017::new(bus, DEFAULT_ADDRESS);
        mcp.set_direction(PinIndex::new(8), Direction::Output).unwrap();
        let expander = shared_expander(mcp);

        let action = InterruptAction::from_kind(
            ActionKind::Toggle {
                output: PinIndex::new(8),
            },
            &expander,
        );

        action.act(PinIndex::new(3), PinState::Low).unwrap();
        assert_eq!(sim.output(PinIndex::new(8)), Some(PinState::High));

        action.act(PinIndex::new(3), PinState::High).unwrap();
        assert_eq!(sim.output(PinIndex::new(8)), Some(PinState::Low));
    }

    #[test]
    fn test_trace_touches_nothing() {
        let bus = SimulatedMcp23017::new(DEFAULT_ADDRESS);
        let sim = bus.handle();
        let expander = shared_expander(Mcp23017::new(bus, DEFAULT_ADDRESS));

        let action = InterruptAction::from_kind(ActionKind::Trace, &expander);
        action.act(PinIndex::new(0), PinState::Low).unwrap();

        assert_eq!(action.kind(), ActionKind::Trace);
        assert_eq!(sim.register(0x14), 0);
        assert_eq!(sim.register(0x15), 0);
    }

    #[test]
    fn test_toggle_reports_out_of_range_output() {
        let bus = SimulatedMcp23017::new(DEFAULT_ADDRESS);
        let expander = shared_expander(Mcp23017::new(bus, DEFAULT_ADDRESS));
        let action = ToggleAction::new(&expander, PinIndex::new(20));

        assert!(matches!(
            action.act(PinIndex::new(1), PinState::High),
            Err(ActionError::Expander(Mcp23017Error::InvalidPin { pin: 20 }))
        ));
    }

    #[test]
    fn test_toggle_while_expander_borrowed_is_busy() {
        let bus = SimulatedMcp23017::new(DEFAULT_ADDRESS);
        let expander = shared_expander(Mcp23017::new(bus, DEFAULT_ADDRESS));
        let action = ToggleAction::new(&expander, PinIndex::new(8));

        let result = expander.lock(|cell| {
            let _held = cell.borrow_mut();
            action.act(PinIndex::new(1), PinState::High)
        });
        assert!(matches!(result, Err(ActionError::Busy)));
    }
}
