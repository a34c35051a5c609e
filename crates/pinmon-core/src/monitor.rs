//! Interrupt monitor loop
//!
//! Watches the host GPIO wired to the expander's INT output. When the line is
//! asserted the monitor asks the expander which pin fired, releases the
//! expander again and hands the event to the [`Dispatcher`]. A failed dispatch
//! is counted and logged; only clearing the running flag ends [`PinMonitor::run`].

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::action::{PinAction, SharedExpander};
use crate::dispatch::{Dispatcher, wait};
use crate::mcp23017::{InterruptEvent, Iocon, Mcp23017, Mcp23017Error};
use crate::pin::{MCP23017_PIN_COUNT, PinIndex, PinState};

/// Host input connected to INTA (MIRROR on) of the expander
pub struct InterruptLine<P> {
    pin: P,
    active_high: bool,
}

impl<P: InputPin> InterruptLine<P> {
    pub fn new(pin: P, active_high: bool) -> Self {
        Self { pin, active_high }
    }

    /// Active level taken from the IOCON the chip was configured with
    pub fn from_iocon(pin: P, iocon: Iocon) -> Self {
        Self::new(pin, iocon.int_active_high())
    }

    pub fn is_asserted(&mut self) -> Result<bool, P::Error> {
        if self.active_high {
            self.pin.is_high()
        } else {
            self.pin.is_low()
        }
    }
}

#[derive(Error, Debug)]
pub enum MonitorError<E, L> {
    #[error("Expander error: {0}")]
    Expander(Mcp23017Error<E>),
    #[error("Interrupt line error: {0:?}")]
    Line(L),
    #[error("Expander is borrowed elsewhere")]
    Busy,
}

/// Result of a single look at the interrupt line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Line not asserted
    Idle,
    /// Line asserted but no interrupt flag set on the chip
    Spurious,
    Handled { pin: PinIndex, state: PinState },
    Failed { pin: PinIndex, state: PinState },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub handled: u32,
    pub failed: u32,
    pub spurious: u32,
    pub bus_errors: u32,
}

pub struct PinMonitor<'a, I2C, INT, A, D, const N: usize = MCP23017_PIN_COUNT> {
    expander: &'a SharedExpander<I2C>,
    line: InterruptLine<INT>,
    dispatcher: Dispatcher<A, D, N>,
    delay: D,
    poll_interval: Duration,
    stats: MonitorStats,
}

impl<'a, I2C, INT, A, D, const N: usize> PinMonitor<'a, I2C, INT, A, D, N>
where
    I2C: I2c,
    INT: InputPin,
    A: PinAction,
    D: DelayNs + Clone,
{
    pub fn new(
        expander: &'a SharedExpander<I2C>,
        line: InterruptLine<INT>,
        dispatcher: Dispatcher<A, D, N>,
        delay: D,
        poll_interval: Duration,
    ) -> Self {
        Self {
            expander,
            line,
            dispatcher,
            delay,
            poll_interval,
            stats: MonitorStats::default(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<A, D, N> {
        &self.dispatcher
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    fn with_expander<R>(
        &self,
        f: impl FnOnce(&mut Mcp23017<I2C>) -> Result<R, Mcp23017Error<I2C::Error>>,
    ) -> Result<R, MonitorError<I2C::Error, INT::Error>> {
        self.expander.lock(|cell| match cell.try_borrow_mut() {
            Ok(mut expander) => f(&mut expander).map_err(MonitorError::Expander),
            Err(_) => Err(MonitorError::Busy),
        })
    }

    /// Drop interrupts latched before monitoring started
    pub fn clear_pending(&mut self) -> Result<(), MonitorError<I2C::Error, INT::Error>> {
        self.with_expander(|expander| expander.clear_interrupts())
    }

    /// Check the line once and dispatch at most one event.
    ///
    /// Dispatch failures are recovered here and reported as
    /// [`PollOutcome::Failed`]; only bus and line errors are returned.
    pub fn poll_once(&mut self) -> Result<PollOutcome, MonitorError<I2C::Error, INT::Error>> {
        if !self.line.is_asserted().map_err(MonitorError::Line)? {
            return Ok(PollOutcome::Idle);
        }

        // The expander lock is released before dispatching so actions can take it
        let Some(InterruptEvent { pin, state }) = self.with_expander(|e| e.read_interrupt())? else {
            self.stats.spurious += 1;
            debug!("Interrupt line asserted without a flagged pin");
            return Ok(PollOutcome::Spurious);
        };

        debug!("Interrupt: pin {} captured {}", pin, state);
        match self.dispatcher.handle(pin, state) {
            Ok(()) => {
                self.stats.handled += 1;
                Ok(PollOutcome::Handled { pin, state })
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!("Interrupt on pin {} not handled: {}", pin, e);
                Ok(PollOutcome::Failed { pin, state })
            }
        }
    }

    /// Poll until `running` is cleared, then return the counters
    pub fn run(&mut self, running: &AtomicBool) -> MonitorStats {
        info!(
            "Monitoring interrupts (poll every {:?}, settle {:?})",
            self.poll_interval,
            self.dispatcher.settle()
        );
        while running.load(Ordering::SeqCst) {
            match self.poll_once() {
                Ok(PollOutcome::Handled { .. } | PollOutcome::Failed { .. }) => {}
                Ok(PollOutcome::Idle | PollOutcome::Spurious) => self.wait_poll_interval(),
                Err(e) => {
                    self.stats.bus_errors += 1;
                    error!("Interrupt poll failed: {}", e);
                    self.wait_poll_interval();
                }
            }
        }

        info!("Monitor stopped: {:?}", self.stats);
        self.stats
    }

    fn wait_poll_interval(&mut self) {
        wait(&mut self.delay, self.poll_interval);
    }
}
