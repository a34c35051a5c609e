//! Per-pin interrupt dispatch table
//!
//! The [`Dispatcher`] owns one action per expander pin. It is built once from
//! a declarative [`DispatchConfig`] and afterwards only read, so `handle` takes
//! `&self` and may be called from several threads when the actions allow it.
//!
//! ```text
//! Uninitialized --initialize()--> Ready
//! ```
//!
//! There is no way back to `Uninitialized`; `handle` before `initialize`
//! fails with [`DispatchError::NotReady`].

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::action::{ActionKind, PinAction};
use crate::pin::{MCP23017_PIN_COUNT, PinIndex, PinState};

/// Settling delay applied after each action unless configured otherwise
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError<E> {
    #[error("Dispatcher used before its table was initialized")]
    NotReady,
    #[error("Dispatch table is already initialized")]
    AlreadyInitialized,
    #[error("Pin {pin} is outside the dispatch table of {limit} pins")]
    InvalidPin { pin: u8, limit: usize },
    #[error("Pin {pin} is bound more than once")]
    DuplicatePin { pin: u8 },
    #[error("Action for pin {pin} failed: {error:?}")]
    ActionFailure { pin: u8, error: E },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Uninitialized,
    Ready,
}

/// One explicit pin-to-action assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinBinding {
    pub pin: PinIndex,
    pub action: ActionKind,
}

/// Declarative dispatch table description: a default action for every pin
/// plus explicit overrides.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub default: ActionKind,
    pub bindings: heapless::Vec<PinBinding, MCP23017_PIN_COUNT>,
}

impl DispatchConfig {
    pub fn new(default: ActionKind) -> Self {
        Self {
            default,
            bindings: heapless::Vec::new(),
        }
    }

    /// Add an override. Gives the binding back when the list is full.
    pub fn bind(&mut self, pin: PinIndex, action: ActionKind) -> Result<(), PinBinding> {
        self.bindings.push(PinBinding { pin, action })
    }

    pub fn with_binding(mut self, pin: PinIndex, action: ActionKind) -> Result<Self, PinBinding> {
        self.bind(pin, action)?;
        Ok(self)
    }

    /// Action configured for `pin`
    pub fn kind_for(&self, pin: PinIndex) -> ActionKind {
        self.bindings
            .iter()
            .find(|binding| binding.pin == pin)
            .map(|binding| binding.action)
            .unwrap_or(self.default)
    }

    /// Reject pins (bound or driven) outside a table of `limit` pins and
    /// duplicate bindings
    pub fn validate<E>(&self, limit: usize) -> Result<(), DispatchError<E>> {
        let check = |pin: PinIndex| -> Result<(), DispatchError<E>> {
            if pin.is_within(limit) {
                Ok(())
            } else {
                Err(DispatchError::InvalidPin {
                    pin: pin.raw(),
                    limit,
                })
            }
        };

        if let Some(output) = self.default.output() {
            check(output)?;
        }
        for (i, binding) in self.bindings.iter().enumerate() {
            check(binding.pin)?;
            if let Some(output) = binding.action.output() {
                check(output)?;
            }
            if self.bindings[..i].iter().any(|earlier| earlier.pin == binding.pin) {
                return Err(DispatchError::DuplicatePin {
                    pin: binding.pin.raw(),
                });
            }
        }
        Ok(())
    }
}

/// Fixed-size table of pin actions plus the post-action settling policy.
///
/// `D` is cloned for every settle so it should be a zero-sized or otherwise
/// cheap handle.
pub struct Dispatcher<A, D, const N: usize = MCP23017_PIN_COUNT> {
    table: Option<[A; N]>,
    delay: D,
    settle: Duration,
}

impl<A, D, const N: usize> Dispatcher<A, D, N>
where
    A: PinAction,
    D: DelayNs + Clone,
{
    pub fn new(delay: D, settle: Duration) -> Self {
        const { assert!(N <= u8::MAX as usize + 1, "pin indices are 8-bit") };
        Self {
            table: None,
            delay,
            settle,
        }
    }

    pub fn state(&self) -> DispatcherState {
        if self.table.is_some() {
            DispatcherState::Ready
        } else {
            DispatcherState::Uninitialized
        }
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    pub const fn pin_count(&self) -> usize {
        N
    }

    /// Build one action per pin from `config`.
    ///
    /// The configuration is validated before anything is built, so on error
    /// the dispatcher stays `Uninitialized`.
    pub fn initialize<F>(
        &mut self,
        config: &DispatchConfig,
        mut build: F,
    ) -> Result<(), DispatchError<A::Error>>
    where
        F: FnMut(PinIndex, ActionKind) -> A,
    {
        trace!("Dispatcher::initialize entry");
        if self.table.is_some() {
            return Err(DispatchError::AlreadyInitialized);
        }
        config.validate::<A::Error>(N)?;

        let table = core::array::from_fn(|i| {
            let pin = PinIndex::new(i as u8);
            let kind = config.kind_for(pin);
            debug!("Pin {:>2} -> {}", pin, kind.label());
            build(pin, kind)
        });
        self.table = Some(table);

        trace!("Dispatcher::initialize exit");
        Ok(())
    }

    /// Registered action for `pin`
    pub fn action(&self, pin: PinIndex) -> Option<&A> {
        self.table.as_ref()?.get(pin.as_usize())
    }

    /// Run the action registered for `pin`, then wait out the settle time.
    ///
    /// The settle delay follows every invoked action, failed or not, and never
    /// changes the action's outcome.
    pub fn handle(&self, pin: PinIndex, state: PinState) -> Result<(), DispatchError<A::Error>> {
        trace!("Dispatcher::handle entry: pin {} {}", pin, state);
        let Some(table) = self.table.as_ref() else {
            return Err(DispatchError::NotReady);
        };
        let Some(action) = table.get(pin.as_usize()) else {
            return Err(DispatchError::InvalidPin {
                pin: pin.raw(),
                limit: N,
            });
        };

        let outcome = action.act(pin, state).map_err(|error| {
            error!("Interrupt action for pin {} failed: {:?}", pin, error);
            DispatchError::ActionFailure {
                pin: pin.raw(),
                error,
            }
        });
        self.settle_after_action();

        trace!("Dispatcher::handle exit: pin {} ok={}", pin, outcome.is_ok());
        outcome
    }

    fn settle_after_action(&self) {
        if self.settle.is_zero() {
            return;
        }
        wait(&mut self.delay.clone(), self.settle);
    }
}

/// Block for `duration`, in `u32` millisecond chunks plus the sub-millisecond rest
pub(crate) fn wait<D: DelayNs>(delay: &mut D, duration: Duration) {
    let mut millis = duration.as_millis();
    while millis > 0 {
        let chunk = u32::try_from(millis).unwrap_or(u32::MAX);
        delay.delay_ms(chunk);
        millis -= u128::from(chunk);
    }
    let micros = duration.subsec_micros() % 1_000;
    if micros > 0 {
        delay.delay_us(micros);
    }
}
