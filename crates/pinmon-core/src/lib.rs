//! Hardware-independent core library for pinmon
//!
//! This crate contains the platform-agnostic logic of the MCP23017 pin
//! monitor: the pin model, the per-pin interrupt dispatch table, the interrupt
//! actions, the MCP23017 register driver and the polling monitor loop.
//!
//! It is `#![no_std]` outside of tests and the `std`/`sim` features so it
//! compiles for bare-metal targets as well as for the Raspberry Pi host and the
//! desktop simulator.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod action;
#[cfg(feature = "std")]
pub mod delay;
pub mod dispatch;
pub mod mcp23017;
pub mod monitor;
pub mod mux;
pub mod pin;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use action::{ActionKind, InterruptAction, PinAction, SharedExpander, ToggleAction, TraceAction};
pub use dispatch::{DispatchConfig, DispatchError, Dispatcher, DispatcherState, PinBinding};
pub use mcp23017::{Mcp23017, Mcp23017Error};
pub use monitor::{InterruptLine, MonitorError, MonitorStats, PinMonitor, PollOutcome};
pub use mux::{MuxError, select_channel};
pub use pin::{MCP23017_PIN_COUNT, PinIndex, PinState};
