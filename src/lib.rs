//! Raspberry Pi front end for the pinmon MCP23017 interrupt monitor
//!
//! The monitoring logic lives in `pinmon-core`; this crate adds the
//! configuration file, the command line and the Pi's I2C and GPIO.

pub mod cli;
pub mod config;
pub mod hardware;
pub mod setup;
pub mod shutdown;
