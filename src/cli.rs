//! Command line interface

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use pinmon_core::PinState;

/// MCP23017 pin monitor
///
/// Watches the expander's interrupt output and runs the action bound to the
/// pin that fired.
#[derive(Parser, Debug)]
#[command(name = "pinmon")]
#[command(version)]
#[command(about = "MCP23017 pin interrupt monitor for the Raspberry Pi")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "pinmon.toml")]
    pub config: PathBuf,

    /// Chip to use instead of the configured default
    #[arg(long, global = true)]
    pub chip: Option<String>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Configure the chip and dispatch interrupts until Ctrl-C
    Monitor {
        /// Restore power-on register defaults before configuring
        #[arg(long)]
        reset: bool,
    },

    /// Print the level of a pin
    Read {
        /// Pin index, 0-7 for GPA0-7 and 8-15 for GPB0-7
        #[arg(short, long)]
        pin: u8,
    },

    /// Make a pin an output and drive it
    Write {
        #[arg(short, long)]
        pin: u8,

        #[arg(short, long, value_enum)]
        level: Level,
    },

    /// Print all registers
    Dump,

    /// Restore power-on register defaults
    Reset,

    /// Apply [iocon] and [[pins]] from the configuration
    Configure {
        /// Restore power-on register defaults first
        #[arg(long)]
        reset: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

impl From<Level> for PinState {
    fn from(level: Level) -> Self {
        match level {
            Level::High => PinState::High,
            Level::Low => PinState::Low,
        }
    }
}

impl Cli {
    /// Default log filter, before `RUST_LOG` is applied
    pub fn log_filter(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
