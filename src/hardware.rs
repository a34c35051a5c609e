//! Raspberry Pi hardware access
//!
//! Opens the I2C bus a chip is configured on (selecting its mux channel when
//! it has one) and the GPIO wired to the expander's interrupt output.

use std::convert::Infallible;

use log::info;
use rppal::gpio::{Gpio, InputPin};
use rppal::i2c::I2c;
use thiserror::Error;

use pinmon_core::{Mcp23017, Mcp23017Error, MonitorError, MuxError, select_channel};

use crate::config::{ChipConfig, InterruptConfig};

pub type PiExpander = Mcp23017<I2c>;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Failed to open I2C bus {bus}: {source}")]
    Bus {
        bus: u8,
        source: rppal::i2c::Error,
    },
    #[error("Failed to select mux channel {channel} at {address:#04x}: {error}")]
    Mux {
        address: u8,
        channel: u8,
        error: MuxError<rppal::i2c::Error>,
    },
    #[error("MCP23017 at {address:#04x}: {error}")]
    Expander {
        address: u8,
        error: Mcp23017Error<rppal::i2c::Error>,
    },
    #[error("Failed to open GPIO {pin}: {source}")]
    Gpio {
        pin: u8,
        source: rppal::gpio::Error,
    },
    #[error("Interrupt monitor: {0}")]
    Monitor(MonitorError<rppal::i2c::Error, Infallible>),
}

impl HardwareError {
    pub fn expander(address: u8) -> impl FnOnce(Mcp23017Error<rppal::i2c::Error>) -> Self {
        move |error| Self::Expander { address, error }
    }
}

/// Open the chip's bus and route it through the chip's mux channel
pub fn open_expander(chip: &ChipConfig) -> Result<PiExpander, HardwareError> {
    let mut i2c = I2c::with_bus(chip.bus).map_err(|source| HardwareError::Bus {
        bus: chip.bus,
        source,
    })?;

    if let Some(mux) = chip.mux {
        select_channel(&mut i2c, mux.address, mux.channel).map_err(|error| HardwareError::Mux {
            address: mux.address,
            channel: mux.channel,
            error,
        })?;
    }

    info!("Using MCP23017 at {:#04x} on I2C bus {}", chip.address, chip.bus);
    Ok(Mcp23017::new(i2c, chip.address))
}

/// Claim the Pi GPIO wired to INTA as an input
pub fn open_interrupt_pin(gpio: u8, config: &InterruptConfig) -> Result<InputPin, HardwareError> {
    let to_error = |source: rppal::gpio::Error| HardwareError::Gpio { pin: gpio, source };
    let pin = Gpio::new().map_err(to_error)?.get(gpio).map_err(to_error)?;

    info!(
        "Interrupt line on GPIO {}{}",
        gpio,
        if config.pull_up { " (pull-up)" } else { "" }
    );
    Ok(if config.pull_up {
        pin.into_input_pullup()
    } else {
        pin.into_input()
    })
}
