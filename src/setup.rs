//! Start-up steps that only need an I2C bus
//!
//! Kept apart from [`crate::hardware`] so they run unchanged against the
//! simulated chip in tests.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info};

use pinmon_core::action::ActionError;
use pinmon_core::{
    DispatchConfig, DispatchError, Dispatcher, InterruptAction, Mcp23017, Mcp23017Error,
    SharedExpander,
};

use crate::config::AppConfig;

/// Optionally reset the chip, then apply `[iocon]` and every `[[pins]]` entry
pub fn configure_chip<I2C: I2c>(
    mcp: &mut Mcp23017<I2C>,
    config: &AppConfig,
    reset: bool,
) -> Result<(), Mcp23017Error<I2C::Error>> {
    if reset {
        info!("Resetting MCP23017@{:#04x}", mcp.address());
        mcp.reset()?;
    }

    // IOCON first: it decides how the remaining registers are addressed
    mcp.configure_iocon(config.iocon)?;
    for setup in &config.pins {
        debug!("Pin {:>2}: {:?}", setup.pin, setup);
        mcp.apply_setup(setup)?;
    }
    info!(
        "MCP23017@{:#04x} configured ({} pins)",
        mcp.address(),
        config.pins.len()
    );
    Ok(())
}

pub type PinDispatcher<'a, I2C, D> = Dispatcher<InterruptAction<'a, I2C>, D>;

/// Build the ready dispatch table, with toggle actions driving `expander`
pub fn build_dispatcher<'a, I2C, D>(
    expander: &'a SharedExpander<I2C>,
    dispatch: &DispatchConfig,
    delay: D,
    settle: Duration,
) -> Result<PinDispatcher<'a, I2C, D>, DispatchError<ActionError<I2C::Error>>>
where
    I2C: I2c,
    D: DelayNs + Clone,
{
    let mut dispatcher = Dispatcher::new(delay, settle);
    dispatcher.initialize(dispatch, |_, kind| InterruptAction::from_kind(kind, expander))?;
    Ok(dispatcher)
}
