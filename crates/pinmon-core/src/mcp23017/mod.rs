//! MCP23017 16-bit I2C GPIO expander driver
//!
//! Blocking driver over `embedded_hal::i2c::I2c`. Registers are always
//! accessed one at a time so the driver keeps working when the sequential
//! address pointer is disabled in IOCON.

mod registers;

pub use registers::*;

use embedded_hal::i2c::I2c;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::pin::{PinIndex, PinState};

/// Address with A2..A0 tied low
pub const DEFAULT_ADDRESS: u8 = 0x20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Mcp23017Error<E> {
    #[error("I2C bus error: {0:?}")]
    I2c(E),
    #[error("Pin {pin} is not on the MCP23017 (0-15)")]
    InvalidPin { pin: u8 },
    #[error("IOCON.BANK is set; only BANK = 0 addressing is supported")]
    BankMode,
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Input,
    Output,
}

/// Condition that raises an interrupt for an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptTrigger {
    /// Interrupt disabled
    #[default]
    None,
    /// Any change from the previous value
    Change,
    /// Pin reads low (compared against DEFVAL = 1)
    Low,
    /// Pin reads high (compared against DEFVAL = 0)
    High,
}

/// Per-pin configuration applied at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinSetup {
    pub pin: PinIndex,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub pull_up: bool,
    /// Invert the GPIO reading (IPOL)
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub interrupt: InterruptTrigger,
}

impl PinSetup {
    pub const fn input(pin: PinIndex) -> Self {
        Self {
            pin,
            direction: Direction::Input,
            pull_up: false,
            invert: false,
            interrupt: InterruptTrigger::None,
        }
    }

    pub const fn output(pin: PinIndex) -> Self {
        Self {
            direction: Direction::Output,
            ..Self::input(pin)
        }
    }

    pub const fn with_pull_up(mut self) -> Self {
        self.pull_up = true;
        self
    }

    pub const fn with_interrupt(mut self, trigger: InterruptTrigger) -> Self {
        self.interrupt = trigger;
        self
    }
}

/// Pin state captured by the chip when its interrupt fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEvent {
    pub pin: PinIndex,
    pub state: PinState,
}

/// Splits a pin index into its port and bit
pub fn port_bit<E>(pin: PinIndex) -> Result<(Port, u8), Mcp23017Error<E>> {
    match pin.raw() {
        raw @ 0..=7 => Ok((Port::A, raw)),
        raw @ 8..=15 => Ok((Port::B, raw - 8)),
        raw => Err(Mcp23017Error::InvalidPin { pin: raw }),
    }
}

pub struct Mcp23017<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Mcp23017<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn read_register(&mut self, addr: u8) -> Result<u8, Mcp23017Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[addr], &mut buf)
            .map_err(Mcp23017Error::I2c)?;
        trace!("MCP23017@{:#04x} read {:#04x} = {:#04x}", self.address, addr, buf[0]);
        Ok(buf[0])
    }

    pub fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Mcp23017Error<I2C::Error>> {
        trace!("MCP23017@{:#04x} write {:#04x} = {:#04x}", self.address, addr, value);
        self.i2c
            .write(self.address, &[addr, value])
            .map_err(Mcp23017Error::I2c)
    }

    fn read(&mut self, register: Register, port: Port) -> Result<u8, Mcp23017Error<I2C::Error>> {
        self.read_register(register.addr(port))
    }

    fn write(
        &mut self,
        register: Register,
        port: Port,
        value: u8,
    ) -> Result<(), Mcp23017Error<I2C::Error>> {
        self.write_register(register.addr(port), value)
    }

    /// Read-modify-write of a single pin's bit
    fn update_bit(
        &mut self,
        register: Register,
        pin: PinIndex,
        set: bool,
    ) -> Result<(), Mcp23017Error<I2C::Error>> {
        let (port, bit) = port_bit::<I2C::Error>(pin)?;
        let current = self.read(register, port)?;
        let next = if set {
            current | (1 << bit)
        } else {
            current & !(1 << bit)
        };
        if next != current {
            self.write(register, port, next)?;
        }
        Ok(())
    }

    /// Restore the power-on register values.
    ///
    /// The I2C part has no software reset command. Clearing 0x05 first leaves
    /// BANK = 1 if the chip was in it; with BANK = 0 that address is GPINTENB,
    /// which is reset below anyway.
    pub fn reset(&mut self) -> Result<(), Mcp23017Error<I2C::Error>> {
        debug!("MCP23017@{:#04x}: restoring power-on defaults", self.address);
        self.write_register(BANK1_IOCON_ADDR, Register::Iocon.reset_value())?;
        self.write(Register::Iocon, Port::A, Register::Iocon.reset_value())?;
        for register in Register::ALL {
            if matches!(
                register,
                Register::Iocon | Register::Intf | Register::Intcap | Register::Gpio
            ) {
                continue;
            }
            for port in [Port::A, Port::B] {
                self.write(register, port, register.reset_value())?;
            }
        }
        self.clear_interrupts()
    }

    pub fn configure_iocon(&mut self, iocon: Iocon) -> Result<(), Mcp23017Error<I2C::Error>> {
        debug!("MCP23017@{:#04x}: IOCON = {:#010b}", self.address, iocon.bits());
        self.write(Register::Iocon, Port::A, iocon.bits())
    }

    pub fn iocon(&mut self) -> Result<Iocon, Mcp23017Error<I2C::Error>> {
        let bits = self.read(Register::Iocon, Port::A)?;
        if Iocon::bank_bit_set(bits) {
            return Err(Mcp23017Error::BankMode);
        }
        Ok(Iocon::from_bits(bits))
    }

    pub fn set_direction(
        &mut self,
        pin: PinIndex,
        direction: Direction,
    ) -> Result<(), Mcp23017Error<I2C::Error>> {
        self.update_bit(Register::Iodir, pin, direction == Direction::Input)
    }

    pub fn set_pull_up(
        &mut self,
        pin: PinIndex,
        enabled: bool,
    ) -> Result<(), Mcp23017Error<I2C::Error>> {
        self.update_bit(Register::Gppu, pin, enabled)
    }

    pub fn set_polarity(
        &mut self,
        pin: PinIndex,
        inverted: bool,
    ) -> Result<(), Mcp23017Error<I2C::Error>> {
        self.update_bit(Register::Ipol, pin, inverted)
    }

    pub fn set_interrupt(
        &mut self,
        pin: PinIndex,
        trigger: InterruptTrigger,
    ) -> Result<(), Mcp23017Error<I2C::Error>> {
        match trigger {
            InterruptTrigger::None => self.update_bit(Register::Gpinten, pin, false),
            InterruptTrigger::Change => {
                self.update_bit(Register::Intcon, pin, false)?;
                self.update_bit(Register::Gpinten, pin, true)
            }
            InterruptTrigger::Low | InterruptTrigger::High => {
                // The chip interrupts when the pin differs from DEFVAL
                let defval_high = trigger == InterruptTrigger::Low;
                self.update_bit(Register::Defval, pin, defval_high)?;
                self.update_bit(Register::Intcon, pin, true)?;
                self.update_bit(Register::Gpinten, pin, true)
            }
        }
    }

    pub fn apply_setup(&mut self, setup: &PinSetup) -> Result<(), Mcp23017Error<I2C::Error>> {
        debug!("MCP23017@{:#04x}: pin {} setup {:?}", self.address, setup.pin, setup);
        self.set_direction(setup.pin, setup.direction)?;
        self.set_pull_up(setup.pin, setup.pull_up)?;
        self.set_polarity(setup.pin, setup.invert)?;
        let trigger = match setup.direction {
            Direction::Input => setup.interrupt,
            // Interrupts only make sense on inputs
            Direction::Output => InterruptTrigger::None,
        };
        self.set_interrupt(setup.pin, trigger)
    }

    /// Drive an output pin through its output latch
    pub fn write_pin(
        &mut self,
        pin: PinIndex,
        state: PinState,
    ) -> Result<(), Mcp23017Error<I2C::Error>> {
        self.update_bit(Register::Olat, pin, state.is_high())
    }

    pub fn read_pin(&mut self, pin: PinIndex) -> Result<PinState, Mcp23017Error<I2C::Error>> {
        let (port, bit) = port_bit::<I2C::Error>(pin)?;
        let value = self.read(Register::Gpio, port)?;
        Ok(PinState::from_bit(value, bit))
    }

    /// Fetch the pin that raised the pending interrupt.
    ///
    /// Reading INTCAP clears the interrupt of that port only. When both ports
    /// have a pending interrupt the lowest pin is returned and the other port
    /// keeps the INT line asserted until the next call.
    pub fn read_interrupt(&mut self) -> Result<Option<InterruptEvent>, Mcp23017Error<I2C::Error>> {
        for port in [Port::A, Port::B] {
            let flags = self.read(Register::Intf, port)?;
            if flags == 0 {
                continue;
            }
            let bit = flags.trailing_zeros() as u8;
            let captured = self.read(Register::Intcap, port)?;
            let offset = if port == Port::A { 0 } else { 8 };
            let event = InterruptEvent {
                pin: PinIndex::new(offset + bit),
                state: PinState::from_bit(captured, bit),
            };
            debug!(
                "MCP23017@{:#04x}: INTF{} = {:#010b}, INTCAP{} = {:#010b}",
                self.address,
                port.label(),
                flags,
                port.label(),
                captured
            );
            return Ok(Some(event));
        }
        Ok(None)
    }

    /// Drop any pending interrupt by reading both capture registers
    pub fn clear_interrupts(&mut self) -> Result<(), Mcp23017Error<I2C::Error>> {
        self.read(Register::Intcap, Port::A)?;
        self.read(Register::Intcap, Port::B)?;
        Ok(())
    }

    /// All registers in address order.
    ///
    /// Reading INTCAP/GPIO clears pending interrupts, so avoid this while a
    /// monitor is waiting on the INT line.
    pub fn dump_registers(&mut self) -> Result<[u8; REGISTER_COUNT], Mcp23017Error<I2C::Error>> {
        let mut regs = [0u8; REGISTER_COUNT];
        for (addr, slot) in regs.iter_mut().enumerate() {
            *slot = self.read_register(addr as u8)?;
        }
        Ok(regs)
    }
}
