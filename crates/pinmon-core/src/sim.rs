//! Register-level simulated MCP23017
//!
//! [`SimulatedMcp23017`] answers I2C transactions from an in-memory register
//! file, [`SimInterruptLine`] models the INTA output and [`SimHandle`] plays
//! the outside world: it changes input levels and observes the outputs.
//!
//! The model covers what the monitor relies on: sequential addressing,
//! interrupt-on-change and compare-to-DEFVAL, INTCAP capture, clearing on
//! INTCAP/GPIO reads, input polarity, MIRROR and INTPOL/ODR. A persistent
//! DEFVAL mismatch fires again on the next input change or configuration
//! write rather than immediately after being cleared.
//!
//! BANK = 1 is only modelled far enough to leave it: while BANK is set, IOCON
//! also answers at 0x05 and 0x15.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::{ErrorType as DigitalErrorType, InputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation};
use log::trace;

use crate::mcp23017::{BANK1_IOCON_ADDR, Iocon, Port, REGISTER_COUNT, Register, port_bit};
use crate::pin::{PinIndex, PinState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimBusError {
    /// Nothing answered at the requested address
    NoAcknowledge,
    /// Register pointer beyond 0x15
    InvalidRegister(u8),
}

impl i2c::Error for SimBusError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAcknowledge => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Self::InvalidRegister(_) => ErrorKind::Other,
        }
    }
}

struct ChipModel {
    regs: [u8; REGISTER_COUNT],
    /// External levels applied to the pins, GPA in the low byte
    inputs: u16,
    /// GPIO value seen by the last interrupt evaluation
    previous: u16,
    pointer: u8,
}

impl ChipModel {
    fn new() -> Self {
        let mut regs = [0u8; REGISTER_COUNT];
        for (addr, slot) in regs.iter_mut().enumerate() {
            if let Some((register, _)) = Register::from_addr(addr as u8) {
                *slot = register.reset_value();
            }
        }
        Self {
            regs,
            inputs: 0,
            previous: 0,
            pointer: 0,
        }
    }

    fn reg(&self, register: Register, port: Port) -> u8 {
        self.regs[register.addr(port) as usize]
    }

    fn reg16(&self, register: Register) -> u16 {
        u16::from_le_bytes([self.reg(register, Port::A), self.reg(register, Port::B)])
    }

    fn iocon(&self) -> Iocon {
        Iocon::from_bits(self.reg(Register::Iocon, Port::A))
    }

    /// Value the GPIO register reads back
    fn gpio(&self) -> u16 {
        let iodir = self.reg16(Register::Iodir);
        let inputs = self.inputs ^ self.reg16(Register::Ipol);
        (inputs & iodir) | (self.reg16(Register::Olat) & !iodir)
    }

    fn port_byte(value: u16, port: Port) -> u8 {
        value.to_le_bytes()[port as usize]
    }

    fn clear_port(&mut self, port: Port) {
        self.regs[Register::Intf.addr(port) as usize] = 0;
    }

    fn evaluate(&mut self) {
        let gpio = self.gpio();
        let enabled = self.reg16(Register::Gpinten) & self.reg16(Register::Iodir);
        let intcon = self.reg16(Register::Intcon);
        let against_previous = (gpio ^ self.previous) & !intcon;
        let against_defval = (gpio ^ self.reg16(Register::Defval)) & intcon;
        let firing = (against_previous | against_defval) & enabled;

        for port in [Port::A, Port::B] {
            let bits = Self::port_byte(firing, port);
            if bits == 0 || self.reg(Register::Intf, port) != 0 {
                continue;
            }
            // Only the first pin is flagged until the port is cleared
            let first = 1u8 << bits.trailing_zeros();
            self.regs[Register::Intf.addr(port) as usize] = first;
            self.regs[Register::Intcap.addr(port) as usize] = Self::port_byte(gpio, port);
            trace!("sim: INTF{} = {:#010b}", port.label(), first);
        }
        self.previous = gpio;
    }

    fn read_at(&mut self, addr: u8) -> Result<u8, SimBusError> {
        if let Some(alias) = self.bank1_iocon(addr) {
            return self.read_at(alias);
        }
        let (register, port) = Register::from_addr(addr).ok_or(SimBusError::InvalidRegister(addr))?;
        let value = match register {
            Register::Gpio => {
                let value = Self::port_byte(self.gpio(), port);
                self.clear_port(port);
                value
            }
            Register::Intcap => {
                let value = self.reg(register, port);
                self.clear_port(port);
                value
            }
            _ => self.reg(register, port),
        };
        Ok(value)
    }

    /// BANK = 0 address of IOCON when `addr` is IOCON under BANK = 1
    fn bank1_iocon(&self, addr: u8) -> Option<u8> {
        let bank1 = Iocon::bank_bit_set(self.reg(Register::Iocon, Port::A));
        let aliased = addr == BANK1_IOCON_ADDR || addr == BANK1_IOCON_ADDR + 0x10;
        (bank1 && aliased).then_some(Register::Iocon.addr(Port::A))
    }

    fn write_at(&mut self, addr: u8, value: u8) -> Result<(), SimBusError> {
        if let Some(alias) = self.bank1_iocon(addr) {
            return self.write_at(alias, value);
        }
        let (register, port) = Register::from_addr(addr).ok_or(SimBusError::InvalidRegister(addr))?;
        match register {
            Register::Intf | Register::Intcap => {}
            Register::Gpio => self.regs[Register::Olat.addr(port) as usize] = value,
            Register::Iocon => {
                self.regs[Register::Iocon.addr(Port::A) as usize] = value;
                self.regs[Register::Iocon.addr(Port::B) as usize] = value;
            }
            _ => self.regs[addr as usize] = value,
        }
        let config = matches!(
            register,
            Register::Iodir
                | Register::Ipol
                | Register::Gpinten
                | Register::Defval
                | Register::Intcon
        );
        if config {
            self.evaluate();
        }
        Ok(())
    }

    fn advance(&mut self) {
        if !self.iocon().seqop_disabled {
            self.pointer = (self.pointer + 1) % REGISTER_COUNT as u8;
        }
    }

    fn int_a_asserted(&self) -> bool {
        let a = self.reg(Register::Intf, Port::A) != 0;
        let b = self.reg(Register::Intf, Port::B) != 0;
        if self.iocon().mirror { a || b } else { a }
    }
}

fn lock(model: &Mutex<ChipModel>) -> MutexGuard<'_, ChipModel> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The simulated chip as seen from the I2C bus
pub struct SimulatedMcp23017 {
    address: u8,
    model: Arc<Mutex<ChipModel>>,
}

impl SimulatedMcp23017 {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            model: Arc::new(Mutex::new(ChipModel::new())),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            model: Arc::clone(&self.model),
        }
    }

    pub fn interrupt_line(&self) -> SimInterruptLine {
        SimInterruptLine {
            model: Arc::clone(&self.model),
        }
    }
}

impl i2c::ErrorType for SimulatedMcp23017 {
    type Error = SimBusError;
}

impl I2c for SimulatedMcp23017 {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(SimBusError::NoAcknowledge);
        }
        let mut model = lock(&self.model);
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    let Some((&pointer, data)) = bytes.split_first() else {
                        continue;
                    };
                    model.pointer = pointer;
                    for &value in data {
                        let addr = model.pointer;
                        model.write_at(addr, value)?;
                        model.advance();
                    }
                }
                Operation::Read(buf) => {
                    for slot in buf.iter_mut() {
                        let addr = model.pointer;
                        *slot = model.read_at(addr)?;
                        model.advance();
                    }
                }
            }
        }
        Ok(())
    }
}

/// Test-side access to the simulated chip
#[derive(Clone)]
pub struct SimHandle {
    model: Arc<Mutex<ChipModel>>,
}

impl SimHandle {
    /// Apply an external level to a pin and evaluate interrupts
    pub fn set_input(&self, pin: PinIndex, state: PinState) {
        let Ok((port, bit)) = port_bit::<()>(pin) else {
            return;
        };
        let mask = 1u16 << (bit + 8 * port as u8);
        let mut model = lock(&self.model);
        if state.is_high() {
            model.inputs |= mask;
        } else {
            model.inputs &= !mask;
        }
        model.evaluate();
    }

    /// Raw register value, without read side effects
    pub fn register(&self, addr: u8) -> u8 {
        lock(&self.model).regs.get(addr as usize).copied().unwrap_or(0)
    }

    /// Level driven by an output pin, `None` while the pin is an input
    pub fn output(&self, pin: PinIndex) -> Option<PinState> {
        let (port, bit) = port_bit::<()>(pin).ok()?;
        let model = lock(&self.model);
        if model.reg(Register::Iodir, port) & (1 << bit) != 0 {
            return None;
        }
        Some(PinState::from_bit(model.reg(Register::Olat, port), bit))
    }

    pub fn interrupt_pending(&self) -> bool {
        let model = lock(&self.model);
        model.reg(Register::Intf, Port::A) != 0 || model.reg(Register::Intf, Port::B) != 0
    }
}

/// The chip's INTA output, wired to a host input
pub struct SimInterruptLine {
    model: Arc<Mutex<ChipModel>>,
}

impl DigitalErrorType for SimInterruptLine {
    type Error = core::convert::Infallible;
}

impl InputPin for SimInterruptLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let model = lock(&self.model);
        let asserted = model.int_a_asserted();
        // An idle open-drain or active-low line is pulled up
        Ok(if model.iocon().int_active_high() {
            asserted
        } else {
            !asserted
        })
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: u8 = 0x20;

    fn write(bus: &mut SimulatedMcp23017, bytes: &[u8]) {
        bus.write(ADDR, bytes).unwrap();
    }

    fn read(bus: &mut SimulatedMcp23017, reg: u8) -> u8 {
        let mut buf = [0u8];
        bus.write_read(ADDR, &[reg], &mut buf).unwrap();
        buf[0]
    }

    #[test]
    fn test_sequential_write_and_read() {
        let mut bus = SimulatedMcp23017::new(ADDR);
        // IODIRA, IODIRB in one transfer
        write(&mut bus, &[0x00, 0x0F, 0xF0]);

        let mut buf = [0u8; 2];
        bus.write_read(ADDR, &[0x00], &mut buf).unwrap();
        assert_eq!(buf, [0x0F, 0xF0]);
    }

    #[test]
    fn test_change_interrupt_captures_first_pin_only() {
        let mut bus = SimulatedMcp23017::new(ADDR);
        let sim = bus.handle();
        write(&mut bus, &[Register::Gpinten.addr(Port::A), 0xFF]);

        sim.set_input(PinIndex::new(1), PinState::High);
        sim.set_input(PinIndex::new(2), PinState::High);

        assert_eq!(read(&mut bus, Register::Intf.addr(Port::A)), 0b0000_0010);
        assert_eq!(read(&mut bus, Register::Intcap.addr(Port::A)), 0b0000_0010);
        assert!(!sim.interrupt_pending());
    }

    #[test]
    fn test_interrupt_line_polarity_and_mirror() {
        let mut bus = SimulatedMcp23017::new(ADDR);
        let sim = bus.handle();
        let mut line = bus.interrupt_line();
        write(&mut bus, &[Register::Gpinten.addr(Port::B), 0x01]);
        assert!(line.is_high().unwrap());

        sim.set_input(PinIndex::new(8), PinState::High);
        // Port B interrupt without MIRROR does not reach INTA
        assert!(line.is_high().unwrap());

        write(&mut bus, &[Register::Iocon.addr(Port::A), 0b0100_0000]);
        assert!(line.is_low().unwrap());

        write(&mut bus, &[Register::Iocon.addr(Port::A), 0b0100_0010]);
        assert!(line.is_high().unwrap());
    }

    #[test]
    fn test_defval_compare() {
        let mut bus = SimulatedMcp23017::new(ADDR);
        let sim = bus.handle();
        write(&mut bus, &[Register::Defval.addr(Port::A), 0x01]);
        write(&mut bus, &[Register::Intcon.addr(Port::A), 0x01]);
        sim.set_input(PinIndex::new(0), PinState::High);
        write(&mut bus, &[Register::Gpinten.addr(Port::A), 0x01]);
        assert!(!sim.interrupt_pending());

        sim.set_input(PinIndex::new(0), PinState::Low);
        assert!(sim.interrupt_pending());
    }

    #[test]
    fn test_wrong_address_nacks() {
        let mut bus = SimulatedMcp23017::new(ADDR);
        assert_eq!(bus.write(0x21, &[0x00, 0x00]), Err(SimBusError::NoAcknowledge));
    }
}
