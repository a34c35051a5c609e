//! MCP23017 register map (IOCON.BANK = 0)
//!
//! With BANK cleared every register exists once per port and the A/B pair
//! sits at consecutive addresses: A at the even address, B at the odd one.

use serde::{Deserialize, Serialize};

/// Total number of register addresses (0x00..=0x15)
pub const REGISTER_COUNT: usize = 22;

/// IOCON address while IOCON.BANK = 1 (GPINTENB with BANK = 0)
pub const BANK1_IOCON_ADDR: u8 = 0x05;

/// One of the two 8-bit ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A = 0,
    B = 1,
}

impl Port {
    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

/// Register kinds, ordered by their BANK=0 address pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    /// I/O direction, 1 = input
    Iodir = 0,
    /// Input polarity, 1 = GPIO reads inverted
    Ipol = 1,
    /// Interrupt-on-change enable
    Gpinten = 2,
    /// Compare value for INTCON = 1
    Defval = 3,
    /// Interrupt control: 0 = compare to previous value, 1 = compare to DEFVAL
    Intcon = 4,
    /// Shared configuration register
    Iocon = 5,
    /// Pull-up enable (100k)
    Gppu = 6,
    /// Interrupt flag (read only)
    Intf = 7,
    /// Port value captured when the interrupt fired (read only)
    Intcap = 8,
    /// Port value
    Gpio = 9,
    /// Output latch
    Olat = 10,
}

impl Register {
    pub const ALL: [Register; 11] = [
        Self::Iodir,
        Self::Ipol,
        Self::Gpinten,
        Self::Defval,
        Self::Intcon,
        Self::Iocon,
        Self::Gppu,
        Self::Intf,
        Self::Intcap,
        Self::Gpio,
        Self::Olat,
    ];

    pub const fn addr(self, port: Port) -> u8 {
        (self as u8) * 2 + port as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Iodir => "IODIR",
            Self::Ipol => "IPOL",
            Self::Gpinten => "GPINTEN",
            Self::Defval => "DEFVAL",
            Self::Intcon => "INTCON",
            Self::Iocon => "IOCON",
            Self::Gppu => "GPPU",
            Self::Intf => "INTF",
            Self::Intcap => "INTCAP",
            Self::Gpio => "GPIO",
            Self::Olat => "OLAT",
        }
    }

    /// Register and port living at a BANK=0 address
    pub const fn from_addr(addr: u8) -> Option<(Self, Port)> {
        if addr as usize >= REGISTER_COUNT {
            return None;
        }
        let port = if addr & 1 == 0 { Port::A } else { Port::B };
        Some((Self::ALL[(addr / 2) as usize], port))
    }

    /// Power-on reset value
    pub const fn reset_value(self) -> u8 {
        match self {
            Self::Iodir => 0xFF,
            _ => 0x00,
        }
    }
}

// IOCON bits
const IOCON_BANK: u8 = 1 << 7;
const IOCON_MIRROR: u8 = 1 << 6;
const IOCON_SEQOP: u8 = 1 << 5;
const IOCON_DISSLW: u8 = 1 << 4;
const IOCON_HAEN: u8 = 1 << 3;
const IOCON_ODR: u8 = 1 << 2;
const IOCON_INTPOL: u8 = 1 << 1;

/// IOCON options.
///
/// BANK is not exposed: the driver always addresses the chip with BANK = 0.
/// `mirror` defaults to on so a single host GPIO can watch both ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Iocon {
    /// INTA and INTB are internally connected
    pub mirror: bool,
    /// Disable sequential address pointer increment
    pub seqop_disabled: bool,
    /// Disable SDA slew rate control
    pub disslw: bool,
    /// Hardware address enable (MCP23S17 only, harmless on the I2C part)
    pub haen: bool,
    /// INT pin configured as open-drain
    pub odr: bool,
    /// INT pin active high (ignored when `odr` is set)
    pub intpol: bool,
}

impl Default for Iocon {
    fn default() -> Self {
        Self {
            mirror: true,
            seqop_disabled: false,
            disslw: false,
            haen: false,
            odr: false,
            intpol: false,
        }
    }
}

impl Iocon {
    pub const fn bits(self) -> u8 {
        let mut bits = 0;
        if self.mirror {
            bits |= IOCON_MIRROR;
        }
        if self.seqop_disabled {
            bits |= IOCON_SEQOP;
        }
        if self.disslw {
            bits |= IOCON_DISSLW;
        }
        if self.haen {
            bits |= IOCON_HAEN;
        }
        if self.odr {
            bits |= IOCON_ODR;
        }
        if self.intpol {
            bits |= IOCON_INTPOL;
        }
        bits
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self {
            mirror: bits & IOCON_MIRROR != 0,
            seqop_disabled: bits & IOCON_SEQOP != 0,
            disslw: bits & IOCON_DISSLW != 0,
            haen: bits & IOCON_HAEN != 0,
            odr: bits & IOCON_ODR != 0,
            intpol: bits & IOCON_INTPOL != 0,
        }
    }

    pub const fn bank_bit_set(bits: u8) -> bool {
        bits & IOCON_BANK != 0
    }

    /// Logic level of the INT pin while an interrupt is pending
    pub const fn int_active_high(self) -> bool {
        // Open-drain outputs can only pull low
        self.intpol && !self.odr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank0_addresses() {
        assert_eq!(Register::Iodir.addr(Port::A), 0x00);
        assert_eq!(Register::Iodir.addr(Port::B), 0x01);
        assert_eq!(Register::Iocon.addr(Port::A), 0x0A);
        assert_eq!(Register::Intcap.addr(Port::B), 0x11);
        assert_eq!(Register::Olat.addr(Port::B), 0x15);
    }

    #[test]
    fn test_from_addr() {
        assert_eq!(Register::from_addr(0x13), Some((Register::Gpio, Port::B)));
        assert_eq!(Register::from_addr(0x16), None);
    }

    #[test]
    fn test_iocon_bits() {
        let iocon = Iocon {
            mirror: true,
            intpol: true,
            ..Iocon::default()
        };
        assert_eq!(iocon.bits(), 0b0100_0010);
        assert_eq!(Iocon::from_bits(iocon.bits()), iocon);
        assert!(iocon.int_active_high());
        assert!(!Iocon { odr: true, ..iocon }.int_active_high());
    }
}
