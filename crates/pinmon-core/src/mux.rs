//! TCA9548A-style I2C multiplexer
//!
//! The expander may sit behind an eight-channel switch. Selecting a channel is
//! a single control byte with the channel's bit set; the selection stays in
//! effect until it is changed, so it is done once before talking to the chip.

use embedded_hal::i2c::I2c;
use log::debug;
use thiserror_no_std::Error;

/// Channels on one multiplexer
pub const MUX_CHANNELS: u8 = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MuxError<E> {
    #[error("I2C error: {0:?}")]
    I2c(E),
    #[error("Multiplexer channel {channel} out of range (expected 0 to 7)")]
    InvalidChannel { channel: u8 },
}

/// Route the bus through `channel` of the multiplexer at `address`
pub fn select_channel<I2C: I2c>(
    i2c: &mut I2C,
    address: u8,
    channel: u8,
) -> Result<(), MuxError<I2C::Error>> {
    if channel >= MUX_CHANNELS {
        return Err(MuxError::InvalidChannel { channel });
    }
    debug!("Mux@{:#04x}: selecting channel {}", address, channel);
    i2c.write(address, &[1 << channel]).map_err(MuxError::I2c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Nack;

    impl embedded_hal::i2c::Error for Nack {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Records writes, NACKs every address but `present`
    struct RecordingBus {
        present: u8,
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl ErrorType for RecordingBus {
        type Error = Nack;
    }

    impl I2c for RecordingBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != self.present {
                return Err(Nack);
            }
            for operation in operations {
                if let Operation::Write(bytes) = operation {
                    self.writes.push((address, bytes.to_vec()));
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_select_writes_channel_bit() {
        let mut bus = RecordingBus {
            present: 0x70,
            writes: Vec::new(),
        };
        select_channel(&mut bus, 0x70, 0).unwrap();
        select_channel(&mut bus, 0x70, 7).unwrap();
        assert_eq!(bus.writes, [(0x70, vec![0x01]), (0x70, vec![0x80])]);
    }

    #[test]
    fn test_channel_out_of_range() {
        let mut bus = RecordingBus {
            present: 0x70,
            writes: Vec::new(),
        };
        assert_eq!(
            select_channel(&mut bus, 0x70, 8),
            Err(MuxError::InvalidChannel { channel: 8 })
        );
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn test_missing_mux_reports_bus_error() {
        let mut bus = RecordingBus {
            present: 0x70,
            writes: Vec::new(),
        };
        assert_eq!(select_channel(&mut bus, 0x71, 1), Err(MuxError::I2c(Nack)));
    }
}
