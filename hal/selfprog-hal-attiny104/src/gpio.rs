//! GPIO for the ATtiny104
//!
//! Only what the value indicator needs: parse a pin name from the build
//! configuration and drive it as a push-pull output.

use crate::regs::{DDRA, DDRB, PORTA, PORTB};

/// I/O port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    /// PA0..PA7
    A,
    /// PB0..PB3
    B,
}

impl Port {
    /// Number of pins bonded out on this port
    pub const fn pin_count(self) -> u8 {
        match self {
            Port::A => 8,
            Port::B => 4,
        }
    }

    /// Data direction register
    pub const fn ddr(self) -> u16 {
        match self {
            Port::A => DDRA,
            Port::B => DDRB,
        }
    }

    /// Output data register
    pub const fn port(self) -> u16 {
        match self {
            Port::A => PORTA,
            Port::B => PORTB,
        }
    }
}

/// A parsed pin reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId {
    pub port: Port,
    pub pin: u8,
    /// Active-low when written as `!PA0`
    pub inverted: bool,
}

impl PinId {
    /// Bit mask of this pin in its port registers
    pub const fn mask(&self) -> u8 {
        1 << self.pin
    }
}

/// Parse a pin string from config
///
/// Supports formats:
/// - "PA0" -> (Port A, Pin 0, active-high)
/// - "!PB1" -> (Port B, Pin 1, inverted/active-low)
pub fn parse_pin_string(s: &str) -> Option<PinId> {
    let s = s.trim();

    let (s, inverted) = match s.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (s, false),
    };

    let bytes = s.as_bytes();
    if bytes.len() != 3 || !bytes[0].eq_ignore_ascii_case(&b'P') {
        return None;
    }

    let port = match bytes[1].to_ascii_uppercase() {
        b'A' => Port::A,
        b'B' => Port::B,
        _ => return None,
    };

    let pin = match bytes[2] {
        d @ b'0'..=b'9' => d - b'0',
        _ => return None,
    };
    if pin >= port.pin_count() {
        return None;
    }

    Some(PinId {
        port,
        pin,
        inverted,
    })
}

#[cfg(target_arch = "avr")]
pub use output::PortPin;

#[cfg(target_arch = "avr")]
mod output {
    use core::convert::Infallible;

    use embedded_hal::digital::{ErrorType, OutputPin};

    use super::PinId;
    use crate::regs;

    /// Push-pull output on a port pin
    ///
    /// Drives the electrical level only; [`PinId::inverted`] is left for the
    /// consumer to interpret.
    pub struct PortPin {
        id: PinId,
    }

    impl PortPin {
        /// Configure `id` as an output, driven low
        pub fn new(id: PinId) -> Self {
            critical_section::with(|_| {
                // SAFETY: read-modify-write of one bit inside a critical section
                unsafe {
                    regs::modify(id.port.port(), |v| v & !id.mask());
                    regs::modify(id.port.ddr(), |v| v | id.mask());
                }
            });
            Self { id }
        }

        /// Pin this output drives
        pub fn id(&self) -> PinId {
            self.id
        }
    }

    impl ErrorType for PortPin {
        type Error = Infallible;
    }

    impl OutputPin for PortPin {
        fn set_high(&mut self) -> Result<(), Self::Error> {
            let (port, mask) = (self.id.port.port(), self.id.mask());
            critical_section::with(|_| unsafe { regs::modify(port, |v| v | mask) });
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), Self::Error> {
            let (port, mask) = (self.id.port.port(), self.id.mask());
            critical_section::with(|_| unsafe { regs::modify(port, |v| v & !mask) });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pin_string() {
        assert_eq!(
            parse_pin_string("PA0"),
            Some(PinId {
                port: Port::A,
                pin: 0,
                inverted: false
            })
        );
        assert_eq!(
            parse_pin_string(" !pb2 "),
            Some(PinId {
                port: Port::B,
                pin: 2,
                inverted: true
            })
        );
    }

    #[test]
    fn test_parse_pin_string_rejects() {
        assert_eq!(parse_pin_string("PB4"), None); // port B has 4 pins
        assert_eq!(parse_pin_string("PC0"), None);
        assert_eq!(parse_pin_string("PA10"), None);
        assert_eq!(parse_pin_string("A0"), None);
        assert_eq!(parse_pin_string(""), None);
    }

    #[test]
    fn test_mask_and_registers() {
        let id = parse_pin_string("PA5").unwrap();
        assert_eq!(id.mask(), 0b0010_0000);
        assert_eq!(id.port.ddr(), DDRA);
        assert_eq!(Port::B.port(), PORTB);
    }
}
