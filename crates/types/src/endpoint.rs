//! Endpoint addressing

use serde::{Deserialize, Serialize};

/// Direction bit in an endpoint address or bmRequestType
pub const DIRECTION_MASK: u8 = 0x80;

/// Endpoint number bits in an endpoint address
pub const NUMBER_MASK: u8 = 0x7F;

/// Transfer direction, relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

impl Direction {
    /// The direction bit as it appears on the wire
    pub const fn bit(self) -> u8 {
        match self {
            Direction::Out => 0x00,
            Direction::In => DIRECTION_MASK,
        }
    }

    /// Read the direction bit of an address or request type byte
    pub const fn from_bit(byte: u8) -> Self {
        if byte & DIRECTION_MASK != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Endpoint address: a 7-bit number plus a direction
///
/// Only the low seven bits of `number` take part in the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress {
    number: u8,
    direction: Direction,
}

impl EndpointAddress {
    /// Create an endpoint address
    pub const fn new(number: u8, direction: Direction) -> Self {
        Self { number, direction }
    }

    /// Shorthand for an IN endpoint
    pub const fn input(number: u8) -> Self {
        Self::new(number, Direction::In)
    }

    /// Shorthand for an OUT endpoint
    pub const fn output(number: u8) -> Self {
        Self::new(number, Direction::Out)
    }

    pub const fn number(&self) -> u8 {
        self.number
    }

    pub fn set_number(&mut self, number: u8) {
        self.number = number;
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Single-byte wire address: `direction bit | (number & 0x7F)`
    pub const fn address(&self) -> u8 {
        self.direction.bit() | (self.number & NUMBER_MASK)
    }

    /// Decode a wire address
    pub const fn from_address(address: u8) -> Self {
        Self {
            number: address & NUMBER_MASK,
            direction: Direction::from_bit(address),
        }
    }
}

impl From<EndpointAddress> for u8 {
    fn from(endpoint: EndpointAddress) -> u8 {
        endpoint.address()
    }
}

impl From<u8> for EndpointAddress {
    fn from(address: u8) -> Self {
        Self::from_address(address)
    }
}
