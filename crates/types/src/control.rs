//! Control transfer setup header

use crate::endpoint::Direction;
use serde::{Deserialize, Serialize};

/// Request type field of bmRequestType (bits 5..6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

impl RequestType {
    const fn bits(self) -> u8 {
        match self {
            RequestType::Standard => 0x00,
            RequestType::Class => 0x20,
            RequestType::Vendor => 0x40,
            RequestType::Reserved => 0x60,
        }
    }
}

/// Recipient field of bmRequestType (bits 0..4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

impl Recipient {
    const fn bits(self) -> u8 {
        match self {
            Recipient::Device => 0x00,
            Recipient::Interface => 0x01,
            Recipient::Endpoint => 0x02,
            Recipient::Other => 0x03,
        }
    }
}

/// The four header fields of a control transfer
///
/// Pure data; consumed by `DeviceHandle::control_transfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlRequest {
    request_type: u8,
    request: u8,
    value: u16,
    index: u16,
}

impl ControlRequest {
    pub const fn new(request_type: u8, request: u8, value: u16, index: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
        }
    }

    /// Build a request from the decomposed bmRequestType fields
    pub const fn build(
        direction: Direction,
        kind: RequestType,
        recipient: Recipient,
        request: u8,
        value: u16,
        index: u16,
    ) -> Self {
        Self::new(
            direction.bit() | kind.bits() | recipient.bits(),
            request,
            value,
            index,
        )
    }

    pub const fn request_type(&self) -> u8 {
        self.request_type
    }

    pub fn set_request_type(&mut self, request_type: u8) {
        self.request_type = request_type;
    }

    pub const fn request(&self) -> u8 {
        self.request
    }

    pub fn set_request(&mut self, request: u8) {
        self.request = request;
    }

    pub const fn value(&self) -> u16 {
        self.value
    }

    pub fn set_value(&mut self, value: u16) {
        self.value = value;
    }

    pub const fn index(&self) -> u16 {
        self.index
    }

    pub fn set_index(&mut self, index: u16) {
        self.index = index;
    }

    /// Data stage direction (bit 7 of bmRequestType)
    pub const fn direction(&self) -> Direction {
        Direction::from_bit(self.request_type)
    }

    pub const fn kind(&self) -> RequestType {
        match self.request_type & 0x60 {
            0x00 => RequestType::Standard,
            0x20 => RequestType::Class,
            0x40 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub const fn recipient(&self) -> Recipient {
        match self.request_type & 0x1F {
            0x00 => Recipient::Device,
            0x01 => Recipient::Interface,
            0x02 => Recipient::Endpoint,
            _ => Recipient::Other,
        }
    }
}
