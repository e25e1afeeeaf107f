//! USB error taxonomy
//!
//! Every fallible operation of the access layer reports one of these kinds.
//! The native collaborator speaks in libusb status codes; [`UsbError::from_native_code`]
//! folds them into kinds and [`UsbError::native_code`] goes back the other way.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// libusb status codes understood by the access layer
pub mod code {
    pub const SUCCESS: i32 = 0;
    pub const IO: i32 = -1;
    pub const INVALID_PARAM: i32 = -2;
    pub const ACCESS: i32 = -3;
    pub const NO_DEVICE: i32 = -4;
    pub const NOT_FOUND: i32 = -5;
    pub const BUSY: i32 = -6;
    pub const TIMEOUT: i32 = -7;
    pub const OVERFLOW: i32 = -8;
    pub const PIPE: i32 = -9;
    pub const INTERRUPTED: i32 = -10;
    pub const NO_MEM: i32 = -11;
    pub const NOT_SUPPORTED: i32 = -12;
    pub const OTHER: i32 = -99;
}

/// Errors reported by the USB access layer
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UsbError {
    /// No matching device, interface or endpoint
    #[error("Entity not found")]
    NotFound,

    /// Insufficient permissions to open or modify the device
    #[error("Access denied (insufficient permissions)")]
    PermissionDenied,

    /// Interface or device already claimed or opened
    #[error("Resource busy")]
    Busy,

    /// Device was disconnected
    #[error("No such device (it may have been disconnected)")]
    NoDevice,

    /// Operation did not complete before the timeout elapsed
    #[error("Operation timed out")]
    Timeout,

    /// Endpoint stalled
    #[error("Pipe error (endpoint stalled)")]
    Pipe,

    /// Device sent more data than the buffer could hold
    #[error("Overflow: device sent more data than requested")]
    Overflow,

    /// Platform lacks the requested capability
    #[error("Operation not supported on this platform")]
    NotSupported,

    /// Argument rejected before or by the native layer
    #[error("Invalid parameter")]
    InvalidParameter,

    /// Native status that has no dedicated kind
    #[error("Native USB error (code {0})")]
    Other(i32),
}

impl UsbError {
    /// Map a negative libusb status code to an error kind
    ///
    /// Codes without a dedicated kind (I/O, interrupted, out of memory and
    /// anything unrecognized) are preserved as [`UsbError::Other`].
    pub fn from_native_code(code: i32) -> Self {
        match code {
            code::INVALID_PARAM => UsbError::InvalidParameter,
            code::ACCESS => UsbError::PermissionDenied,
            code::NO_DEVICE => UsbError::NoDevice,
            code::NOT_FOUND => UsbError::NotFound,
            code::BUSY => UsbError::Busy,
            code::TIMEOUT => UsbError::Timeout,
            code::OVERFLOW => UsbError::Overflow,
            code::PIPE => UsbError::Pipe,
            code::NOT_SUPPORTED => UsbError::NotSupported,
            other => UsbError::Other(other),
        }
    }

    /// Convert a libusb return value into a result
    ///
    /// Non-negative values are successes and are passed through.
    pub fn check(ret: i32) -> Result<i32> {
        if ret < 0 {
            Err(Self::from_native_code(ret))
        } else {
            Ok(ret)
        }
    }

    /// The libusb status code for this kind
    pub fn native_code(&self) -> i32 {
        match self {
            UsbError::NotFound => code::NOT_FOUND,
            UsbError::PermissionDenied => code::ACCESS,
            UsbError::Busy => code::BUSY,
            UsbError::NoDevice => code::NO_DEVICE,
            UsbError::Timeout => code::TIMEOUT,
            UsbError::Pipe => code::PIPE,
            UsbError::Overflow => code::OVERFLOW,
            UsbError::NotSupported => code::NOT_SUPPORTED,
            UsbError::InvalidParameter => code::INVALID_PARAM,
            UsbError::Other(code) => *code,
        }
    }

    /// Whether the device is gone and every further call on it will fail
    pub fn is_disconnect(&self) -> bool {
        matches!(self, UsbError::NoDevice)
    }
}

/// Type alias for USB results
pub type Result<T> = std::result::Result<T, UsbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_native_code() {
        assert_eq!(UsbError::from_native_code(-5), UsbError::NotFound);
        assert_eq!(UsbError::from_native_code(-3), UsbError::PermissionDenied);
        assert_eq!(UsbError::from_native_code(-6), UsbError::Busy);
        assert_eq!(UsbError::from_native_code(-4), UsbError::NoDevice);
        assert_eq!(UsbError::from_native_code(-7), UsbError::Timeout);
        assert_eq!(UsbError::from_native_code(-9), UsbError::Pipe);
        assert_eq!(UsbError::from_native_code(-8), UsbError::Overflow);
        assert_eq!(UsbError::from_native_code(-12), UsbError::NotSupported);
        assert_eq!(UsbError::from_native_code(-2), UsbError::InvalidParameter);
    }

    #[test]
    fn test_unmapped_codes_are_preserved() {
        assert_eq!(UsbError::from_native_code(-1), UsbError::Other(-1));
        assert_eq!(UsbError::from_native_code(-10), UsbError::Other(-10));
        assert_eq!(UsbError::from_native_code(-99), UsbError::Other(-99));
        assert_eq!(UsbError::from_native_code(-42), UsbError::Other(-42));
    }

    #[test]
    fn test_native_code_inverts_mapping() {
        for code in [-1, -2, -3, -4, -5, -6, -7, -8, -9, -10, -11, -12, -99] {
            assert_eq!(UsbError::from_native_code(code).native_code(), code);
        }
    }

    #[test]
    fn test_check() {
        assert_eq!(UsbError::check(0), Ok(0));
        assert_eq!(UsbError::check(64), Ok(64));
        assert_eq!(UsbError::check(-7), Err(UsbError::Timeout));
    }

    #[test]
    fn test_error_display() {
        let msg = format!("{}", UsbError::Other(-99));
        assert!(msg.contains("-99"));
        assert!(format!("{}", UsbError::Pipe).contains("stalled"));
    }
}
