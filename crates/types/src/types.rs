//! Device identity, speed and timing types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vendor/product identity read from the device descriptor
///
/// A zeroed descriptor stands in for one that could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
}

impl DeviceDescriptor {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Whether this descriptor is the zeroed placeholder
    pub fn is_zeroed(&self) -> bool {
        *self == Self::default()
    }
}

/// Negotiated signaling rate of a device
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Speed {
    /// The native layer does not know
    #[default]
    Unknown,
    /// Low speed - 1.5 Mbps (USB 1.0)
    Low,
    /// Full speed - 12 Mbps (USB 1.1)
    Full,
    /// High speed - 480 Mbps (USB 2.0)
    High,
    /// SuperSpeed - 5 Gbps (USB 3.0)
    Super,
    /// SuperSpeed+ - 10 Gbps (USB 3.1)
    SuperPlus,
}

/// How long a synchronous transfer may block
///
/// libusb treats a zero timeout as "wait forever". That convention is kept,
/// but it is spelled [`Timeout::Indefinite`] rather than overloading zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeout {
    /// Block until the transfer completes or fails
    #[default]
    Indefinite,
    /// Give up with `UsbError::Timeout` once this much time has elapsed
    After(Duration),
}

impl Timeout {
    /// Interpret a millisecond count; `0` means [`Timeout::Indefinite`]
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Timeout::Indefinite
        } else {
            Timeout::After(Duration::from_millis(ms))
        }
    }

    /// Milliseconds as passed to libusb, where `0` means indefinite
    ///
    /// Sub-millisecond limits round up to 1 so they never turn into an
    /// indefinite wait. Oversized limits saturate.
    pub fn as_native_millis(&self) -> u32 {
        match self {
            Timeout::Indefinite => 0,
            Timeout::After(duration) => {
                let ms = duration.as_millis().max(1);
                u32::try_from(ms).unwrap_or(u32::MAX)
            }
        }
    }

    /// Duration as passed to rusb, where zero means indefinite
    pub fn as_native_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.as_native_millis()))
    }

    pub fn is_indefinite(&self) -> bool {
        matches!(self, Timeout::Indefinite)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

/// Verbosity of the native USB stack's own logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeLogLevel {
    #[default]
    None,
    Error,
    Warning,
    Info,
    Debug,
}
