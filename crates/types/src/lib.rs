//! Value types for the usb-host access layer
//!
//! This crate defines the plain data the rest of the workspace passes around:
//! endpoint addresses, control request headers, device identity and speed,
//! transfer timeouts, and the error taxonomy every fallible operation reports.
//! Nothing here owns a native resource.
//!
//! # Example
//!
//! ```
//! use types::{ControlRequest, Direction, EndpointAddress, Timeout};
//!
//! let ep = EndpointAddress::new(1, Direction::In);
//! assert_eq!(ep.address(), 0x81);
//!
//! let get_descriptor = ControlRequest::new(0x80, 0x06, 0x0100, 0);
//! assert_eq!(get_descriptor.direction(), Direction::In);
//!
//! assert_eq!(Timeout::from_millis(0), Timeout::Indefinite);
//! ```

pub mod control;
pub mod endpoint;
pub mod error;
pub mod types;

pub use control::{ControlRequest, Recipient, RequestType};
pub use endpoint::{Direction, EndpointAddress};
pub use error::{Result, UsbError};
pub use types::{DeviceDescriptor, NativeLogLevel, Speed, Timeout};
