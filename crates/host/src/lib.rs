//! Ownership-safe access to the host USB stack
//!
//! This crate wraps a native USB stack (libusb by default) in types whose
//! lifetimes track the native resources they stand for:
//!
//! - [`Context`] initializes the subsystem and takes one device snapshot
//! - [`DeviceList`] owns that snapshot and iterates it with bounds checks
//! - [`Device`] holds a counted reference on one topology node
//! - [`DeviceHandle`] owns an open session and performs transfers
//!
//! Every fallible operation returns [`Result`] with a [`UsbError`] kind; no
//! native failure is dropped on the floor. Transfers are synchronous and block
//! the calling thread.
//!
//! # Example
//!
//! ```no_run
//! use host::{Context, ControlRequest, Timeout};
//!
//! let context = Context::new()?;
//! for device in &context {
//!     println!("{:04x}:{:04x} on bus {}", device.vid(), device.pid(), device.bus());
//! }
//!
//! let mut handle = context.open(0x1234, 0x5678)?;
//! handle.claim(0)?;
//! let mut descriptor = [0u8; 18];
//! let request = ControlRequest::new(0x80, 0x06, 0x0100, 0);
//! handle.control_transfer(&request, &mut descriptor, Timeout::from_millis(1000))?;
//! # Ok::<(), host::UsbError>(())
//! ```

pub mod backend;
pub mod context;
pub mod device;
pub mod handle;
pub mod list;
pub mod mock;

pub use backend::{LibusbBackend, UsbBackend};
pub use context::{Context, SessionOptions};
pub use device::Device;
pub use handle::DeviceHandle;
pub use list::{DeviceList, Devices};

pub use types::{
    ControlRequest, DeviceDescriptor, Direction, EndpointAddress, NativeLogLevel, Recipient,
    RequestType, Result, Speed, Timeout, UsbError,
};
