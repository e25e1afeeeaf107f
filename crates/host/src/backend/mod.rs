//! Native USB stack boundary
//!
//! [`UsbBackend`] is everything the access layer needs from the host
//! controller stack. [`LibusbBackend`] implements it on top of libusb via
//! `rusb`; [`crate::mock::MockBackend`] implements it in-process for tests.
//!
//! # Reference contract
//!
//! Every `Self::Device` value handed out by a backend (from
//! [`UsbBackend::device_list`], [`UsbBackend::ref_device`],
//! [`UsbBackend::parent`] or [`UsbBackend::handle_device`]) carries exactly one
//! native reference on the device node. The access layer gives each one back
//! through [`UsbBackend::unref_device`]. Likewise every `Self::Handle` is
//! given back through [`UsbBackend::close`].

pub mod libusb;

pub use libusb::LibusbBackend;

use types::{ControlRequest, DeviceDescriptor, NativeLogLevel, Result, Speed, Timeout};

/// Capabilities the access layer consumes from the native USB stack
///
/// Transfer primitives are synchronous: they block the calling thread until
/// completion, failure or timeout. A backend shared between threads must be
/// safe for concurrent use across *distinct* handles; the access layer never
/// issues two calls on the same handle at once.
pub trait UsbBackend: Send + Sync + 'static {
    /// A counted reference on an enumerated device node
    type Device: Send + Sync;
    /// An open session on a device
    type Handle: Send;

    /// Initialize the native subsystem
    fn init(&mut self) -> Result<()>;

    /// Shut the native subsystem down
    fn exit(&mut self);

    fn set_log_level(&self, level: NativeLogLevel) -> Result<()>;

    /// Snapshot the attached devices, one reference per entry
    fn device_list(&self) -> Result<Vec<Self::Device>>;

    /// Take an additional reference on a device node
    fn ref_device(&self, device: &Self::Device) -> Self::Device;

    /// Give a reference back
    fn unref_device(&self, device: Self::Device);

    fn device_descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor>;

    fn bus_number(&self, device: &Self::Device) -> u8;

    fn port_number(&self, device: &Self::Device) -> u8;

    /// Port numbers from the root hub down to the device
    fn port_numbers(&self, device: &Self::Device) -> Result<Vec<u8>>;

    fn address(&self, device: &Self::Device) -> u8;

    fn speed(&self, device: &Self::Device) -> Speed;

    /// The hub the device hangs off, or `None` for a root hub
    fn parent(&self, device: &Self::Device) -> Option<Self::Device>;

    fn max_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize>;

    fn max_iso_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize>;

    fn open(&self, device: &Self::Device) -> Result<Self::Handle>;

    /// Open the first attached device with this identity
    fn open_with_ids(&self, vendor_id: u16, product_id: u16) -> Result<Self::Handle>;

    fn close(&self, handle: Self::Handle);

    /// The device node behind an open session
    fn handle_device(&self, handle: &Self::Handle) -> Self::Device;

    fn claim_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<()>;

    fn release_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<()>;

    fn set_alternate_setting(
        &self,
        handle: &mut Self::Handle,
        interface: u8,
        setting: u8,
    ) -> Result<()>;

    fn active_configuration(&self, handle: &Self::Handle) -> Result<u8>;

    fn set_active_configuration(&self, handle: &mut Self::Handle, config: u8) -> Result<()>;

    fn clear_halt(&self, handle: &mut Self::Handle, endpoint: u8) -> Result<()>;

    fn reset(&self, handle: &mut Self::Handle) -> Result<()>;

    fn kernel_driver_active(&self, handle: &Self::Handle, interface: u8) -> Result<bool>;

    fn detach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8) -> Result<()>;

    fn attach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8) -> Result<()>;

    fn set_auto_detach_kernel_driver(&self, handle: &mut Self::Handle, enable: bool)
    -> Result<()>;

    /// Control transfer; the data stage direction follows bit 7 of the request type
    fn control_transfer(
        &self,
        handle: &mut Self::Handle,
        request: &ControlRequest,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize>;

    /// Bulk transfer; the direction follows bit 7 of the endpoint address
    fn bulk_transfer(
        &self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize>;

    /// Interrupt transfer; the direction follows bit 7 of the endpoint address
    fn interrupt_transfer(
        &self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize>;
}
