//! Enumerated USB device
//!
//! A [`Device`] is one node of the USB topology as seen when it was
//! enumerated. It holds a counted native reference on that node: creating or
//! cloning a `Device` takes a reference, dropping it gives one back. The
//! vendor/product identity is read once and cached; topology queries go to
//! the native layer every time.

use crate::backend::UsbBackend;
use crate::context::Session;
use crate::handle::DeviceHandle;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use types::{DeviceDescriptor, EndpointAddress, Result, Speed};

/// USB device wrapper with cached identity
pub struct Device<B: UsbBackend> {
    session: Arc<Session<B>>,
    /// Only `None` while being dropped
    node: Option<B::Device>,
    /// Cached device descriptor (zeroed if it could not be read)
    descriptor: DeviceDescriptor,
}

impl<B: UsbBackend> Device<B> {
    /// Wrap a node reference the caller already owns
    ///
    /// Reads and caches the device descriptor. A failed read is logged and
    /// leaves the cached identity zeroed.
    pub(crate) fn from_owned(session: Arc<Session<B>>, node: B::Device) -> Self {
        let descriptor = match session.backend().device_descriptor(&node) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Failed to read device descriptor: {}", e);
                DeviceDescriptor::default()
            }
        };

        Self {
            session,
            node: Some(node),
            descriptor,
        }
    }

    /// Take a new reference on a node owned elsewhere
    pub(crate) fn from_borrowed(session: &Arc<Session<B>>, node: &B::Device) -> Self {
        let node = session.backend().ref_device(node);
        Self::from_owned(Arc::clone(session), node)
    }

    fn node(&self) -> &B::Device {
        self.node
            .as_ref()
            .expect("device reference already released")
    }

    fn backend(&self) -> &B {
        self.session.backend()
    }

    /// Whether this value still holds its node reference
    ///
    /// Always true for a `Device` obtained through the public API.
    pub fn valid(&self) -> bool {
        self.node.is_some()
    }

    /// Get the bus number
    pub fn bus(&self) -> u8 {
        self.backend().bus_number(self.node())
    }

    /// Get the port number on the parent hub
    pub fn port(&self) -> u8 {
        self.backend().port_number(self.node())
    }

    /// Port numbers from the root hub down to this device
    pub fn port_numbers(&self) -> Result<Vec<u8>> {
        self.backend().port_numbers(self.node())
    }

    /// Get the device address on its bus
    pub fn address(&self) -> u8 {
        self.backend().address(self.node())
    }

    pub fn speed(&self) -> Speed {
        self.backend().speed(self.node())
    }

    /// The hub this device is attached to
    ///
    /// Returns `None` for a root hub. The parent is a new `Device` holding
    /// its own reference.
    pub fn parent(&self) -> Option<Device<B>> {
        let node = self.backend().parent(self.node())?;
        Some(Device::from_owned(Arc::clone(&self.session), node))
    }

    /// Maximum packet size of an endpoint in the active configuration
    pub fn max_packet_size(&self, endpoint: EndpointAddress) -> Result<usize> {
        self.backend()
            .max_packet_size(self.node(), endpoint.address())
    }

    /// Maximum isochronous packet size, accounting for high-bandwidth multipliers
    pub fn max_iso_packet_size(&self, endpoint: EndpointAddress) -> Result<usize> {
        self.backend()
            .max_iso_packet_size(self.node(), endpoint.address())
    }

    /// Cached vendor ID (zero if the descriptor could not be read)
    pub fn vid(&self) -> u16 {
        self.descriptor.vendor_id
    }

    /// Cached product ID (zero if the descriptor could not be read)
    pub fn pid(&self) -> u16 {
        self.descriptor.product_id
    }

    pub fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    /// Open a session on the device
    ///
    /// Fails with `Busy`, `PermissionDenied` or `NoDevice` as reported by the
    /// native layer. The handle does not keep this `Device` alive.
    pub fn open(&self) -> Result<DeviceHandle<B>> {
        let handle = self.backend().open(self.node()).map_err(|e| {
            debug!(
                "Failed to open device {:04x}:{:04x}: {}",
                self.vid(),
                self.pid(),
                e
            );
            e
        })?;

        debug!("Opened device {:04x}:{:04x}", self.vid(), self.pid());
        DeviceHandle::new(Arc::clone(&self.session), handle)
    }
}

impl<B: UsbBackend> Clone for Device<B> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            node: Some(self.backend().ref_device(self.node())),
            descriptor: self.descriptor,
        }
    }
}

impl<B: UsbBackend> Drop for Device<B> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            self.session.backend().unref_device(node);
        }
    }
}

impl<B: UsbBackend> fmt::Debug for Device<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("bus", &self.bus())
            .field("address", &self.address())
            .field("vendor_id", &format_args!("{:#06x}", self.vid()))
            .field("product_id", &format_args!("{:#06x}", self.pid()))
            .finish()
    }
}
