//! Open device session
//!
//! A [`DeviceHandle`] exclusively owns one native session. Dropping it releases
//! any interfaces it still has claimed and closes the session.
//!
//! Every operation that touches the session takes `&mut self`, so calls on one
//! handle are strictly ordered and sharing a handle between threads requires
//! an external lock. Distinct handles are independent.
//!
//! All transfers are synchronous: they block the calling thread until the
//! device completes them, an error occurs, or the timeout elapses.
//! [`Timeout::Indefinite`] waits for as long as the device takes.

use crate::backend::UsbBackend;
use crate::context::Session;
use crate::device::Device;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use types::{ControlRequest, EndpointAddress, Result, Timeout, UsbError};

/// Largest data stage a control transfer can carry (wLength)
pub const MAX_CONTROL_LENGTH: usize = u16::MAX as usize;

/// Largest buffer a bulk or interrupt transfer can carry
pub const MAX_TRANSFER_LENGTH: usize = i32::MAX as usize;

/// Exclusive session on a USB device
pub struct DeviceHandle<B: UsbBackend> {
    session: Arc<Session<B>>,
    /// Only `None` while being dropped
    handle: Option<B::Handle>,
    /// Interfaces claimed through this handle
    claimed: Vec<u8>,
    default_timeout: Timeout,
}

impl<B: UsbBackend> DeviceHandle<B> {
    /// Wrap a freshly opened native session
    ///
    /// Applies the session options. If that fails the native session is
    /// closed again before the error is returned.
    pub(crate) fn new(session: Arc<Session<B>>, handle: B::Handle) -> Result<Self> {
        let options = session.options();
        let mut device_handle = Self {
            session,
            handle: Some(handle),
            claimed: Vec::new(),
            default_timeout: options.default_timeout,
        };

        if options.auto_detach_kernel_driver {
            match device_handle.set_kernel_auto_detach(true) {
                Ok(()) => {}
                Err(UsbError::NotSupported) => {
                    debug!("Kernel driver auto-detach not supported on this platform");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(device_handle)
    }

    fn parts(&mut self) -> (&B, &mut B::Handle) {
        let handle = self
            .handle
            .as_mut()
            .expect("device handle already closed");
        (self.session.backend(), handle)
    }

    fn handle(&self) -> &B::Handle {
        self.handle
            .as_ref()
            .expect("device handle already closed")
    }

    /// The device this session belongs to, as a new reference
    pub fn device(&self) -> Device<B> {
        let node = self.session.backend().handle_device(self.handle());
        Device::from_owned(Arc::clone(&self.session), node)
    }

    /// Interfaces currently claimed through this handle
    pub fn claimed_interfaces(&self) -> &[u8] {
        &self.claimed
    }

    /// Timeout configured for this handle by the owning context
    pub fn default_timeout(&self) -> Timeout {
        self.default_timeout
    }

    pub fn set_default_timeout(&mut self, timeout: Timeout) {
        self.default_timeout = timeout;
    }

    /// Claim an interface
    ///
    /// Fails with `Busy` if this handle or another process already holds it,
    /// `NotFound` if the interface does not exist and `NoDevice` if the device
    /// was disconnected.
    pub fn claim(&mut self, interface: u8) -> Result<()> {
        if self.claimed.contains(&interface) {
            return Err(UsbError::Busy);
        }

        let (backend, handle) = self.parts();
        backend.claim_interface(handle, interface)?;
        self.claimed.push(interface);
        debug!("Claimed interface {}", interface);
        Ok(())
    }

    /// Release an interface claimed through this handle
    ///
    /// Releasing an interface this handle never claimed is `NotFound`.
    pub fn release(&mut self, interface: u8) -> Result<()> {
        let Some(position) = self.claimed.iter().position(|i| *i == interface) else {
            return Err(UsbError::NotFound);
        };

        let (backend, handle) = self.parts();
        backend.release_interface(handle, interface)?;
        self.claimed.remove(position);
        debug!("Released interface {}", interface);
        Ok(())
    }

    /// Select an alternate setting on a claimed interface
    pub fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> Result<()> {
        if !self.claimed.contains(&interface) {
            return Err(UsbError::NotFound);
        }

        let (backend, handle) = self.parts();
        backend.set_alternate_setting(handle, interface, setting)
    }

    /// The bConfigurationValue of the active configuration
    pub fn active_configuration(&self) -> Result<u8> {
        self.session.backend().active_configuration(self.handle())
    }

    /// Change the active configuration
    ///
    /// Interfaces must be released first; otherwise this is `Busy`.
    pub fn set_active_configuration(&mut self, config: u8) -> Result<()> {
        if !self.claimed.is_empty() {
            return Err(UsbError::Busy);
        }

        let (backend, handle) = self.parts();
        backend.set_active_configuration(handle, config)
    }

    /// Clear the halt/stall condition of an endpoint
    pub fn clear_halt(&mut self, endpoint: EndpointAddress) -> Result<()> {
        let (backend, handle) = self.parts();
        backend.clear_halt(handle, endpoint.address())
    }

    /// Issue a USB port reset
    ///
    /// This will reset the device and invalidate any claimed interfaces;
    /// callers must claim them again afterwards.
    pub fn reset(&mut self) -> Result<()> {
        let (backend, handle) = self.parts();
        let result = backend.reset(handle);

        match result {
            Ok(()) | Err(UsbError::NotFound) | Err(UsbError::NoDevice) => self.claimed.clear(),
            Err(_) => {}
        }

        if result.is_ok() {
            debug!("Reset device");
        }
        result
    }

    /// Whether a kernel driver is bound to the interface
    ///
    /// `NotSupported` on platforms without kernel drivers.
    pub fn kernel_driver_active(&self, interface: u8) -> Result<bool> {
        self.session
            .backend()
            .kernel_driver_active(self.handle(), interface)
    }

    pub fn detach_kernel_driver(&mut self, interface: u8) -> Result<()> {
        let (backend, handle) = self.parts();
        backend.detach_kernel_driver(handle, interface)?;
        debug!("Detached kernel driver from interface {}", interface);
        Ok(())
    }

    pub fn attach_kernel_driver(&mut self, interface: u8) -> Result<()> {
        let (backend, handle) = self.parts();
        backend.attach_kernel_driver(handle, interface)?;
        debug!("Reattached kernel driver to interface {}", interface);
        Ok(())
    }

    /// Let the native layer detach kernel drivers on claim and reattach on release
    pub fn set_kernel_auto_detach(&mut self, enable: bool) -> Result<()> {
        let (backend, handle) = self.parts();
        backend.set_auto_detach_kernel_driver(handle, enable)
    }

    /// Perform a control transfer
    ///
    /// The data stage direction follows bit 7 of the request type. Returns the
    /// number of bytes transferred, which may be less than `data.len()` when
    /// an IN transfer ends with a short packet.
    pub fn control_transfer(
        &mut self,
        request: &ControlRequest,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        if data.len() > MAX_CONTROL_LENGTH {
            return Err(UsbError::InvalidParameter);
        }

        let (backend, handle) = self.parts();
        let transferred = backend
            .control_transfer(handle, request, data, timeout)
            .inspect_err(|e| debug!("Control transfer failed: {}", e))?;

        debug!(
            "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, {} of {} bytes",
            request.request_type(),
            request.request(),
            request.value(),
            request.index(),
            transferred,
            data.len()
        );
        Ok(transferred)
    }

    /// Perform a bulk transfer
    ///
    /// Reads into `data` for IN endpoints and writes it for OUT endpoints.
    /// Fails with `Timeout`, `Pipe` (stall), `Overflow` or `NoDevice`.
    pub fn bulk_transfer(
        &mut self,
        endpoint: EndpointAddress,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        if data.len() > MAX_TRANSFER_LENGTH {
            return Err(UsbError::InvalidParameter);
        }

        let (backend, handle) = self.parts();
        let transferred = backend
            .bulk_transfer(handle, endpoint.address(), data, timeout)
            .inspect_err(|e| debug!("Bulk transfer on {:#04x} failed: {}", endpoint.address(), e))?;

        debug!(
            "Bulk transfer: endpoint={:#04x}, {} of {} bytes",
            endpoint.address(),
            transferred,
            data.len()
        );
        Ok(transferred)
    }

    /// Perform an interrupt transfer
    ///
    /// Same direction, short-transfer and timeout rules as [`Self::bulk_transfer`].
    pub fn interrupt_transfer(
        &mut self,
        endpoint: EndpointAddress,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        if data.len() > MAX_TRANSFER_LENGTH {
            return Err(UsbError::InvalidParameter);
        }

        let (backend, handle) = self.parts();
        let transferred = backend
            .interrupt_transfer(handle, endpoint.address(), data, timeout)
            .inspect_err(|e| {
                debug!(
                    "Interrupt transfer on {:#04x} failed: {}",
                    endpoint.address(),
                    e
                )
            })?;

        debug!(
            "Interrupt transfer: endpoint={:#04x}, {} of {} bytes",
            endpoint.address(),
            transferred,
            data.len()
        );
        Ok(transferred)
    }
}

impl<B: UsbBackend> Drop for DeviceHandle<B> {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        let backend = self.session.backend();

        for interface in self.claimed.drain(..) {
            match backend.release_interface(&mut handle, interface) {
                Ok(()) => {}
                // The claim went away with the device
                Err(e) if e.is_disconnect() => {
                    debug!("Interface {} released by disconnect", interface);
                }
                Err(e) => warn!("Failed to release interface {}: {}", interface, e),
            }
        }

        backend.close(handle);
        debug!("Closed device handle");
    }
}

impl<B: UsbBackend> fmt::Debug for DeviceHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("claimed", &self.claimed)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
