//! libusb backend
//!
//! Implements [`UsbBackend`] with `rusb`. rusb already counts native device
//! references on clone/drop, so referencing and unreferencing a node is a
//! clone and a drop here.

use super::UsbBackend;
use rusb::UsbContext;
use tracing::debug;
use types::error::code;
use types::{
    ControlRequest, DeviceDescriptor, Direction, NativeLogLevel, Result, Speed, Timeout, UsbError,
};

/// [`UsbBackend`] over the system libusb
#[derive(Default)]
pub struct LibusbBackend {
    context: Option<rusb::Context>,
}

impl LibusbBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self) -> Result<&rusb::Context> {
        self.context.as_ref().ok_or(UsbError::InvalidParameter)
    }
}

impl UsbBackend for LibusbBackend {
    type Device = rusb::Device<rusb::Context>;
    type Handle = rusb::DeviceHandle<rusb::Context>;

    fn init(&mut self) -> Result<()> {
        if self.context.is_none() {
            self.context = Some(rusb::Context::new().map_err(map_rusb_error)?);
            debug!("libusb context initialized");
        }
        Ok(())
    }

    fn exit(&mut self) {
        if self.context.take().is_some() {
            debug!("libusb context released");
        }
    }

    fn set_log_level(&self, level: NativeLogLevel) -> Result<()> {
        // The clone shares the underlying libusb_context
        let mut context = self.context()?.clone();
        context.set_log_level(map_log_level(level));
        Ok(())
    }

    fn device_list(&self) -> Result<Vec<Self::Device>> {
        let list = self.context()?.devices().map_err(map_rusb_error)?;
        Ok(list.iter().collect())
    }

    fn ref_device(&self, device: &Self::Device) -> Self::Device {
        device.clone()
    }

    fn unref_device(&self, device: Self::Device) {
        drop(device);
    }

    fn device_descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor> {
        let descriptor = device.device_descriptor().map_err(map_rusb_error)?;
        Ok(DeviceDescriptor::new(
            descriptor.vendor_id(),
            descriptor.product_id(),
        ))
    }

    fn bus_number(&self, device: &Self::Device) -> u8 {
        device.bus_number()
    }

    fn port_number(&self, device: &Self::Device) -> u8 {
        device.port_number()
    }

    fn port_numbers(&self, device: &Self::Device) -> Result<Vec<u8>> {
        device.port_numbers().map_err(map_rusb_error)
    }

    fn address(&self, device: &Self::Device) -> u8 {
        device.address()
    }

    fn speed(&self, device: &Self::Device) -> Speed {
        map_speed(device.speed())
    }

    fn parent(&self, device: &Self::Device) -> Option<Self::Device> {
        device.get_parent()
    }

    fn max_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize> {
        // SAFETY: `device` holds a live reference, so the raw pointer is valid
        // for the duration of the call.
        let ret = unsafe { rusb::ffi::libusb_get_max_packet_size(device.as_raw(), endpoint) };
        UsbError::check(ret).map(|size| size as usize)
    }

    fn max_iso_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize> {
        // SAFETY: as above.
        let ret = unsafe { rusb::ffi::libusb_get_max_iso_packet_size(device.as_raw(), endpoint) };
        UsbError::check(ret).map(|size| size as usize)
    }

    fn open(&self, device: &Self::Device) -> Result<Self::Handle> {
        device.open().map_err(map_rusb_error)
    }

    fn open_with_ids(&self, vendor_id: u16, product_id: u16) -> Result<Self::Handle> {
        // libusb_open_device_with_vid_pid reports a failed open as "no match",
        // so match here and keep the open error.
        let devices = self.context()?.devices().map_err(map_rusb_error)?;
        let device = devices
            .iter()
            .find(|device| {
                device.device_descriptor().is_ok_and(|descriptor| {
                    descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id
                })
            })
            .ok_or(UsbError::NotFound)?;
        device.open().map_err(map_rusb_error)
    }

    fn close(&self, handle: Self::Handle) {
        drop(handle);
    }

    fn handle_device(&self, handle: &Self::Handle) -> Self::Device {
        handle.device()
    }

    fn claim_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        handle.claim_interface(interface).map_err(map_rusb_error)
    }

    fn release_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        handle.release_interface(interface).map_err(map_rusb_error)
    }

    fn set_alternate_setting(
        &self,
        handle: &mut Self::Handle,
        interface: u8,
        setting: u8,
    ) -> Result<()> {
        handle
            .set_alternate_setting(interface, setting)
            .map_err(map_rusb_error)
    }

    fn active_configuration(&self, handle: &Self::Handle) -> Result<u8> {
        handle.active_configuration().map_err(map_rusb_error)
    }

    fn set_active_configuration(&self, handle: &mut Self::Handle, config: u8) -> Result<()> {
        handle
            .set_active_configuration(config)
            .map_err(map_rusb_error)
    }

    fn clear_halt(&self, handle: &mut Self::Handle, endpoint: u8) -> Result<()> {
        handle.clear_halt(endpoint).map_err(map_rusb_error)
    }

    fn reset(&self, handle: &mut Self::Handle) -> Result<()> {
        handle.reset().map_err(map_rusb_error)
    }

    fn kernel_driver_active(&self, handle: &Self::Handle, interface: u8) -> Result<bool> {
        handle
            .kernel_driver_active(interface)
            .map_err(map_rusb_error)
    }

    fn detach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        handle
            .detach_kernel_driver(interface)
            .map_err(map_rusb_error)
    }

    fn attach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        handle
            .attach_kernel_driver(interface)
            .map_err(map_rusb_error)
    }

    fn set_auto_detach_kernel_driver(
        &self,
        handle: &mut Self::Handle,
        enable: bool,
    ) -> Result<()> {
        handle
            .set_auto_detach_kernel_driver(enable)
            .map_err(map_rusb_error)
    }

    fn control_transfer(
        &self,
        handle: &mut Self::Handle,
        request: &ControlRequest,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        let timeout = timeout.as_native_duration();
        let result = match request.direction() {
            Direction::In => handle.read_control(
                request.request_type(),
                request.request(),
                request.value(),
                request.index(),
                data,
                timeout,
            ),
            Direction::Out => handle.write_control(
                request.request_type(),
                request.request(),
                request.value(),
                request.index(),
                data,
                timeout,
            ),
        };
        result.map_err(map_rusb_error)
    }

    fn bulk_transfer(
        &self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        let timeout = timeout.as_native_duration();
        let result = match Direction::from_bit(endpoint) {
            Direction::In => handle.read_bulk(endpoint, data, timeout),
            Direction::Out => handle.write_bulk(endpoint, data, timeout),
        };
        result.map_err(map_rusb_error)
    }

    fn interrupt_transfer(
        &self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        let timeout = timeout.as_native_duration();
        let result = match Direction::from_bit(endpoint) {
            Direction::In => handle.read_interrupt(endpoint, data, timeout),
            Direction::Out => handle.write_interrupt(endpoint, data, timeout),
        };
        result.map_err(map_rusb_error)
    }
}

/// Map rusb::Error to UsbError
///
/// Kinds without a dedicated variant keep their libusb status code.
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::InvalidParam => UsbError::InvalidParameter,
        rusb::Error::Access => UsbError::PermissionDenied,
        rusb::Error::NotSupported => UsbError::NotSupported,
        rusb::Error::Io => UsbError::Other(code::IO),
        rusb::Error::Interrupted => UsbError::Other(code::INTERRUPTED),
        rusb::Error::NoMem => UsbError::Other(code::NO_MEM),
        _ => UsbError::Other(code::OTHER),
    }
}

/// Map rusb device speed to Speed
fn map_speed(speed: rusb::Speed) -> Speed {
    match speed {
        rusb::Speed::Low => Speed::Low,
        rusb::Speed::Full => Speed::Full,
        rusb::Speed::High => Speed::High,
        rusb::Speed::Super => Speed::Super,
        rusb::Speed::SuperPlus => Speed::SuperPlus,
        _ => Speed::Unknown,
    }
}

fn map_log_level(level: NativeLogLevel) -> rusb::LogLevel {
    match level {
        NativeLogLevel::None => rusb::LogLevel::None,
        NativeLogLevel::Error => rusb::LogLevel::Error,
        NativeLogLevel::Warning => rusb::LogLevel::Warning,
        NativeLogLevel::Info => rusb::LogLevel::Info,
        NativeLogLevel::Debug => rusb::LogLevel::Debug,
    }
}
