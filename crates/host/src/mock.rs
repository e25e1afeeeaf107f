//! In-process mock of the native USB stack
//!
//! [`MockBackend`] scripts a device topology and transfer outcomes, and counts
//! every native resource the access layer takes: device references, open
//! sessions and subsystem initialization. Cloning a `MockBackend` shares its
//! state, so a test can hand one clone to a [`crate::Context`] and inspect
//! the counters through another.
//!
//! # Example
//!
//! ```
//! use host::mock::{MockBackend, MockDevice};
//! use host::Context;
//!
//! let backend = MockBackend::new();
//! backend.add_device(MockDevice::new(0x1234, 0x5678));
//!
//! let context = Context::with_backend(backend.clone()).unwrap();
//! assert_eq!(context.len(), 1);
//!
//! drop(context);
//! assert_eq!(backend.outstanding_refs(), 0);
//! ```

use crate::backend::UsbBackend;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;
use types::error::code;
use types::{
    ControlRequest, DeviceDescriptor, Direction, NativeLogLevel, Result, Speed, Timeout, UsbError,
};

/// Byte pattern written into IN buffers when no response is scripted
pub const DEFAULT_FILL: u8 = 0xA5;

/// Scripted outcome of the next transfer on an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// IN: the device sends these bytes. Longer than the buffer means `Overflow`.
    Data(Vec<u8>),
    /// The transfer completes after only this many bytes
    Short(usize),
    /// The transfer fails
    Error(UsbError),
}

/// Description of one device in the mock topology
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub descriptor: DeviceDescriptor,
    pub bus: u8,
    pub port: u8,
    pub port_path: Vec<u8>,
    pub address: u8,
    pub speed: Speed,
    /// Index of the parent hub in the topology
    pub parent: Option<usize>,
    pub interfaces: u8,
    pub configuration: u8,
    /// Endpoint address -> (max packet size, max iso packet size)
    pub endpoints: HashMap<u8, (usize, usize)>,
    pub descriptor_fails: bool,
    pub open_error: Option<UsbError>,
}

impl MockDevice {
    /// A high-speed device with one interface and only the control endpoint
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        let mut endpoints = HashMap::new();
        endpoints.insert(0x00, (64, 0));
        endpoints.insert(0x80, (64, 0));

        Self {
            descriptor: DeviceDescriptor::new(vendor_id, product_id),
            bus: 1,
            port: 1,
            port_path: vec![1],
            address: 1,
            speed: Speed::High,
            parent: None,
            interfaces: 1,
            configuration: 1,
            endpoints,
            descriptor_fails: false,
            open_error: None,
        }
    }

    pub fn at(mut self, bus: u8, port: u8, address: u8) -> Self {
        self.bus = bus;
        self.port = port;
        self.address = address;
        self.port_path = vec![port];
        self
    }

    pub fn with_port_path(mut self, path: Vec<u8>) -> Self {
        self.port_path = path;
        self
    }

    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_interfaces(mut self, interfaces: u8) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn with_endpoint(mut self, address: u8, max_packet: usize) -> Self {
        self.endpoints.insert(address, (max_packet, 0));
        self
    }

    pub fn with_iso_endpoint(mut self, address: u8, max_packet: usize, max_iso: usize) -> Self {
        self.endpoints.insert(address, (max_packet, max_iso));
        self
    }

    /// Descriptor retrieval fails for this device
    pub fn with_broken_descriptor(mut self) -> Self {
        self.descriptor_fails = true;
        self
    }

    pub fn with_open_error(mut self, error: UsbError) -> Self {
        self.open_error = Some(error);
        self
    }
}

/// A counted reference on a mock device node
#[derive(Debug, PartialEq, Eq)]
pub struct MockNode {
    index: usize,
}

impl MockNode {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// An open mock session
#[derive(Debug)]
pub struct MockHandle {
    id: u64,
    device: usize,
}

impl MockHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct HandleState {
    auto_detach: bool,
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    unplugged: HashSet<usize>,
    refs: Vec<usize>,
    ref_underflows: usize,
    handles: HashMap<u64, HandleState>,
    next_handle: u64,
    /// (device, interface) -> claiming handle
    claims: HashMap<(usize, u8), u64>,
    kernel_drivers: HashSet<(usize, u8)>,
    kernel_driver_unsupported: bool,
    responses: HashMap<u8, VecDeque<MockResponse>>,
    control_responses: VecDeque<MockResponse>,
    written: Vec<(u8, Vec<u8>)>,
    transfers: usize,
    transfer_delay: Duration,
    resets: usize,
    init_error: Option<UsbError>,
    list_error: Option<UsbError>,
    initialized: bool,
    init_count: usize,
    exit_count: usize,
    log_level: NativeLogLevel,
    /// Native log level in effect at the last enumeration
    enumerated_at_level: Option<NativeLogLevel>,
}

impl MockState {
    fn device(&self, index: usize) -> Result<&MockDevice> {
        if self.unplugged.contains(&index) {
            return Err(UsbError::NoDevice);
        }
        self.devices.get(index).ok_or(UsbError::NoDevice)
    }

    fn take_ref(&mut self, index: usize) -> MockNode {
        self.refs[index] += 1;
        MockNode { index }
    }

    fn open(&mut self, index: usize) -> Result<MockHandle> {
        if let Some(error) = self.device(index)?.open_error {
            return Err(error);
        }
        self.next_handle += 1;
        let id = self.next_handle;
        self.handles.insert(id, HandleState { auto_detach: false });
        debug!("mock: opened handle {} on device {}", id, index);
        Ok(MockHandle { id, device: index })
    }

    fn check_interface(&self, device: usize, interface: u8) -> Result<()> {
        if interface >= self.device(device)?.interfaces {
            return Err(UsbError::NotFound);
        }
        Ok(())
    }

    fn check_kernel_driver(&self, device: usize, interface: u8) -> Result<()> {
        if self.kernel_driver_unsupported {
            return Err(UsbError::NotSupported);
        }
        self.check_interface(device, interface)
    }
}

/// Mock native USB stack
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a device to the topology, returning its index
    pub fn add_device(&self, device: MockDevice) -> usize {
        let mut state = self.lock();
        state.devices.push(device);
        state.refs.push(0);
        state.devices.len() - 1
    }

    /// Simulate the device being disconnected
    ///
    /// Already-taken snapshots keep their references; new snapshots skip it.
    pub fn unplug(&self, index: usize) {
        self.lock().unplugged.insert(index);
    }

    pub fn fail_init(&self, error: UsbError) {
        self.lock().init_error = Some(error);
    }

    pub fn fail_device_list(&self, error: UsbError) {
        self.lock().list_error = Some(error);
    }

    pub fn set_kernel_driver_supported(&self, supported: bool) {
        self.lock().kernel_driver_unsupported = !supported;
    }

    /// Bind or unbind a kernel driver on an interface
    pub fn set_kernel_driver(&self, device: usize, interface: u8, active: bool) {
        let mut state = self.lock();
        if active {
            state.kernel_drivers.insert((device, interface));
        } else {
            state.kernel_drivers.remove(&(device, interface));
        }
    }

    /// How long every transfer blocks before completing
    pub fn set_transfer_delay(&self, delay: Duration) {
        self.lock().transfer_delay = delay;
    }

    /// Queue the outcome of the next bulk/interrupt transfer on `endpoint`
    pub fn push_response(&self, endpoint: u8, response: MockResponse) {
        self.lock()
            .responses
            .entry(endpoint)
            .or_default()
            .push_back(response);
    }

    /// Queue the outcome of the next control transfer
    pub fn push_control_response(&self, response: MockResponse) {
        self.lock().control_responses.push_back(response);
    }

    /// Outstanding device references across the whole topology
    pub fn outstanding_refs(&self) -> usize {
        self.lock().refs.iter().sum()
    }

    pub fn device_refs(&self, index: usize) -> usize {
        self.lock().refs.get(index).copied().unwrap_or(0)
    }

    /// Number of unreferences that found no reference to give back
    pub fn ref_underflows(&self) -> usize {
        self.lock().ref_underflows
    }

    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn claimed_interfaces(&self) -> usize {
        self.lock().claims.len()
    }

    pub fn auto_detach_handles(&self) -> usize {
        self.lock()
            .handles
            .values()
            .filter(|handle| handle.auto_detach)
            .count()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn init_count(&self) -> usize {
        self.lock().init_count
    }

    pub fn exit_count(&self) -> usize {
        self.lock().exit_count
    }

    pub fn log_level(&self) -> NativeLogLevel {
        self.lock().log_level
    }

    /// Native log level the last device enumeration ran under
    pub fn enumeration_log_level(&self) -> Option<NativeLogLevel> {
        self.lock().enumerated_at_level
    }

    /// Number of transfers that reached the mock
    pub fn transfer_count(&self) -> usize {
        self.lock().transfers
    }

    pub fn reset_count(&self) -> usize {
        self.lock().resets
    }

    /// Payloads written to `endpoint` (0x00 for control OUT), oldest first
    pub fn written(&self, endpoint: u8) -> Vec<Vec<u8>> {
        self.lock()
            .written
            .iter()
            .filter(|(ep, _)| *ep == endpoint)
            .map(|(_, data)| data.clone())
            .collect()
    }

    fn transfer(
        &self,
        handle: &MockHandle,
        endpoint: u8,
        response: Option<MockResponse>,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        let delay = self.lock().transfer_delay;

        // Block outside the lock, the way a synchronous native transfer does
        if !delay.is_zero() {
            match timeout {
                Timeout::After(limit) if limit < delay => {
                    thread::sleep(limit);
                    return Err(UsbError::Timeout);
                }
                _ => thread::sleep(delay),
            }
        }

        let direction = Direction::from_bit(endpoint);
        let transferred = match &response {
            Some(MockResponse::Error(error)) => return Err(*error),
            Some(MockResponse::Data(bytes)) if direction == Direction::In => {
                if bytes.len() > data.len() {
                    return Err(UsbError::Overflow);
                }
                data[..bytes.len()].copy_from_slice(bytes);
                bytes.len()
            }
            Some(MockResponse::Short(count)) => (*count).min(data.len()),
            _ => data.len(),
        };

        match direction {
            Direction::In => {
                // Unscripted IN data gets the fill pattern
                if !matches!(response, Some(MockResponse::Data(_))) {
                    data[..transferred].fill(DEFAULT_FILL);
                }
            }
            Direction::Out => self
                .lock()
                .written
                .push((endpoint, data[..transferred].to_vec())),
        }

        debug!(
            "mock: handle {} endpoint {:#04x} transferred {} bytes",
            handle.id, endpoint, transferred
        );
        Ok(transferred)
    }

    fn endpoint_transfer(
        &self,
        handle: &MockHandle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        let response = {
            let mut state = self.lock();
            let device = state.device(handle.device)?;
            if !device.endpoints.contains_key(&endpoint) {
                return Err(UsbError::NotFound);
            }
            state.transfers += 1;
            state
                .responses
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
        };
        self.transfer(handle, endpoint, response, data, timeout)
    }
}

impl UsbBackend for MockBackend {
    type Device = MockNode;
    type Handle = MockHandle;

    fn init(&mut self) -> Result<()> {
        let mut state = self.lock();
        if let Some(error) = state.init_error {
            return Err(error);
        }
        state.initialized = true;
        state.init_count += 1;
        Ok(())
    }

    fn exit(&mut self) {
        let mut state = self.lock();
        state.initialized = false;
        state.exit_count += 1;
    }

    fn set_log_level(&self, level: NativeLogLevel) -> Result<()> {
        self.lock().log_level = level;
        Ok(())
    }

    fn device_list(&self) -> Result<Vec<Self::Device>> {
        let mut state = self.lock();
        if let Some(error) = state.list_error {
            return Err(error);
        }
        state.enumerated_at_level = Some(state.log_level);
        let present: Vec<usize> = (0..state.devices.len())
            .filter(|index| !state.unplugged.contains(index))
            .collect();
        Ok(present
            .into_iter()
            .map(|index| state.take_ref(index))
            .collect())
    }

    fn ref_device(&self, device: &Self::Device) -> Self::Device {
        self.lock().take_ref(device.index)
    }

    fn unref_device(&self, device: Self::Device) {
        let mut state = self.lock();
        match state.refs[device.index].checked_sub(1) {
            Some(count) => state.refs[device.index] = count,
            None => state.ref_underflows += 1,
        }
    }

    fn device_descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor> {
        let state = self.lock();
        let mock = &state.devices[device.index];
        if mock.descriptor_fails {
            return Err(UsbError::Other(code::IO));
        }
        Ok(mock.descriptor)
    }

    fn bus_number(&self, device: &Self::Device) -> u8 {
        self.lock().devices[device.index].bus
    }

    fn port_number(&self, device: &Self::Device) -> u8 {
        self.lock().devices[device.index].port
    }

    fn port_numbers(&self, device: &Self::Device) -> Result<Vec<u8>> {
        Ok(self.lock().devices[device.index].port_path.clone())
    }

    fn address(&self, device: &Self::Device) -> u8 {
        self.lock().devices[device.index].address
    }

    fn speed(&self, device: &Self::Device) -> Speed {
        self.lock().devices[device.index].speed
    }

    fn parent(&self, device: &Self::Device) -> Option<Self::Device> {
        let mut state = self.lock();
        let parent = state.devices[device.index].parent?;
        Some(state.take_ref(parent))
    }

    fn max_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize> {
        let state = self.lock();
        state.devices[device.index]
            .endpoints
            .get(&endpoint)
            .map(|(size, _)| *size)
            .ok_or(UsbError::NotFound)
    }

    fn max_iso_packet_size(&self, device: &Self::Device, endpoint: u8) -> Result<usize> {
        let state = self.lock();
        state.devices[device.index]
            .endpoints
            .get(&endpoint)
            .map(|(_, iso)| *iso)
            .ok_or(UsbError::NotFound)
    }

    fn open(&self, device: &Self::Device) -> Result<Self::Handle> {
        self.lock().open(device.index)
    }

    fn open_with_ids(&self, vendor_id: u16, product_id: u16) -> Result<Self::Handle> {
        let mut state = self.lock();
        let index = (0..state.devices.len())
            .find(|index| {
                let device = &state.devices[*index];
                !state.unplugged.contains(index)
                    && device.descriptor == DeviceDescriptor::new(vendor_id, product_id)
            })
            .ok_or(UsbError::NotFound)?;
        state.open(index)
    }

    fn close(&self, handle: Self::Handle) {
        let mut state = self.lock();
        state.handles.remove(&handle.id);
        state.claims.retain(|_, owner| *owner != handle.id);
        debug!("mock: closed handle {}", handle.id);
    }

    fn handle_device(&self, handle: &Self::Handle) -> Self::Device {
        self.lock().take_ref(handle.device)
    }

    fn claim_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        let mut state = self.lock();
        state.check_interface(handle.device, interface)?;
        match state.claims.get(&(handle.device, interface)) {
            Some(owner) if *owner != handle.id => Err(UsbError::Busy),
            _ => {
                state.claims.insert((handle.device, interface), handle.id);
                Ok(())
            }
        }
    }

    fn release_interface(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        let mut state = self.lock();
        state.device(handle.device)?;
        match state.claims.get(&(handle.device, interface)) {
            Some(owner) if *owner == handle.id => {
                state.claims.remove(&(handle.device, interface));
                Ok(())
            }
            _ => Err(UsbError::NotFound),
        }
    }

    fn set_alternate_setting(
        &self,
        handle: &mut Self::Handle,
        interface: u8,
        _setting: u8,
    ) -> Result<()> {
        let state = self.lock();
        state.check_interface(handle.device, interface)?;
        match state.claims.get(&(handle.device, interface)) {
            Some(owner) if *owner == handle.id => Ok(()),
            _ => Err(UsbError::NotFound),
        }
    }

    fn active_configuration(&self, handle: &Self::Handle) -> Result<u8> {
        Ok(self.lock().device(handle.device)?.configuration)
    }

    fn set_active_configuration(&self, handle: &mut Self::Handle, config: u8) -> Result<()> {
        let mut state = self.lock();
        state.device(handle.device)?;
        state.devices[handle.device].configuration = config;
        Ok(())
    }

    fn clear_halt(&self, handle: &mut Self::Handle, endpoint: u8) -> Result<()> {
        let state = self.lock();
        if state.device(handle.device)?.endpoints.contains_key(&endpoint) {
            Ok(())
        } else {
            Err(UsbError::NotFound)
        }
    }

    fn reset(&self, handle: &mut Self::Handle) -> Result<()> {
        let mut state = self.lock();
        state.device(handle.device)?;
        state.resets += 1;
        Ok(())
    }

    fn kernel_driver_active(&self, handle: &Self::Handle, interface: u8) -> Result<bool> {
        let state = self.lock();
        state.check_kernel_driver(handle.device, interface)?;
        Ok(state.kernel_drivers.contains(&(handle.device, interface)))
    }

    fn detach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        let mut state = self.lock();
        state.check_kernel_driver(handle.device, interface)?;
        if state.kernel_drivers.remove(&(handle.device, interface)) {
            Ok(())
        } else {
            Err(UsbError::NotFound)
        }
    }

    fn attach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8) -> Result<()> {
        let mut state = self.lock();
        state.check_kernel_driver(handle.device, interface)?;
        if state.claims.contains_key(&(handle.device, interface)) {
            return Err(UsbError::Busy);
        }
        if state.kernel_drivers.insert((handle.device, interface)) {
            Ok(())
        } else {
            Err(UsbError::Busy)
        }
    }

    fn set_auto_detach_kernel_driver(
        &self,
        handle: &mut Self::Handle,
        enable: bool,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.kernel_driver_unsupported {
            return Err(UsbError::NotSupported);
        }
        if let Some(entry) = state.handles.get_mut(&handle.id) {
            entry.auto_detach = enable;
        }
        Ok(())
    }

    fn control_transfer(
        &self,
        handle: &mut Self::Handle,
        request: &ControlRequest,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        let response = {
            let mut state = self.lock();
            state.device(handle.device)?;
            state.transfers += 1;
            state.control_responses.pop_front()
        };
        let endpoint = request.direction().bit();
        self.transfer(handle, endpoint, response, data, timeout)
    }

    fn bulk_transfer(
        &self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        self.endpoint_transfer(handle, endpoint, data, timeout)
    }

    fn interrupt_transfer(
        &self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize> {
        self.endpoint_transfer(handle, endpoint, data, timeout)
    }
}
