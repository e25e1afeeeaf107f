//! USB subsystem context
//!
//! [`Context`] is the root of the access layer. Constructing one initializes
//! the native subsystem and takes a single device snapshot; all enumeration
//! and open-by-identity goes through it.
//!
//! Initialization is reference counted: the context, every [`Device`] and
//! every [`DeviceHandle`] share the initialized session, and the native
//! subsystem is shut down only when the last of them is dropped. Dropping the
//! context while devices or handles are still alive is therefore safe.
//!
//! Each `Context` owns its own native session, so several contexts can coexist
//! as far as the native layer allows independent sessions (libusb does).

use crate::backend::{LibusbBackend, UsbBackend};
use crate::device::Device;
use crate::handle::DeviceHandle;
use crate::list::{DeviceList, Devices};
use common::Config;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use types::{NativeLogLevel, Result, Timeout};

/// Settings every handle opened through a context starts with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Enable kernel driver auto-detach on each new handle
    pub auto_detach_kernel_driver: bool,
    /// Initial [`DeviceHandle::default_timeout`]
    pub default_timeout: Timeout,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auto_detach_kernel_driver: config.usb.auto_detach_kernel_driver,
            default_timeout: config.usb.default_timeout(),
        }
    }
}

/// An initialized native subsystem
pub(crate) struct Session<B: UsbBackend> {
    backend: B,
    options: SessionOptions,
}

impl<B: UsbBackend> Session<B> {
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn options(&self) -> SessionOptions {
        self.options
    }
}

impl<B: UsbBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.backend.exit();
        debug!("USB subsystem shut down");
    }
}

/// Root capability for talking to the USB subsystem
pub struct Context<B: UsbBackend = LibusbBackend> {
    // Declared first so the snapshot gives its references back before the
    // context lets go of the session.
    devices: DeviceList<B>,
    session: Arc<Session<B>>,
}

impl Context<LibusbBackend> {
    /// Initialize libusb and enumerate the attached devices
    pub fn new() -> Result<Self> {
        Self::with_backend(LibusbBackend::new())
    }
}

impl<B: UsbBackend> Context<B> {
    /// Initialize a backend and enumerate its devices
    ///
    /// Fails if the native subsystem cannot be initialized. A failed
    /// enumeration does not fail construction; it shows up as
    /// [`valid`](Self::valid) returning false.
    pub fn with_backend(backend: B) -> Result<Self> {
        Self::with_options(backend, SessionOptions::default())
    }

    /// Like [`with_backend`](Self::with_backend), applying the `[usb]` section of a config
    ///
    /// The native log level is in effect before the devices are enumerated.
    pub fn with_config(mut backend: B, config: &Config) -> Result<Self> {
        backend.init()?;
        Self::start(
            backend,
            SessionOptions::from_config(config),
            Some(config.usb.native_log_level),
        )
    }

    /// Like [`with_backend`](Self::with_backend), with explicit handle options
    pub fn with_options(mut backend: B, options: SessionOptions) -> Result<Self> {
        backend.init()?;
        Self::start(backend, options, None)
    }

    /// Take over an initialized backend
    ///
    /// The session owns the backend from here on, so any failure below still
    /// shuts the subsystem down.
    fn start(
        backend: B,
        options: SessionOptions,
        log_level: Option<NativeLogLevel>,
    ) -> Result<Self> {
        let session = Arc::new(Session { backend, options });
        if let Some(level) = log_level {
            session.backend().set_log_level(level)?;
        }

        let devices = DeviceList::snapshot(&session);
        info!("USB context initialized with {} devices", devices.size());
        Ok(Self { devices, session })
    }

    /// Whether the subsystem is up and the device snapshot succeeded
    pub fn valid(&self) -> bool {
        self.devices.valid()
    }

    /// The device snapshot taken at construction
    pub fn devices(&self) -> &DeviceList<B> {
        &self.devices
    }

    pub fn iter(&self) -> Devices<'_, B> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.size()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Open the first attached device with this vendor/product identity
    ///
    /// Does not consult the snapshot, so devices attached after the context
    /// was created can be opened. Fails with `NotFound` if nothing matches.
    pub fn open(&self, vendor_id: u16, product_id: u16) -> Result<DeviceHandle<B>> {
        let handle = self
            .session
            .backend()
            .open_with_ids(vendor_id, product_id)
            .inspect_err(|e| {
                debug!(
                    "Failed to open device {:04x}:{:04x}: {}",
                    vendor_id, product_id, e
                )
            })?;

        debug!("Opened device {:04x}:{:04x}", vendor_id, product_id);
        DeviceHandle::new(Arc::clone(&self.session), handle)
    }

    /// Change the native stack's own log verbosity
    pub fn set_log_level(&self, level: NativeLogLevel) -> Result<()> {
        self.session.backend().set_log_level(level)
    }

    /// Find the first device in the snapshot matching a predicate
    pub fn find(&self, mut predicate: impl FnMut(&Device<B>) -> bool) -> Option<Device<B>> {
        self.iter().find(|device| predicate(device))
    }
}

impl<'a, B: UsbBackend> IntoIterator for &'a Context<B> {
    type Item = Device<B>;
    type IntoIter = Devices<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<B: UsbBackend> fmt::Debug for Context<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("devices", &self.devices)
            .field("options", &self.session.options)
            .finish()
    }
}
