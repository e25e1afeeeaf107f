//! Device list snapshot
//!
//! A [`DeviceList`] owns the node references the native layer handed out for
//! one enumeration. It is never refreshed: devices plugged in later do not
//! appear, and devices unplugged later stay listed until the list is dropped.

use crate::backend::UsbBackend;
use crate::context::Session;
use crate::device::Device;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::{debug, warn};
use types::UsbError;

/// Snapshot of the devices attached at one point in time
pub struct DeviceList<B: UsbBackend> {
    session: Arc<Session<B>>,
    nodes: Vec<B::Device>,
    /// Why the snapshot failed, if it did
    error: Option<UsbError>,
}

impl<B: UsbBackend> DeviceList<B> {
    /// Enumerate the attached devices
    ///
    /// A failed enumeration still produces a list: it is empty and
    /// [`valid`](Self::valid) reports false.
    pub(crate) fn snapshot(session: &Arc<Session<B>>) -> Self {
        let (nodes, error) = match session.backend().device_list() {
            Ok(nodes) => {
                debug!("Enumerated {} devices", nodes.len());
                (nodes, None)
            }
            Err(e) => {
                warn!("Failed to enumerate devices: {}", e);
                (Vec::new(), Some(e))
            }
        };

        Self {
            session: Arc::clone(session),
            nodes,
            error,
        }
    }

    /// Whether the enumeration succeeded
    pub fn valid(&self) -> bool {
        self.error.is_none()
    }

    /// The enumeration failure, if any
    pub fn error(&self) -> Option<UsbError> {
        self.error
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The device at `index`, as a new reference
    pub fn get(&self, index: usize) -> Option<Device<B>> {
        self.nodes
            .get(index)
            .map(|node| Device::from_borrowed(&self.session, node))
    }

    /// Iterate over the snapshot in enumeration order
    pub fn iter(&self) -> Devices<'_, B> {
        Devices {
            list: self,
            front: 0,
            back: self.nodes.len(),
        }
    }
}

impl<B: UsbBackend> Drop for DeviceList<B> {
    fn drop(&mut self) {
        let backend = self.session.backend();
        let count = self.nodes.len();
        for node in self.nodes.drain(..) {
            backend.unref_device(node);
        }
        debug!("Released device list ({} devices)", count);
    }
}

impl<B: UsbBackend> fmt::Debug for DeviceList<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceList")
            .field("size", &self.nodes.len())
            .field("error", &self.error)
            .finish()
    }
}

impl<'a, B: UsbBackend> IntoIterator for &'a DeviceList<B> {
    type Item = Device<B>;
    type IntoIter = Devices<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`DeviceList`]
///
/// Bounded by the size recorded when the iterator was created; every step
/// is also checked against the owned array.
pub struct Devices<'a, B: UsbBackend> {
    list: &'a DeviceList<B>,
    front: usize,
    back: usize,
}

impl<B: UsbBackend> Iterator for Devices<'_, B> {
    type Item = Device<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let device = self.list.get(self.front)?;
        self.front += 1;
        Some(device)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back.saturating_sub(self.front);
        (remaining, Some(remaining))
    }
}

impl<B: UsbBackend> DoubleEndedIterator for Devices<'_, B> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let device = self.list.get(self.back - 1)?;
        self.back -= 1;
        Some(device)
    }
}

impl<B: UsbBackend> ExactSizeIterator for Devices<'_, B> {}

impl<B: UsbBackend> FusedIterator for Devices<'_, B> {}

#[cfg(test)]
mod tests {
    use crate::Context;
    use crate::mock::{MockBackend, MockDevice};
    use proptest::prelude::*;
    use types::UsbError;

    fn backend_with(count: u16) -> MockBackend {
        let backend = MockBackend::new();
        for i in 0..count {
            backend.add_device(MockDevice::new(0x1000 + i, 0x2000 + i).at(1, i as u8, i as u8 + 1));
        }
        backend
    }

    #[test]
    fn test_iteration_order_matches_enumeration() {
        let context = Context::with_backend(backend_with(3)).unwrap();
        let vids: Vec<u16> = context.devices().iter().map(|d| d.vid()).collect();
        assert_eq!(vids, vec![0x1000, 0x1001, 0x1002]);

        let reversed: Vec<u16> = context.devices().iter().rev().map(|d| d.vid()).collect();
        assert_eq!(reversed, vec![0x1002, 0x1001, 0x1000]);
    }

    #[test]
    fn test_get_is_bounds_checked() {
        let context = Context::with_backend(backend_with(2)).unwrap();
        assert!(context.devices().get(1).is_some());
        assert!(context.devices().get(2).is_none());
        assert!(context.devices().get(usize::MAX).is_none());
    }

    #[test]
    fn test_iterator_is_fused_and_exact() {
        let context = Context::with_backend(backend_with(2)).unwrap();
        let mut iter = context.devices().iter();
        assert_eq!(iter.len(), 2);
        assert!(iter.next().is_some());
        assert!(iter.next_back().is_some());
        assert_eq!(iter.len(), 0);
        assert!(iter.next().is_none());
        assert!(iter.next_back().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_failed_snapshot() {
        let backend = backend_with(2);
        backend.fail_device_list(UsbError::Other(-11));
        let context = Context::with_backend(backend.clone()).unwrap();

        let list = context.devices();
        assert!(!list.valid());
        assert_eq!(list.error(), Some(UsbError::Other(-11)));
        assert_eq!(list.size(), 0);
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let context = Context::with_backend(MockBackend::new()).unwrap();
        assert!(context.devices().valid());
        assert!(context.devices().is_empty());
    }

    #[test]
    fn test_snapshot_ignores_later_unplug() {
        let backend = backend_with(3);
        let context = Context::with_backend(backend.clone()).unwrap();
        backend.unplug(1);

        assert_eq!(context.devices().size(), 3);
        assert_eq!(context.devices().iter().count(), 3);
    }

    proptest! {
        /// Property: iteration yields exactly size() devices and leaks nothing
        #[test]
        fn prop_iteration_bounded_by_size(count in 0u16..24) {
            let backend = backend_with(count);
            let context = Context::with_backend(backend.clone()).unwrap();

            let list = context.devices();
            prop_assert_eq!(list.size(), count as usize);
            prop_assert_eq!(list.iter().count(), list.size());
            prop_assert_eq!(list.into_iter().len(), list.size());

            drop(context);
            prop_assert_eq!(backend.outstanding_refs(), 0);
        }
    }
}
