//! Resource lifecycle integration tests
//!
//! Drives the access layer against the mock native stack and checks that
//! every device reference, session and subsystem initialization it takes is
//! given back.
//!
//! Run with: `cargo test -p host --test lifecycle_tests`

use host::mock::{MockBackend, MockDevice};
use host::{Context, UsbError};
use std::thread;

fn three_device_backend() -> MockBackend {
    let backend = MockBackend::new();
    let hub = backend.add_device(MockDevice::new(0x1d6b, 0x0002).at(1, 0, 1));
    backend.add_device(
        MockDevice::new(0x046d, 0xc52b)
            .at(1, 1, 2)
            .with_parent(hub)
            .with_interfaces(2),
    );
    backend.add_device(
        MockDevice::new(0x0781, 0x5581)
            .at(1, 2, 3)
            .with_parent(hub)
            .with_endpoint(0x81, 512)
            .with_endpoint(0x02, 512),
    );
    backend
}

// ============================================================================
// Full session scenario
// ============================================================================

#[test]
fn test_open_claim_release_no_leak() {
    let backend = three_device_backend();
    let context = Context::with_backend(backend.clone()).unwrap();
    assert!(context.valid());

    let n = context.devices().size();
    assert_eq!(n, 3);
    assert_eq!(context.iter().count(), n);

    let first = context.iter().next().unwrap();
    let mut handle = first.open().unwrap();

    handle.claim(0).unwrap();
    assert_eq!(handle.claim(0), Err(UsbError::Busy));
    handle.release(0).unwrap();

    drop(handle);
    drop(first);
    drop(context);

    assert_eq!(backend.outstanding_refs(), 0);
    assert_eq!(backend.open_handles(), 0);
    assert_eq!(backend.claimed_interfaces(), 0);
    assert_eq!(backend.ref_underflows(), 0);
    assert!(!backend.is_initialized());
}

#[test]
fn test_every_iterated_device_is_released() {
    let backend = three_device_backend();
    let context = Context::with_backend(backend.clone()).unwrap();

    let devices: Vec<_> = context.iter().collect();
    assert_eq!(backend.outstanding_refs(), 6);

    let parents: Vec<_> = devices.iter().filter_map(|d| d.parent()).collect();
    assert_eq!(parents.len(), 2);
    assert_eq!(backend.device_refs(0), 4);

    drop(parents);
    drop(devices);
    assert_eq!(backend.outstanding_refs(), 3);

    drop(context);
    assert_eq!(backend.outstanding_refs(), 0);
    assert_eq!(backend.ref_underflows(), 0);
}

#[test]
fn test_claimed_interfaces_released_on_drop() {
    let backend = three_device_backend();
    let context = Context::with_backend(backend.clone()).unwrap();

    let mut handle = context.open(0x046d, 0xc52b).unwrap();
    handle.claim(0).unwrap();
    handle.claim(1).unwrap();
    assert_eq!(backend.claimed_interfaces(), 2);

    drop(context);
    drop(handle);
    assert_eq!(backend.claimed_interfaces(), 0);
    assert_eq!(backend.open_handles(), 0);
    assert!(!backend.is_initialized());
}

#[test]
fn test_devices_outliving_context_keep_session() {
    let backend = three_device_backend();
    let context = Context::with_backend(backend.clone()).unwrap();
    let storage = context.find(|d| d.vid() == 0x0781).unwrap();
    drop(context);

    assert!(backend.is_initialized());
    let mut handle = storage.open().unwrap();
    handle.claim(0).unwrap();

    drop(storage);
    assert!(backend.is_initialized());
    drop(handle);
    assert!(!backend.is_initialized());
    assert_eq!(backend.outstanding_refs(), 0);
}

// ============================================================================
// Open-by-identity
// ============================================================================

#[test]
fn test_open_nonexistent_ids_is_not_found() {
    let backend = three_device_backend();
    let context = Context::with_backend(backend.clone()).unwrap();

    let result = context.open(0xffff, 0xffff);
    assert_eq!(result.unwrap_err(), UsbError::NotFound);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_open_ids_skips_unplugged_device() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::new(0x1234, 0x5678).at(1, 1, 2));
    backend.add_device(MockDevice::new(0x1234, 0x5678).at(1, 2, 3));
    let context = Context::with_backend(backend.clone()).unwrap();

    backend.unplug(0);
    let handle = context.open(0x1234, 0x5678).unwrap();
    assert_eq!(handle.device().address(), 3);
}

#[test]
fn test_open_ids_sees_devices_added_after_snapshot() {
    let backend = MockBackend::new();
    let context = Context::with_backend(backend.clone()).unwrap();
    assert!(context.is_empty());

    backend.add_device(MockDevice::new(0xcafe, 0x0001));
    assert!(context.open(0xcafe, 0x0001).is_ok());
    assert!(context.is_empty());
}

// ============================================================================
// Disconnect handling
// ============================================================================

#[test]
fn test_unplugged_device_reports_no_device() {
    let backend = three_device_backend();
    let context = Context::with_backend(backend.clone()).unwrap();
    let mut handle = context.open(0x046d, 0xc52b).unwrap();
    handle.claim(0).unwrap();

    backend.unplug(1);
    assert_eq!(handle.claim(1), Err(UsbError::NoDevice));
    assert_eq!(handle.release(0), Err(UsbError::NoDevice));
    // A failed release leaves the claim tracked for the drop-time cleanup
    assert_eq!(handle.claimed_interfaces(), &[0]);

    drop(handle);
    drop(context);
    assert_eq!(backend.open_handles(), 0);
    assert_eq!(backend.outstanding_refs(), 0);
}

// ============================================================================
// Cross-thread use
// ============================================================================

#[test]
fn test_distinct_handles_on_distinct_threads() {
    let backend = three_device_backend();
    let context = Context::with_backend(backend.clone()).unwrap();

    let workers: Vec<_> = context
        .iter()
        .skip(1)
        .map(|device| {
            thread::spawn(move || {
                let mut handle = device.open().unwrap();
                handle.claim(0).unwrap();
                handle.device().vid()
            })
        })
        .collect();

    let mut vids: Vec<u16> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    vids.sort_unstable();
    assert_eq!(vids, vec![0x046d, 0x0781]);

    drop(context);
    assert_eq!(backend.outstanding_refs(), 0);
    assert_eq!(backend.open_handles(), 0);
}
