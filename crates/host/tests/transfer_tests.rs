//! Synchronous transfer integration tests
//!
//! Covers short transfers, zero-length buffers, timeout semantics and the
//! error kinds a transfer can report.
//!
//! Run with: `cargo test -p host --test transfer_tests`

use host::mock::{DEFAULT_FILL, MockBackend, MockDevice, MockResponse};
use host::{Context, ControlRequest, DeviceHandle, EndpointAddress, Timeout, UsbError};
use std::time::{Duration, Instant};

const BULK_IN: EndpointAddress = EndpointAddress::input(1);
const BULK_OUT: EndpointAddress = EndpointAddress::output(2);
const INTERRUPT_IN: EndpointAddress = EndpointAddress::input(3);

fn setup() -> (MockBackend, Context<MockBackend>) {
    let backend = MockBackend::new();
    backend.add_device(
        MockDevice::new(0x1234, 0x5678)
            .with_endpoint(0x81, 512)
            .with_endpoint(0x02, 512)
            .with_endpoint(0x83, 8),
    );
    let context = Context::with_backend(backend.clone()).unwrap();
    (backend, context)
}

fn open(context: &Context<MockBackend>) -> DeviceHandle<MockBackend> {
    let mut handle = context.open(0x1234, 0x5678).unwrap();
    handle.claim(0).unwrap();
    handle
}

// ============================================================================
// Timeout semantics
// ============================================================================

#[test]
fn test_indefinite_timeout_waits_for_completion() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.set_transfer_delay(Duration::from_millis(150));

    let request = ControlRequest::new(0x80, 0x00, 0, 0);
    let mut status = [0u8; 2];
    let started = Instant::now();
    let n = handle
        .control_transfer(&request, &mut status, Timeout::from_millis(0))
        .unwrap();

    // Zero means "wait forever", not "poll once"
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(n, 2);
}

#[test]
fn test_explicit_indefinite_timeout() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.set_transfer_delay(Duration::from_millis(50));

    let mut buffer = [0u8; 64];
    let started = Instant::now();
    let n = handle
        .bulk_transfer(BULK_IN, &mut buffer, Timeout::Indefinite)
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(n, 64);
}

#[test]
fn test_elapsed_timeout_is_reported() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.set_transfer_delay(Duration::from_millis(200));

    let mut buffer = [0u8; 8];
    let started = Instant::now();
    let result = handle.interrupt_transfer(INTERRUPT_IN, &mut buffer, Timeout::from_millis(20));

    assert_eq!(result, Err(UsbError::Timeout));
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[test]
fn test_default_timeout_from_handle() {
    let (_backend, context) = setup();
    let mut handle = open(&context);
    assert_eq!(handle.default_timeout(), Timeout::Indefinite);

    handle.set_default_timeout(Timeout::from_millis(10));
    let timeout = handle.default_timeout();
    let mut buffer = [0u8; 4];
    assert_eq!(handle.bulk_transfer(BULK_IN, &mut buffer, timeout), Ok(4));
}

// ============================================================================
// Zero-length and short transfers
// ============================================================================

#[test]
fn test_zero_length_transfers_report_zero() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    let mut empty: [u8; 0] = [];

    let request = ControlRequest::new(0x00, 0x09, 1, 0); // SET_CONFIGURATION
    assert_eq!(
        handle.control_transfer(&request, &mut empty, Timeout::Indefinite),
        Ok(0)
    );
    assert_eq!(
        handle.bulk_transfer(BULK_IN, &mut empty, Timeout::Indefinite),
        Ok(0)
    );
    assert_eq!(
        handle.bulk_transfer(BULK_OUT, &mut empty, Timeout::Indefinite),
        Ok(0)
    );
    assert_eq!(
        handle.interrupt_transfer(INTERRUPT_IN, &mut empty, Timeout::Indefinite),
        Ok(0)
    );
    assert_eq!(backend.written(0x02), vec![Vec::<u8>::new()]);
}

#[test]
fn test_short_bulk_read() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.push_response(0x81, MockResponse::Short(13));

    let mut buffer = [0u8; 512];
    let n = handle
        .bulk_transfer(BULK_IN, &mut buffer, Timeout::from_millis(100))
        .unwrap();
    assert_eq!(n, 13);
    assert!(buffer[..13].iter().all(|b| *b == DEFAULT_FILL));
    assert!(buffer[13..].iter().all(|b| *b == 0));
}

#[test]
fn test_bulk_read_scripted_data() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.push_response(0x81, MockResponse::Data(b"hello".to_vec()));

    let mut buffer = [0u8; 64];
    let n = handle
        .bulk_transfer(BULK_IN, &mut buffer, Timeout::Indefinite)
        .unwrap();
    assert_eq!(&buffer[..n], b"hello");
}

#[test]
fn test_bulk_write_records_payload() {
    let (backend, context) = setup();
    let mut handle = open(&context);

    let mut payload = *b"\x55\x53\x42\x43";
    let n = handle
        .bulk_transfer(BULK_OUT, &mut payload, Timeout::from_millis(100))
        .unwrap();
    assert_eq!(n, 4);
    assert_eq!(backend.written(0x02), vec![b"USBC".to_vec()]);
}

#[test]
fn test_partial_bulk_write() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.push_response(0x02, MockResponse::Short(2));

    let mut payload = [1u8, 2, 3, 4];
    let n = handle
        .bulk_transfer(BULK_OUT, &mut payload, Timeout::Indefinite)
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(backend.written(0x02), vec![vec![1, 2]]);
}

#[test]
fn test_control_write() {
    let (backend, context) = setup();
    let mut handle = open(&context);

    let request = ControlRequest::new(0x21, 0x09, 0x0200, 0); // HID SET_REPORT
    let mut report = [0x01u8, 0x02];
    assert_eq!(
        handle.control_transfer(&request, &mut report, Timeout::from_millis(500)),
        Ok(2)
    );
    assert_eq!(backend.written(0x00), vec![vec![0x01, 0x02]]);
}

// ============================================================================
// Transfer errors
// ============================================================================

#[test]
fn test_stall_then_clear_halt() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.push_response(0x81, MockResponse::Error(UsbError::Pipe));

    let mut buffer = [0u8; 64];
    assert_eq!(
        handle.bulk_transfer(BULK_IN, &mut buffer, Timeout::Indefinite),
        Err(UsbError::Pipe)
    );

    handle.clear_halt(BULK_IN).unwrap();
    assert_eq!(
        handle.bulk_transfer(BULK_IN, &mut buffer, Timeout::Indefinite),
        Ok(64)
    );
}

#[test]
fn test_overflow() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.push_response(0x83, MockResponse::Data(vec![0u8; 16]));

    let mut buffer = [0u8; 8];
    assert_eq!(
        handle.interrupt_transfer(INTERRUPT_IN, &mut buffer, Timeout::Indefinite),
        Err(UsbError::Overflow)
    );
}

#[test]
fn test_control_stall() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.push_control_response(MockResponse::Error(UsbError::Pipe));

    let request = ControlRequest::new(0xC0, 0xFF, 0, 0);
    let mut buffer = [0u8; 4];
    assert_eq!(
        handle.control_transfer(&request, &mut buffer, Timeout::Indefinite),
        Err(UsbError::Pipe)
    );
}

#[test]
fn test_transfer_after_unplug() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.unplug(0);

    let mut buffer = [0u8; 64];
    assert_eq!(
        handle.bulk_transfer(BULK_IN, &mut buffer, Timeout::Indefinite),
        Err(UsbError::NoDevice)
    );
    let request = ControlRequest::new(0x80, 0x00, 0, 0);
    assert_eq!(
        handle.control_transfer(&request, &mut buffer[..2], Timeout::Indefinite),
        Err(UsbError::NoDevice)
    );
}

#[test]
fn test_unknown_endpoint() {
    let (_backend, context) = setup();
    let mut handle = open(&context);

    let mut buffer = [0u8; 4];
    assert_eq!(
        handle.bulk_transfer(EndpointAddress::input(9), &mut buffer, Timeout::Indefinite),
        Err(UsbError::NotFound)
    );
}

#[test]
fn test_native_codes_pass_through() {
    let (backend, context) = setup();
    let mut handle = open(&context);
    backend.push_response(0x81, MockResponse::Error(UsbError::Other(-1)));

    let mut buffer = [0u8; 4];
    let err = handle
        .bulk_transfer(BULK_IN, &mut buffer, Timeout::Indefinite)
        .unwrap_err();
    assert_eq!(err.native_code(), -1);
}
