use std::ffi::CString;
use std::ptr;

use pretty_assertions::assert_eq;

use blectl::ffi::{
    BleDeviceInfo, ble_connect, ble_create_mock, ble_destroy, ble_disconnect,
    ble_get_rssi, ble_get_scan_results, ble_scan, ble_set_mtu, ble_write,
};

fn c_string(value: &str) -> CString {
    CString::new(value).expect("test strings have no interior NUL")
}

#[test]
fn mock_handle_scans_and_fills_caller_buffer() {
    let handle = ble_create_mock();
    assert_ne!(0, handle);

    ble_scan(handle, 0);
    let mut buffer = [BleDeviceInfo::default(); 4];
    // SAFETY: the buffer has room for the requested four entries.
    let count = unsafe { ble_get_scan_results(handle, buffer.as_mut_ptr(), 4) };

    assert_eq!(2, count);
    assert_eq!("11:22:33:44:55:66", buffer[0].address());
    assert_eq!("MockDevice_2", buffer[0].name());
    assert_eq!(-75, buffer[0].rssi);
    assert_eq!("AA:BB:CC:DD:EE:FF", buffer[1].address());
    assert_eq!("MockDevice_1", buffer[1].name());
    ble_destroy(handle);
}

#[test]
fn scan_results_never_exceed_max() {
    let handle = ble_create_mock();
    ble_scan(handle, 0);
    let mut buffer = [BleDeviceInfo::default(); 1];

    // SAFETY: every call passes a buffer valid for `max_results` entries or null.
    unsafe {
        assert_eq!(1, ble_get_scan_results(handle, buffer.as_mut_ptr(), 1));
        assert_eq!(0, ble_get_scan_results(handle, buffer.as_mut_ptr(), 0));
        assert_eq!(0, ble_get_scan_results(handle, buffer.as_mut_ptr(), -3));
        assert_eq!(0, ble_get_scan_results(handle, ptr::null_mut(), 10));
    }
    ble_destroy(handle);
}

#[test]
fn queued_operations_report_acceptance() {
    let handle = ble_create_mock();
    let address = c_string("AA:BB:CC:DD:EE:FF");
    let empty = c_string("");
    let service = c_string("180f");
    let characteristic = c_string("2a19");
    let payload = [0x01_u8, 0x02, 0xAA];

    // SAFETY: all pointers are valid NUL-terminated strings or a live payload.
    unsafe {
        assert!(ble_connect(handle, address.as_ptr()));
        assert!(!ble_connect(handle, empty.as_ptr()));
        assert!(!ble_connect(handle, ptr::null()));
        assert!(ble_write(
            handle,
            address.as_ptr(),
            service.as_ptr(),
            characteristic.as_ptr(),
            payload.as_ptr(),
            3,
            true,
        ));
        assert!(ble_write(
            handle,
            address.as_ptr(),
            service.as_ptr(),
            characteristic.as_ptr(),
            ptr::null(),
            0,
            false,
        ));
        assert!(!ble_write(
            handle,
            address.as_ptr(),
            service.as_ptr(),
            characteristic.as_ptr(),
            ptr::null(),
            4,
            false,
        ));
        assert!(ble_disconnect(handle, address.as_ptr()));
        assert!(ble_set_mtu(handle, address.as_ptr(), 247));
        assert!(!ble_set_mtu(handle, address.as_ptr(), 0));
        assert!(!ble_set_mtu(handle, address.as_ptr(), -1));
    }
    ble_destroy(handle);
}

#[test]
fn rssi_prefers_scanned_value() {
    let handle = ble_create_mock();
    let known = c_string("11:22:33:44:55:66");
    let unknown = c_string("01:02:03:04:05:06");

    // SAFETY: both strings are valid and NUL-terminated.
    unsafe {
        assert_eq!(-55, ble_get_rssi(handle, known.as_ptr()));
        ble_scan(handle, 0);
        assert_eq!(-75, ble_get_rssi(handle, known.as_ptr()));
        assert_eq!(-55, ble_get_rssi(handle, unknown.as_ptr()));
    }
    ble_destroy(handle);
}

#[test]
fn destroyed_handle_is_inert() {
    let handle = ble_create_mock();
    let address = c_string("AA:BB:CC:DD:EE:FF");
    ble_destroy(handle);
    ble_destroy(handle);

    ble_scan(handle, 10);
    let mut buffer = [BleDeviceInfo::default(); 2];
    // SAFETY: valid buffer and string pointers.
    unsafe {
        assert_eq!(0, ble_get_scan_results(handle, buffer.as_mut_ptr(), 2));
        assert!(!ble_connect(handle, address.as_ptr()));
        assert_eq!(0, ble_get_rssi(handle, address.as_ptr()));
    }
}

#[test]
fn handles_are_distinct() {
    let first = ble_create_mock();
    let second = ble_create_mock();

    assert_ne!(first, second);
    ble_destroy(first);
    ble_destroy(second);
}
