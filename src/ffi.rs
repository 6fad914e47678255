//! C ABI over [`BleEngine`].
//!
//! Engines are addressed by opaque non-zero handles. Destroyed or unknown
//! handles turn every call into a no-op that returns `false`, `0`, or nothing.

use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_int};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::app::SERVICE_NAME;
use crate::engine::{Backend, BleEngine, EngineConfig};
use crate::model::DeviceInfo;
use crate::telemetry;

/// Opaque engine handle; `0` is never a valid handle.
pub type BleHandle = u64;

const ADDRESS_CAPACITY: usize = 19;
const NAME_CAPACITY: usize = 256;

/// One scan result as laid out for C callers. Strings are NUL-terminated.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BleDeviceInfo {
    pub address: [c_char; ADDRESS_CAPACITY],
    pub name: [c_char; NAME_CAPACITY],
    pub rssi: c_int,
}

impl BleDeviceInfo {
    /// Returns the address as an owned string.
    #[must_use]
    pub fn address(&self) -> String {
        read_c_buffer(&self.address)
    }

    /// Returns the name as an owned string.
    #[must_use]
    pub fn name(&self) -> String {
        read_c_buffer(&self.name)
    }
}

impl Default for BleDeviceInfo {
    fn default() -> Self {
        Self {
            address: [0; ADDRESS_CAPACITY],
            name: [0; NAME_CAPACITY],
            rssi: 0,
        }
    }
}

impl From<&DeviceInfo> for BleDeviceInfo {
    fn from(device: &DeviceInfo) -> Self {
        let mut info = Self::default();
        write_c_buffer(&mut info.address, &device.address().to_string());
        write_c_buffer(&mut info.name, device.name());
        info.rssi = c_int::from(device.rssi());
        info
    }
}

/// Copies `value` into `buffer`, truncating so a NUL terminator always fits.
fn write_c_buffer(buffer: &mut [c_char], value: &str) {
    let capacity = buffer.len().saturating_sub(1);
    for (slot, byte) in buffer.iter_mut().zip(value.bytes().take(capacity)) {
        *slot = byte as c_char;
    }
}

fn read_c_buffer(buffer: &[c_char]) -> String {
    let bytes: Vec<u8> = buffer
        .iter()
        .take_while(|&&value| value != 0)
        .map(|&value| value as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

static ENGINES: LazyLock<Mutex<HashMap<BleHandle, Arc<BleEngine>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn engines() -> MutexGuard<'static, HashMap<BleHandle, Arc<BleEngine>>> {
    ENGINES.lock().unwrap_or_else(PoisonError::into_inner)
}

fn engine(handle: BleHandle) -> Option<Arc<BleEngine>> {
    let engine = engines().get(&handle).cloned();
    if engine.is_none() {
        debug!(handle, "call on unknown engine handle");
    }
    engine
}

fn create(config: EngineConfig) -> BleHandle {
    if let Err(error) = telemetry::initialise_tracing(SERVICE_NAME, false, None) {
        eprintln!("failed to initialise tracing: {error}");
    }

    match BleEngine::new(config) {
        Ok(engine) => {
            let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
            engines().insert(handle, Arc::new(engine));
            handle
        }
        Err(error) => {
            error!(%error, "failed to create BLE engine");
            0
        }
    }
}

/// Borrows a C string, or `None` for null or non-UTF-8 input.
///
/// # Safety
///
/// `value` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
unsafe fn c_str<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    unsafe { CStr::from_ptr(value) }.to_str().ok()
}

/// Creates an engine on the first BLE adapter, or in mock mode if there is
/// none. Returns `0` if the engine cannot start.
#[unsafe(no_mangle)]
pub extern "C" fn ble_create() -> BleHandle {
    create(EngineConfig::default())
}

/// Creates an engine that never touches a radio.
#[unsafe(no_mangle)]
pub extern "C" fn ble_create_mock() -> BleHandle {
    create(EngineConfig::builder().backend(Backend::Mock).build())
}

/// Destroys an engine after its workers drain accepted tasks.
#[unsafe(no_mangle)]
pub extern "C" fn ble_destroy(handle: BleHandle) {
    let removed = engines().remove(&handle);
    // Dropped outside the table lock; the last reference joins the workers.
    drop(removed);
}

/// Scans for `duration_ms` milliseconds, blocking the caller.
#[unsafe(no_mangle)]
pub extern "C" fn ble_scan(handle: BleHandle, duration_ms: c_int) {
    let Some(engine) = engine(handle) else {
        return;
    };
    let duration = Duration::from_millis(u64::try_from(duration_ms).unwrap_or(0));
    if let Err(error) = engine.scan(duration) {
        warn!(%error, "scan failed");
    }
}

/// Copies at most `max_results` scan results into `results` and returns how
/// many were written.
///
/// # Safety
///
/// `results` must be null or valid for writes of `max_results` elements.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ble_get_scan_results(
    handle: BleHandle,
    results: *mut BleDeviceInfo,
    max_results: c_int,
) -> c_int {
    let Ok(max) = usize::try_from(max_results) else {
        return 0;
    };
    if results.is_null() {
        return 0;
    }
    let Some(engine) = engine(handle) else {
        return 0;
    };

    let devices = engine.scan_results(max);
    for (index, device) in devices.iter().enumerate() {
        // SAFETY: `index < max`, and the caller guarantees room for `max` elements.
        unsafe { results.add(index).write(BleDeviceInfo::from(device)) };
    }
    c_int::try_from(devices.len()).unwrap_or(max_results)
}

/// Queues a connect. Returns whether it was accepted.
///
/// # Safety
///
/// `address` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ble_connect(handle: BleHandle, address: *const c_char) -> bool {
    // SAFETY: forwarded caller contract.
    let Some(address) = (unsafe { c_str(address) }) else {
        return false;
    };
    engine(handle).is_some_and(|engine| engine.connect(address).is_ok())
}

/// Queues a disconnect. Returns whether it was accepted.
///
/// # Safety
///
/// `address` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ble_disconnect(handle: BleHandle, address: *const c_char) -> bool {
    // SAFETY: forwarded caller contract.
    let Some(address) = (unsafe { c_str(address) }) else {
        return false;
    };
    engine(handle).is_some_and(|engine| engine.disconnect(address).is_ok())
}

/// Queues a write of `len` bytes. Returns whether it was accepted.
///
/// # Safety
///
/// The string arguments must be null or valid NUL-terminated strings, and
/// `data` must be valid for reads of `len` bytes unless `len` is `0`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ble_write(
    handle: BleHandle,
    address: *const c_char,
    service: *const c_char,
    characteristic: *const c_char,
    data: *const u8,
    len: c_int,
    fast: bool,
) -> bool {
    // SAFETY: forwarded caller contract.
    let (Some(address), Some(service), Some(characteristic)) =
        (unsafe { (c_str(address), c_str(service), c_str(characteristic)) })
    else {
        return false;
    };
    let Ok(len) = usize::try_from(len) else {
        return false;
    };
    let payload: &[u8] = if len == 0 {
        &[]
    } else if data.is_null() {
        return false;
    } else {
        // SAFETY: non-null and valid for `len` bytes per the caller contract.
        unsafe { std::slice::from_raw_parts(data, len) }
    };

    engine(handle).is_some_and(|engine| {
        engine
            .write(address, service, characteristic, payload, fast)
            .is_ok()
    })
}

/// Returns the last-known or synthetic RSSI, or `0` for an unknown handle.
///
/// # Safety
///
/// `address` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ble_get_rssi(handle: BleHandle, address: *const c_char) -> c_int {
    let Some(engine) = engine(handle) else {
        return 0;
    };
    // SAFETY: forwarded caller contract.
    let address = unsafe { c_str(address) }.unwrap_or_default();
    c_int::from(engine.rssi(address))
}

/// Validates an MTU request. Returns whether it was accepted.
///
/// # Safety
///
/// `address` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ble_set_mtu(handle: BleHandle, address: *const c_char, mtu: c_int) -> bool {
    // SAFETY: forwarded caller contract.
    let Some(address) = (unsafe { c_str(address) }) else {
        return false;
    };
    let Ok(mtu) = u32::try_from(mtu) else {
        return false;
    };
    engine(handle).is_some_and(|engine| engine.set_mtu(address, mtu).is_ok())
}
