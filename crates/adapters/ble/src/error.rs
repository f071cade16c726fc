//! BLE adapter error types and the btleplug → transport code mapping.

use envsensor_app::ports::TransportError;
use envsensor_domain::error::TransportCode;

/// Errors raised while setting up the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// The platform BLE manager could not be created or queried.
    #[error("BLE manager error")]
    Manager(#[from] btleplug::Error),
}

pub(crate) const PERMISSION_DENIED: u16 = 1;
pub(crate) const DEVICE_NOT_FOUND: u16 = 2;
pub(crate) const NOT_CONNECTED: u16 = 3;
pub(crate) const UNEXPECTED_RESPONSE: u16 = 4;
pub(crate) const NO_SUCH_CHARACTERISTIC: u16 = 5;
pub(crate) const NOT_SUPPORTED: u16 = 6;
pub(crate) const TIMED_OUT: u16 = 7;
pub(crate) const NO_ADAPTER: u16 = 8;
pub(crate) const NO_SUCH_DESCRIPTOR: u16 = 9;
pub(crate) const OTHER: u16 = 255;

/// Stable code for a btleplug error.
///
/// btleplug does not surface the platform's GATT status, so the code names
/// the btleplug variant instead.
pub(crate) fn code_for(err: &btleplug::Error) -> TransportCode {
    let code = match err {
        btleplug::Error::PermissionDenied => PERMISSION_DENIED,
        btleplug::Error::DeviceNotFound => DEVICE_NOT_FOUND,
        btleplug::Error::NotConnected => NOT_CONNECTED,
        btleplug::Error::UnexpectedCallback | btleplug::Error::UnexpectedCharacteristic => {
            UNEXPECTED_RESPONSE
        }
        btleplug::Error::NoSuchCharacteristic => NO_SUCH_CHARACTERISTIC,
        btleplug::Error::NotSupported(_) => NOT_SUPPORTED,
        btleplug::Error::TimedOut(_) => TIMED_OUT,
        _ => OTHER,
    };
    TransportCode::new(code)
}

/// Wrap a btleplug error for propagation across the transport port.
pub(crate) fn transport_error(err: btleplug::Error) -> TransportError {
    TransportError::with_source(code_for(&err), err)
}

/// Failure detected on our side, before btleplug is called.
pub(crate) fn local_error(code: u16) -> TransportError {
    TransportError::new(TransportCode::new(code))
}

pub(crate) fn no_adapter() -> TransportError {
    local_error(NO_ADAPTER)
}
