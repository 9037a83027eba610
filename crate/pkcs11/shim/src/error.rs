//! Copyright 2024 Cosmian Tech SAS

use cryptoki_shim_sys::{
    CK_RV, CKR_ARGUMENTS_BAD, CKR_ATTRIBUTE_SENSITIVE, CKR_ATTRIBUTE_TYPE_INVALID,
    CKR_ATTRIBUTE_VALUE_INVALID, CKR_BUFFER_TOO_SMALL, CKR_CRYPTOKI_ALREADY_INITIALIZED,
    CKR_CRYPTOKI_NOT_INITIALIZED, CKR_DEVICE_ERROR, CKR_FUNCTION_FAILED,
    CKR_FUNCTION_NOT_SUPPORTED, CKR_GENERAL_ERROR, CKR_HOST_MEMORY, CKR_KEY_HANDLE_INVALID,
    CKR_MECHANISM_INVALID, CKR_MECHANISM_PARAM_INVALID, CKR_OBJECT_HANDLE_INVALID, CKR_OK,
    CKR_OPERATION_ACTIVE, CKR_OPERATION_NOT_INITIALIZED, CKR_PIN_INCORRECT,
    CKR_SESSION_HANDLE_INVALID, CKR_SLOT_ID_INVALID, CKR_TEMPLATE_INCOMPLETE,
    CKR_TEMPLATE_INCONSISTENT, CKR_TOKEN_NOT_PRESENT, CKR_USER_ALREADY_LOGGED_IN,
    CKR_USER_NOT_LOGGED_IN, CKR_VENDOR_DEFINED,
};
use thiserror::Error;

pub type ShimResult<T> = Result<T, ShimError>;

#[derive(Error, Debug)]
pub enum ShimError {
    #[error("{0}")]
    Default(String),

    /// The native copy of an attribute template could not be allocated.
    #[error("host memory exhausted while marshalling an attribute template")]
    HostMemory,

    #[error("{function} failed: {} ({rv:#x})", name_of(.rv))]
    Pkcs11 { function: &'static str, rv: CK_RV },

    #[error("{0} is not exposed by the PKCS#11 library")]
    FunctionNotSupported(&'static str),

    /// The configured library path is empty: the dynamic loader would hand back the
    /// host program instead of a PKCS#11 module.
    #[error("the PKCS#11 library path is empty")]
    EmptyLibraryPath,

    #[error("Error loading the library: {0}")]
    LibLoading(#[from] libloading::Error),
}

impl ShimError {
    /// The PKCS#11 return value reported to a C caller for this error.
    #[must_use]
    pub const fn rv(&self) -> CK_RV {
        match self {
            Self::HostMemory => CKR_HOST_MEMORY,
            Self::Pkcs11 { rv, .. } => *rv,
            Self::FunctionNotSupported(_) => CKR_FUNCTION_NOT_SUPPORTED,
            Self::Default(_) | Self::EmptyLibraryPath | Self::LibLoading(_) => CKR_GENERAL_ERROR,
        }
    }

    /// Turn a vendor return value into a `Result`.
    pub fn check(function: &'static str, rv: CK_RV) -> ShimResult<()> {
        if rv == CKR_OK {
            Ok(())
        } else {
            Err(Self::Pkcs11 { function, rv })
        }
    }
}

impl From<ShimError> for CK_RV {
    fn from(e: ShimError) -> Self {
        e.rv()
    }
}

fn name_of(rv: &CK_RV) -> &'static str {
    rv_name(*rv)
}

/// Symbolic name of the most common PKCS#11 return values.
#[must_use]
pub const fn rv_name(rv: CK_RV) -> &'static str {
    match rv {
        CKR_OK => "CKR_OK",
        CKR_HOST_MEMORY => "CKR_HOST_MEMORY",
        CKR_SLOT_ID_INVALID => "CKR_SLOT_ID_INVALID",
        CKR_GENERAL_ERROR => "CKR_GENERAL_ERROR",
        CKR_FUNCTION_FAILED => "CKR_FUNCTION_FAILED",
        CKR_ARGUMENTS_BAD => "CKR_ARGUMENTS_BAD",
        CKR_ATTRIBUTE_SENSITIVE => "CKR_ATTRIBUTE_SENSITIVE",
        CKR_ATTRIBUTE_TYPE_INVALID => "CKR_ATTRIBUTE_TYPE_INVALID",
        CKR_ATTRIBUTE_VALUE_INVALID => "CKR_ATTRIBUTE_VALUE_INVALID",
        CKR_DEVICE_ERROR => "CKR_DEVICE_ERROR",
        CKR_FUNCTION_NOT_SUPPORTED => "CKR_FUNCTION_NOT_SUPPORTED",
        CKR_KEY_HANDLE_INVALID => "CKR_KEY_HANDLE_INVALID",
        CKR_MECHANISM_INVALID => "CKR_MECHANISM_INVALID",
        CKR_MECHANISM_PARAM_INVALID => "CKR_MECHANISM_PARAM_INVALID",
        CKR_OBJECT_HANDLE_INVALID => "CKR_OBJECT_HANDLE_INVALID",
        CKR_OPERATION_ACTIVE => "CKR_OPERATION_ACTIVE",
        CKR_OPERATION_NOT_INITIALIZED => "CKR_OPERATION_NOT_INITIALIZED",
        CKR_PIN_INCORRECT => "CKR_PIN_INCORRECT",
        CKR_SESSION_HANDLE_INVALID => "CKR_SESSION_HANDLE_INVALID",
        CKR_TEMPLATE_INCOMPLETE => "CKR_TEMPLATE_INCOMPLETE",
        CKR_TEMPLATE_INCONSISTENT => "CKR_TEMPLATE_INCONSISTENT",
        CKR_TOKEN_NOT_PRESENT => "CKR_TOKEN_NOT_PRESENT",
        CKR_USER_ALREADY_LOGGED_IN => "CKR_USER_ALREADY_LOGGED_IN",
        CKR_USER_NOT_LOGGED_IN => "CKR_USER_NOT_LOGGED_IN",
        CKR_BUFFER_TOO_SMALL => "CKR_BUFFER_TOO_SMALL",
        CKR_CRYPTOKI_NOT_INITIALIZED => "CKR_CRYPTOKI_NOT_INITIALIZED",
        CKR_CRYPTOKI_ALREADY_INITIALIZED => "CKR_CRYPTOKI_ALREADY_INITIALIZED",
        rv if rv >= CKR_VENDOR_DEFINED => "CKR_VENDOR_DEFINED",
        _ => "CKR_UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use cryptoki_shim_sys::{CKR_BUFFER_TOO_SMALL, CKR_HOST_MEMORY, CKR_OK, CKR_TOKEN_NOT_PRESENT};

    use super::{ShimError, rv_name};

    #[test]
    fn check_passes_the_vendor_code_through() {
        assert!(ShimError::check("C_GetInfo", CKR_OK).is_ok());
        let err = ShimError::check("C_GetInfo", CKR_TOKEN_NOT_PRESENT).unwrap_err();
        assert_eq!(err.rv(), CKR_TOKEN_NOT_PRESENT);
        assert_eq!(
            err.to_string(),
            "C_GetInfo failed: CKR_TOKEN_NOT_PRESENT (0xe0)"
        );
    }

    #[test]
    fn host_memory_maps_to_ckr_host_memory() {
        let rv: cryptoki_shim_sys::CK_RV = ShimError::HostMemory.into();
        assert_eq!(rv, CKR_HOST_MEMORY);
    }

    #[test]
    fn empty_library_path_is_a_general_error() {
        let err = ShimError::EmptyLibraryPath;
        assert_eq!(err.rv(), cryptoki_shim_sys::CKR_GENERAL_ERROR);
        assert_eq!(err.to_string(), "the PKCS#11 library path is empty");
    }

    #[test]
    fn names() {
        assert_eq!(rv_name(CKR_BUFFER_TOO_SMALL), "CKR_BUFFER_TOO_SMALL");
        assert_eq!(rv_name(0x8000_0042), "CKR_VENDOR_DEFINED");
        assert_eq!(rv_name(0x7777), "CKR_UNKNOWN");
    }
}
