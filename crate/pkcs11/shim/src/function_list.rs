//! Marshalled PKCS#11 entry points.
//!
//! Every method is named after, and takes the parameters of, the PKCS#11 function it wraps,
//! in the standard order: a `(pTemplate, ulCount)` pair becomes one [`AttributeView`] and
//! `CK_MECHANISM_PTR` / `CK_INFO_PTR` become mirror references. The vendor's return value is
//! passed through untouched. The shim only answers by itself with `CKR_HOST_MEMORY` when a
//! template cannot be marshalled (the vendor is not called) and with
//! `CKR_FUNCTION_NOT_SUPPORTED` when the vendor's list has no entry for the function.
//!
//! Functions taking none of the marshalled records are reached through
//! [`FunctionList::raw`].

use std::marker::PhantomData;

use cryptoki_shim_sys::{
    CK_BYTE_PTR, CK_FUNCTION_LIST, CK_FUNCTION_LIST_PTR, CK_OBJECT_HANDLE, CK_OBJECT_HANDLE_PTR,
    CK_RV, CK_SESSION_HANDLE, CK_ULONG, CK_ULONG_PTR, CK_VERSION, CK_VOID_PTR,
    CKR_FUNCTION_NOT_SUPPORTED,
};
use tracing::{trace, warn};

use crate::{
    DefaultPacking, ShimError, ShimResult,
    layout::{NativeInfo, NativeMechanism, NativeTemplate, Packing},
    mirror::{AttributeView, Info, Mechanism},
};

/// Fetch a slot of the function list or answer `CKR_FUNCTION_NOT_SUPPORTED`.
macro_rules! function {
    ($self:ident, $name:ident) => {
        // SAFETY: `from_raw` checked the list pointer
        match unsafe { (*$self.list).$name } {
            Some(f) => f,
            None => {
                warn!("{}", ShimError::FunctionNotSupported(stringify!($name)));
                return CKR_FUNCTION_NOT_SUPPORTED;
            }
        }
    };
}

/// Marshal a template or return the marshalling failure before calling the vendor.
/// Templates marshalled earlier in the same call are released on that path.
macro_rules! to_native {
    ($name:ident, $view:expr) => {
        match P::attributes_to_native($view) {
            Ok(template) => template,
            Err(e) => {
                warn!("{}: {e}", stringify!($name));
                return e.rv();
            }
        }
    };
}

/// A vendor's `CK_FUNCTION_LIST`, called through the packing policy `P`.
pub struct FunctionList<P: Packing = DefaultPacking> {
    list: CK_FUNCTION_LIST_PTR,
    _packing: PhantomData<P>,
}

// The function table is never written after `C_GetFunctionList` returned it.
unsafe impl<P: Packing> Send for FunctionList<P> {}
unsafe impl<P: Packing> Sync for FunctionList<P> {}

impl<P: Packing> FunctionList<P> {
    /// # Safety
    /// `list` must point to a function table that outlives the returned value, whose
    /// entries follow the PKCS#11 calling conventions.
    pub unsafe fn from_raw(list: CK_FUNCTION_LIST_PTR) -> ShimResult<Self> {
        if list.is_null() {
            return Err(ShimError::Default(
                "the PKCS#11 library returned a null function list".to_owned(),
            ));
        }
        Ok(Self {
            list,
            _packing: PhantomData,
        })
    }

    /// The unmarshalled table, for the functions that take no attribute, mechanism or info.
    #[must_use]
    pub const fn raw(&self) -> CK_FUNCTION_LIST_PTR {
        self.list
    }

    /// Cryptoki version the table was built for.
    #[must_use]
    pub fn version(&self) -> CK_VERSION {
        self.table().version
    }

    fn table(&self) -> &CK_FUNCTION_LIST {
        // SAFETY: checked by `from_raw`
        unsafe { &*self.list }
    }

    pub unsafe fn C_Initialize(&self, pInitArgs: CK_VOID_PTR) -> CK_RV {
        let f = function!(self, C_Initialize);
        let rv = unsafe { f(pInitArgs) };
        trace!("C_Initialize: {rv:#x}");
        rv
    }

    /// `pReserved` is handed to the vendor unchanged; PKCS#11 v2.40 requires it to be NULL.
    pub unsafe fn C_Finalize(&self, pReserved: CK_VOID_PTR) -> CK_RV {
        let f = function!(self, C_Finalize);
        let rv = unsafe { f(pReserved) };
        trace!("C_Finalize: {rv:#x}");
        rv
    }

    pub fn C_GetInfo(&self, info: &mut Info) -> CK_RV {
        let f = function!(self, C_GetInfo);
        let mut native = P::info_to_native(info);
        let rv = unsafe { f(native.as_mut_ptr()) };
        trace!("C_GetInfo: {rv:#x}");
        native.complete(rv)
    }

    pub unsafe fn C_CreateObject(
        &self,
        hSession: CK_SESSION_HANDLE,
        template: AttributeView<'_>,
        phObject: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV {
        let f = function!(self, C_CreateObject);
        let mut template = to_native!(C_CreateObject, template);
        let rv = unsafe { f(hSession, template.as_mut_ptr(), template.count(), phObject) };
        trace!("C_CreateObject: {} attributes: {rv:#x}", template.count());
        rv
    }

    pub unsafe fn C_CopyObject(
        &self,
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        template: AttributeView<'_>,
        phNewObject: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV {
        let f = function!(self, C_CopyObject);
        let mut template = to_native!(C_CopyObject, template);
        let rv = unsafe {
            f(
                hSession,
                hObject,
                template.as_mut_ptr(),
                template.count(),
                phNewObject,
            )
        };
        trace!("C_CopyObject: {} attributes: {rv:#x}", template.count());
        rv
    }

    /// Value lengths written by the vendor are copied back into `template` whatever the
    /// return value: `CKR_BUFFER_TOO_SMALL`, `CKR_ATTRIBUTE_SENSITIVE` and
    /// `CKR_ATTRIBUTE_TYPE_INVALID` all come with meaningful lengths.
    pub unsafe fn C_GetAttributeValue(
        &self,
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        template: AttributeView<'_>,
    ) -> CK_RV {
        let f = function!(self, C_GetAttributeValue);
        let mut template = to_native!(C_GetAttributeValue, template);
        let rv = unsafe { f(hSession, hObject, template.as_mut_ptr(), template.count()) };
        template.copy_lengths_back();
        trace!("C_GetAttributeValue: {} attributes: {rv:#x}", template.count());
        rv
    }

    pub unsafe fn C_SetAttributeValue(
        &self,
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        template: AttributeView<'_>,
    ) -> CK_RV {
        let f = function!(self, C_SetAttributeValue);
        let mut template = to_native!(C_SetAttributeValue, template);
        let rv = unsafe { f(hSession, hObject, template.as_mut_ptr(), template.count()) };
        trace!("C_SetAttributeValue: {} attributes: {rv:#x}", template.count());
        rv
    }

    pub unsafe fn C_FindObjectsInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        template: AttributeView<'_>,
    ) -> CK_RV {
        let f = function!(self, C_FindObjectsInit);
        let mut template = to_native!(C_FindObjectsInit, template);
        let rv = unsafe { f(hSession, template.as_mut_ptr(), template.count()) };
        trace!("C_FindObjectsInit: {} attributes: {rv:#x}", template.count());
        rv
    }

    pub unsafe fn C_EncryptInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV {
        let f = function!(self, C_EncryptInit);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe { f(hSession, mechanism.as_mut_ptr(), hKey) };
        trace!("C_EncryptInit: {rv:#x}");
        rv
    }

    pub unsafe fn C_DecryptInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV {
        let f = function!(self, C_DecryptInit);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe { f(hSession, mechanism.as_mut_ptr(), hKey) };
        trace!("C_DecryptInit: {rv:#x}");
        rv
    }

    pub unsafe fn C_DigestInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
    ) -> CK_RV {
        let f = function!(self, C_DigestInit);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe { f(hSession, mechanism.as_mut_ptr()) };
        trace!("C_DigestInit: {rv:#x}");
        rv
    }

    pub unsafe fn C_SignInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV {
        let f = function!(self, C_SignInit);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe { f(hSession, mechanism.as_mut_ptr(), hKey) };
        trace!("C_SignInit: {rv:#x}");
        rv
    }

    pub unsafe fn C_SignRecoverInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV {
        let f = function!(self, C_SignRecoverInit);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe { f(hSession, mechanism.as_mut_ptr(), hKey) };
        trace!("C_SignRecoverInit: {rv:#x}");
        rv
    }

    pub unsafe fn C_VerifyInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV {
        let f = function!(self, C_VerifyInit);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe { f(hSession, mechanism.as_mut_ptr(), hKey) };
        trace!("C_VerifyInit: {rv:#x}");
        rv
    }

    pub unsafe fn C_VerifyRecoverInit(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV {
        let f = function!(self, C_VerifyRecoverInit);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe { f(hSession, mechanism.as_mut_ptr(), hKey) };
        trace!("C_VerifyRecoverInit: {rv:#x}");
        rv
    }

    pub unsafe fn C_GenerateKey(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        template: AttributeView<'_>,
        phKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV {
        let f = function!(self, C_GenerateKey);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let mut template = to_native!(C_GenerateKey, template);
        let rv = unsafe {
            f(
                hSession,
                mechanism.as_mut_ptr(),
                template.as_mut_ptr(),
                template.count(),
                phKey,
            )
        };
        trace!("C_GenerateKey: {} attributes: {rv:#x}", template.count());
        rv
    }

    #[allow(clippy::too_many_arguments)]
    pub unsafe fn C_GenerateKeyPair(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        public_key_template: AttributeView<'_>,
        private_key_template: AttributeView<'_>,
        phPublicKey: CK_OBJECT_HANDLE_PTR,
        phPrivateKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV {
        let f = function!(self, C_GenerateKeyPair);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let mut public_template = to_native!(C_GenerateKeyPair, public_key_template);
        // dropping `public_template` on failure releases it
        let mut private_template = to_native!(C_GenerateKeyPair, private_key_template);
        let rv = unsafe {
            f(
                hSession,
                mechanism.as_mut_ptr(),
                public_template.as_mut_ptr(),
                public_template.count(),
                private_template.as_mut_ptr(),
                private_template.count(),
                phPublicKey,
                phPrivateKey,
            )
        };
        trace!(
            "C_GenerateKeyPair: {}/{} attributes: {rv:#x}",
            public_template.count(),
            private_template.count()
        );
        rv
    }

    pub unsafe fn C_WrapKey(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hWrappingKey: CK_OBJECT_HANDLE,
        hKey: CK_OBJECT_HANDLE,
        pWrappedKey: CK_BYTE_PTR,
        pulWrappedKeyLen: CK_ULONG_PTR,
    ) -> CK_RV {
        let f = function!(self, C_WrapKey);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let rv = unsafe {
            f(
                hSession,
                mechanism.as_mut_ptr(),
                hWrappingKey,
                hKey,
                pWrappedKey,
                pulWrappedKeyLen,
            )
        };
        trace!("C_WrapKey: {rv:#x}");
        rv
    }

    #[allow(clippy::too_many_arguments)]
    pub unsafe fn C_UnwrapKey(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hUnwrappingKey: CK_OBJECT_HANDLE,
        pWrappedKey: CK_BYTE_PTR,
        ulWrappedKeyLen: CK_ULONG,
        template: AttributeView<'_>,
        phKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV {
        let f = function!(self, C_UnwrapKey);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let mut template = to_native!(C_UnwrapKey, template);
        let rv = unsafe {
            f(
                hSession,
                mechanism.as_mut_ptr(),
                hUnwrappingKey,
                pWrappedKey,
                ulWrappedKeyLen,
                template.as_mut_ptr(),
                template.count(),
                phKey,
            )
        };
        trace!("C_UnwrapKey: {} attributes: {rv:#x}", template.count());
        rv
    }

    pub unsafe fn C_DeriveKey(
        &self,
        hSession: CK_SESSION_HANDLE,
        mechanism: Option<&Mechanism>,
        hBaseKey: CK_OBJECT_HANDLE,
        template: AttributeView<'_>,
        phKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV {
        let f = function!(self, C_DeriveKey);
        let mut mechanism = P::mechanism_to_native(mechanism);
        let mut template = to_native!(C_DeriveKey, template);
        let rv = unsafe {
            f(
                hSession,
                mechanism.as_mut_ptr(),
                hBaseKey,
                template.as_mut_ptr(),
                template.count(),
                phKey,
            )
        };
        trace!("C_DeriveKey: {} attributes: {rv:#x}", template.count());
        rv
    }
}

impl<P: Packing> std::fmt::Debug for FunctionList<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionList")
            .field("version", &self.version())
            .field("repacks", &P::REPACKS)
            .finish()
    }
}
