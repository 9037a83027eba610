//! A vendor stand-in: `extern "C"` entry points that record what they were called with.
//!
//! The mocks read the native records exactly as a vendor compiled against pkcs11.h would,
//! so every access goes through `read_unaligned` / `write_unaligned`.

#![allow(dead_code, non_snake_case)]

use std::{
    ptr,
    sync::{Mutex, MutexGuard},
};

use cryptoki_shim::{
    FunctionList, Packing,
    sys::{
        CK_ATTRIBUTE_PTR, CK_ATTRIBUTE_TYPE, CK_BYTE_PTR, CK_FUNCTION_LIST, CK_INFO_PTR,
        CK_MECHANISM_PTR, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE, CK_OBJECT_HANDLE_PTR, CK_RV,
        CK_SESSION_HANDLE, CK_ULONG, CK_ULONG_PTR, CK_VERSION, CK_VOID_PTR, CKR_BUFFER_TOO_SMALL,
        CKR_OK,
    },
};

pub const SESSION: CK_SESSION_HANDLE = 0x11;
pub const NEW_OBJECT: CK_OBJECT_HANDLE = 0x2a;
pub const MANUFACTURER: &[u8; 32] = b"Mock Vendor                     ";

/// Length a `C_GetAttributeValue` mock reports for the attribute at `index`.
pub const fn reported_len(index: usize) -> CK_ULONG {
    (index as CK_ULONG + 1) * 4
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub address: usize,
    pub count: CK_ULONG,
    pub entries: Vec<(CK_ATTRIBUTE_TYPE, CK_ULONG)>,
}

#[derive(Debug)]
pub struct Observed {
    pub calls: usize,
    pub session: CK_SESSION_HANDLE,
    pub templates: Vec<Template>,
    pub mechanism: Option<CK_MECHANISM_TYPE>,
    pub mechanism_address: usize,
    pub key: CK_OBJECT_HANDLE,
    /// Address `C_Finalize` received as `pReserved`.
    pub reserved: Option<usize>,
}

impl Observed {
    const fn new() -> Self {
        Self {
            calls: 0,
            session: 0,
            templates: Vec::new(),
            mechanism: None,
            mechanism_address: 0,
            key: 0,
            reserved: None,
        }
    }
}

static OBSERVED: Mutex<Observed> = Mutex::new(Observed::new());

fn observed() -> MutexGuard<'static, Observed> {
    OBSERVED.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Forget previous calls. Tests using the mocks run `#[serial]`.
pub fn reset() {
    cryptoki_shim::logging::log_init(None);
    *observed() = Observed::new();
}

/// What the mocks saw since the last [`reset`].
pub fn take() -> Observed {
    std::mem::replace(&mut *observed(), Observed::new())
}

unsafe fn record_template(pTemplate: CK_ATTRIBUTE_PTR, ulCount: CK_ULONG) -> Template {
    let entries = (0..ulCount as usize)
        .map(|i| {
            let attribute = unsafe { pTemplate.add(i).read_unaligned() };
            (attribute.type_, attribute.ulValueLen)
        })
        .collect();
    Template {
        address: pTemplate as usize,
        count: ulCount,
        entries,
    }
}

unsafe fn record_mechanism(pMechanism: CK_MECHANISM_PTR) {
    let mechanism = if pMechanism.is_null() {
        None
    } else {
        Some(unsafe { ptr::addr_of!((*pMechanism).mechanism).read_unaligned() })
    };
    let mut observed = observed();
    observed.mechanism = mechanism;
    observed.mechanism_address = pMechanism as usize;
}

unsafe extern "C" fn finalize(pReserved: CK_VOID_PTR) -> CK_RV {
    let mut observed = observed();
    observed.calls += 1;
    observed.reserved = Some(pReserved as usize);
    CKR_OK
}

unsafe extern "C" fn get_info(pInfo: CK_INFO_PTR) -> CK_RV {
    observed().calls += 1;
    unsafe {
        ptr::addr_of_mut!((*pInfo).cryptokiVersion).write_unaligned(CK_VERSION {
            major: 2,
            minor: 40,
        });
        ptr::addr_of_mut!((*pInfo).manufacturerID).write_unaligned(*MANUFACTURER);
        ptr::addr_of_mut!((*pInfo).flags).write_unaligned(0);
        ptr::addr_of_mut!((*pInfo).libraryDescription).write_unaligned([b' '; 32]);
        ptr::addr_of_mut!((*pInfo).libraryVersion).write_unaligned(CK_VERSION {
            major: 1,
            minor: 3,
        });
    }
    CKR_OK
}

unsafe extern "C" fn create_object(
    hSession: CK_SESSION_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
    phObject: CK_OBJECT_HANDLE_PTR,
) -> CK_RV {
    let template = unsafe { record_template(pTemplate, ulCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.templates.push(template);
    unsafe { phObject.write(NEW_OBJECT) };
    CKR_OK
}

/// Reports [`reported_len`] for every attribute and `CKR_BUFFER_TOO_SMALL`.
unsafe extern "C" fn get_attribute_value(
    hSession: CK_SESSION_HANDLE,
    _hObject: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
) -> CK_RV {
    let template = unsafe { record_template(pTemplate, ulCount) };
    for i in 0..ulCount as usize {
        unsafe {
            ptr::addr_of_mut!((*pTemplate.add(i)).ulValueLen).write_unaligned(reported_len(i));
        }
    }
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.templates.push(template);
    CKR_BUFFER_TOO_SMALL
}

unsafe extern "C" fn find_objects_init(
    hSession: CK_SESSION_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
) -> CK_RV {
    let template = unsafe { record_template(pTemplate, ulCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.templates.push(template);
    CKR_OK
}

unsafe extern "C" fn digest_init(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
) -> CK_RV {
    unsafe { record_mechanism(pMechanism) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    CKR_OK
}

unsafe extern "C" fn generate_key(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV {
    unsafe { record_mechanism(pMechanism) };
    let template = unsafe { record_template(pTemplate, ulCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.templates.push(template);
    unsafe { phKey.write(NEW_OBJECT) };
    CKR_OK
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn generate_key_pair(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    pPublicKeyTemplate: CK_ATTRIBUTE_PTR,
    ulPublicKeyAttributeCount: CK_ULONG,
    pPrivateKeyTemplate: CK_ATTRIBUTE_PTR,
    ulPrivateKeyAttributeCount: CK_ULONG,
    phPublicKey: CK_OBJECT_HANDLE_PTR,
    phPrivateKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV {
    unsafe { record_mechanism(pMechanism) };
    let public = unsafe { record_template(pPublicKeyTemplate, ulPublicKeyAttributeCount) };
    let private = unsafe { record_template(pPrivateKeyTemplate, ulPrivateKeyAttributeCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.templates.push(public);
    observed.templates.push(private);
    unsafe {
        phPublicKey.write(NEW_OBJECT);
        phPrivateKey.write(NEW_OBJECT + 1);
    }
    CKR_OK
}

unsafe extern "C" fn copy_object(
    hSession: CK_SESSION_HANDLE,
    hObject: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
    phNewObject: CK_OBJECT_HANDLE_PTR,
) -> CK_RV {
    let template = unsafe { record_template(pTemplate, ulCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.key = hObject;
    observed.templates.push(template);
    unsafe { phNewObject.write(NEW_OBJECT) };
    CKR_OK
}

unsafe extern "C" fn set_attribute_value(
    hSession: CK_SESSION_HANDLE,
    hObject: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
) -> CK_RV {
    let template = unsafe { record_template(pTemplate, ulCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.key = hObject;
    observed.templates.push(template);
    CKR_OK
}

/// Shared by every `C_*Init(hSession, pMechanism, hKey)`.
unsafe extern "C" fn mechanism_key_init(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE,
) -> CK_RV {
    unsafe { record_mechanism(pMechanism) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.key = hKey;
    CKR_OK
}

unsafe extern "C" fn wrap_key(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    _hWrappingKey: CK_OBJECT_HANDLE,
    hKey: CK_OBJECT_HANDLE,
    _pWrappedKey: CK_BYTE_PTR,
    pulWrappedKeyLen: CK_ULONG_PTR,
) -> CK_RV {
    unsafe { record_mechanism(pMechanism) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.key = hKey;
    unsafe { pulWrappedKeyLen.write(40) };
    CKR_BUFFER_TOO_SMALL
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn unwrap_key(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hUnwrappingKey: CK_OBJECT_HANDLE,
    _pWrappedKey: CK_BYTE_PTR,
    _ulWrappedKeyLen: CK_ULONG,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulAttributeCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV {
    unsafe { record_mechanism(pMechanism) };
    let template = unsafe { record_template(pTemplate, ulAttributeCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.key = hUnwrappingKey;
    observed.templates.push(template);
    unsafe { phKey.write(NEW_OBJECT) };
    CKR_OK
}

unsafe extern "C" fn derive_key(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hBaseKey: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulAttributeCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV {
    unsafe { record_mechanism(pMechanism) };
    let template = unsafe { record_template(pTemplate, ulAttributeCount) };
    let mut observed = observed();
    observed.calls += 1;
    observed.session = hSession;
    observed.key = hBaseKey;
    observed.templates.push(template);
    unsafe { phKey.write(NEW_OBJECT) };
    CKR_OK
}

/// A function table with the mocks above and every other slot empty.
pub fn mock_function_table() -> CK_FUNCTION_LIST {
    CK_FUNCTION_LIST {
        version: CK_VERSION {
            major: 2,
            minor: 40,
        },
        C_Finalize: Some(finalize),
        C_GetInfo: Some(get_info),
        C_CreateObject: Some(create_object),
        C_GetAttributeValue: Some(get_attribute_value),
        C_FindObjectsInit: Some(find_objects_init),
        C_DigestInit: Some(digest_init),
        C_GenerateKey: Some(generate_key),
        C_GenerateKeyPair: Some(generate_key_pair),
        C_CopyObject: Some(copy_object),
        C_SetAttributeValue: Some(set_attribute_value),
        C_EncryptInit: Some(mechanism_key_init),
        C_DecryptInit: Some(mechanism_key_init),
        C_SignInit: Some(mechanism_key_init),
        C_SignRecoverInit: Some(mechanism_key_init),
        C_VerifyInit: Some(mechanism_key_init),
        C_VerifyRecoverInit: Some(mechanism_key_init),
        C_WrapKey: Some(wrap_key),
        C_UnwrapKey: Some(unwrap_key),
        C_DeriveKey: Some(derive_key),
        ..Default::default()
    }
}

/// Wrap a table that lives for the whole test run.
pub fn function_list<P: Packing>(table: &'static mut CK_FUNCTION_LIST) -> FunctionList<P> {
    unsafe { FunctionList::from_raw(ptr::from_mut(table)) }.unwrap()
}

/// Leak a fresh mock table and wrap it.
pub fn mock_function_list<P: Packing>() -> FunctionList<P> {
    function_list(Box::leak(Box::new(mock_function_table())))
}
