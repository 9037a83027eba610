// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PKCS#11 v2.40 declarations.
//!
//! pkcs11.h requires `#pragma pack(push, 1)` on Windows and the default packing everywhere
//! else. Every structure below goes through [`cryptoki_aligned!`] so that the Rust layout
//! follows the same rule: `#[repr(C, packed)]` on Windows, `#[repr(C)]` otherwise.
//!
//! Fields of a packed structure may be unaligned: never take a reference to one, copy it
//! out (`let v = s.field;`) or use `ptr::addr_of!`.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]
#![allow(clippy::upper_case_acronyms)]

/// Declare a structure with the packing pkcs11.h mandates for the target platform.
#[macro_export]
macro_rules! cryptoki_aligned {
    ($decl:item) => {
        #[cfg(windows)]
        #[repr(C, packed)]
        $decl

        #[cfg(not(windows))]
        #[repr(C)]
        $decl
    };
}

macro_rules! zeroed_default {
    ($($name:ty),* $(,)?) => {
        $(
            impl Default for $name {
                fn default() -> Self {
                    let mut s = ::std::mem::MaybeUninit::<Self>::uninit();
                    unsafe {
                        ::std::ptr::write_bytes(s.as_mut_ptr(), 0, 1);
                        s.assume_init()
                    }
                }
            }
        )*
    };
}

pub const CRYPTOKI_VERSION_MAJOR: CK_BYTE = 2;
pub const CRYPTOKI_VERSION_MINOR: CK_BYTE = 40;

pub type CK_BYTE = ::std::os::raw::c_uchar;
pub type CK_CHAR = CK_BYTE;
pub type CK_UTF8CHAR = CK_BYTE;
pub type CK_BBOOL = CK_BYTE;
pub type CK_ULONG = ::std::os::raw::c_ulong;
pub type CK_LONG = ::std::os::raw::c_long;
pub type CK_FLAGS = CK_ULONG;

pub type CK_BYTE_PTR = *mut CK_BYTE;
pub type CK_CHAR_PTR = *mut CK_CHAR;
pub type CK_UTF8CHAR_PTR = *mut CK_UTF8CHAR;
pub type CK_ULONG_PTR = *mut CK_ULONG;
pub type CK_VOID_PTR = *mut ::std::os::raw::c_void;
pub type CK_VOID_PTR_PTR = *mut CK_VOID_PTR;

pub const CK_TRUE: CK_BBOOL = 1;
pub const CK_FALSE: CK_BBOOL = 0;

pub const CK_UNAVAILABLE_INFORMATION: CK_ULONG = !0;
pub const CK_EFFECTIVELY_INFINITE: CK_ULONG = 0;
pub const CK_INVALID_HANDLE: CK_ULONG = 0;

pub type CK_NOTIFICATION = CK_ULONG;
pub type CK_SLOT_ID = CK_ULONG;
pub type CK_SLOT_ID_PTR = *mut CK_SLOT_ID;
pub type CK_SESSION_HANDLE = CK_ULONG;
pub type CK_SESSION_HANDLE_PTR = *mut CK_SESSION_HANDLE;
pub type CK_USER_TYPE = CK_ULONG;
pub type CK_STATE = CK_ULONG;
pub type CK_OBJECT_HANDLE = CK_ULONG;
pub type CK_OBJECT_HANDLE_PTR = *mut CK_OBJECT_HANDLE;
pub type CK_OBJECT_CLASS = CK_ULONG;
pub type CK_KEY_TYPE = CK_ULONG;
pub type CK_CERTIFICATE_TYPE = CK_ULONG;
pub type CK_ATTRIBUTE_TYPE = CK_ULONG;
pub type CK_MECHANISM_TYPE = CK_ULONG;
pub type CK_MECHANISM_TYPE_PTR = *mut CK_MECHANISM_TYPE;
pub type CK_RV = CK_ULONG;

cryptoki_aligned! {
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
    pub struct CK_VERSION {
        pub major: CK_BYTE,
        pub minor: CK_BYTE,
    }
}
pub type CK_VERSION_PTR = *mut CK_VERSION;

cryptoki_aligned! {
    #[derive(Debug, Default, Copy, Clone)]
    pub struct CK_INFO {
        pub cryptokiVersion: CK_VERSION,
        pub manufacturerID: [CK_UTF8CHAR; 32usize],
        pub flags: CK_FLAGS,
        pub libraryDescription: [CK_UTF8CHAR; 32usize],
        pub libraryVersion: CK_VERSION,
    }
}
pub type CK_INFO_PTR = *mut CK_INFO;

cryptoki_aligned! {
    #[derive(Debug, Copy, Clone)]
    pub struct CK_SLOT_INFO {
        pub slotDescription: [CK_UTF8CHAR; 64usize],
        pub manufacturerID: [CK_UTF8CHAR; 32usize],
        pub flags: CK_FLAGS,
        pub hardwareVersion: CK_VERSION,
        pub firmwareVersion: CK_VERSION,
    }
}
pub type CK_SLOT_INFO_PTR = *mut CK_SLOT_INFO;

cryptoki_aligned! {
    #[derive(Debug, Default, Copy, Clone)]
    pub struct CK_TOKEN_INFO {
        pub label: [CK_UTF8CHAR; 32usize],
        pub manufacturerID: [CK_UTF8CHAR; 32usize],
        pub model: [CK_UTF8CHAR; 16usize],
        pub serialNumber: [CK_CHAR; 16usize],
        pub flags: CK_FLAGS,
        pub ulMaxSessionCount: CK_ULONG,
        pub ulSessionCount: CK_ULONG,
        pub ulMaxRwSessionCount: CK_ULONG,
        pub ulRwSessionCount: CK_ULONG,
        pub ulMaxPinLen: CK_ULONG,
        pub ulMinPinLen: CK_ULONG,
        pub ulTotalPublicMemory: CK_ULONG,
        pub ulFreePublicMemory: CK_ULONG,
        pub ulTotalPrivateMemory: CK_ULONG,
        pub ulFreePrivateMemory: CK_ULONG,
        pub hardwareVersion: CK_VERSION,
        pub firmwareVersion: CK_VERSION,
        pub utcTime: [CK_CHAR; 16usize],
    }
}
pub type CK_TOKEN_INFO_PTR = *mut CK_TOKEN_INFO;

cryptoki_aligned! {
    #[derive(Debug, Default, Copy, Clone)]
    pub struct CK_SESSION_INFO {
        pub slotID: CK_SLOT_ID,
        pub state: CK_STATE,
        pub flags: CK_FLAGS,
        pub ulDeviceError: CK_ULONG,
    }
}
pub type CK_SESSION_INFO_PTR = *mut CK_SESSION_INFO;

cryptoki_aligned! {
    #[derive(Debug, Copy, Clone)]
    pub struct CK_ATTRIBUTE {
        pub type_: CK_ATTRIBUTE_TYPE,
        pub pValue: CK_VOID_PTR,
        pub ulValueLen: CK_ULONG,
    }
}
pub type CK_ATTRIBUTE_PTR = *mut CK_ATTRIBUTE;

cryptoki_aligned! {
    #[derive(Debug, Copy, Clone)]
    pub struct CK_MECHANISM {
        pub mechanism: CK_MECHANISM_TYPE,
        pub pParameter: CK_VOID_PTR,
        pub ulParameterLen: CK_ULONG,
    }
}
pub type CK_MECHANISM_PTR = *mut CK_MECHANISM;

cryptoki_aligned! {
    #[derive(Debug, Default, Copy, Clone)]
    pub struct CK_MECHANISM_INFO {
        pub ulMinKeySize: CK_ULONG,
        pub ulMaxKeySize: CK_ULONG,
        pub flags: CK_FLAGS,
    }
}
pub type CK_MECHANISM_INFO_PTR = *mut CK_MECHANISM_INFO;

zeroed_default!(CK_SLOT_INFO, CK_ATTRIBUTE, CK_MECHANISM);

pub type CK_NOTIFY = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        event: CK_NOTIFICATION,
        pApplication: CK_VOID_PTR,
    ) -> CK_RV,
>;
pub type CK_CREATEMUTEX =
    ::std::option::Option<unsafe extern "C" fn(ppMutex: CK_VOID_PTR_PTR) -> CK_RV>;
pub type CK_DESTROYMUTEX = ::std::option::Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;
pub type CK_LOCKMUTEX = ::std::option::Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;
pub type CK_UNLOCKMUTEX = ::std::option::Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;

cryptoki_aligned! {
    #[derive(Debug, Copy, Clone)]
    pub struct CK_C_INITIALIZE_ARGS {
        pub CreateMutex: CK_CREATEMUTEX,
        pub DestroyMutex: CK_DESTROYMUTEX,
        pub LockMutex: CK_LOCKMUTEX,
        pub UnlockMutex: CK_UNLOCKMUTEX,
        pub flags: CK_FLAGS,
        pub pReserved: CK_VOID_PTR,
    }
}
pub type CK_C_INITIALIZE_ARGS_PTR = *mut CK_C_INITIALIZE_ARGS;

pub type CK_C_Initialize =
    ::std::option::Option<unsafe extern "C" fn(pInitArgs: CK_VOID_PTR) -> CK_RV>;
pub type CK_C_Finalize =
    ::std::option::Option<unsafe extern "C" fn(pReserved: CK_VOID_PTR) -> CK_RV>;
pub type CK_C_GetInfo = ::std::option::Option<unsafe extern "C" fn(pInfo: CK_INFO_PTR) -> CK_RV>;
pub type CK_C_GetFunctionList =
    ::std::option::Option<unsafe extern "C" fn(ppFunctionList: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV>;
pub type CK_C_GetSlotList = ::std::option::Option<
    unsafe extern "C" fn(
        tokenPresent: CK_BBOOL,
        pSlotList: CK_SLOT_ID_PTR,
        pulCount: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_GetSlotInfo = ::std::option::Option<
    unsafe extern "C" fn(slotID: CK_SLOT_ID, pInfo: CK_SLOT_INFO_PTR) -> CK_RV,
>;
pub type CK_C_GetTokenInfo = ::std::option::Option<
    unsafe extern "C" fn(slotID: CK_SLOT_ID, pInfo: CK_TOKEN_INFO_PTR) -> CK_RV,
>;
pub type CK_C_GetMechanismList = ::std::option::Option<
    unsafe extern "C" fn(
        slotID: CK_SLOT_ID,
        pMechanismList: CK_MECHANISM_TYPE_PTR,
        pulCount: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_GetMechanismInfo = ::std::option::Option<
    unsafe extern "C" fn(
        slotID: CK_SLOT_ID,
        type_: CK_MECHANISM_TYPE,
        pInfo: CK_MECHANISM_INFO_PTR,
    ) -> CK_RV,
>;
pub type CK_C_InitToken = ::std::option::Option<
    unsafe extern "C" fn(
        slotID: CK_SLOT_ID,
        pPin: CK_UTF8CHAR_PTR,
        ulPinLen: CK_ULONG,
        pLabel: CK_UTF8CHAR_PTR,
    ) -> CK_RV,
>;
pub type CK_C_InitPIN = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pPin: CK_UTF8CHAR_PTR,
        ulPinLen: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_SetPIN = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pOldPin: CK_UTF8CHAR_PTR,
        ulOldLen: CK_ULONG,
        pNewPin: CK_UTF8CHAR_PTR,
        ulNewLen: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_OpenSession = ::std::option::Option<
    unsafe extern "C" fn(
        slotID: CK_SLOT_ID,
        flags: CK_FLAGS,
        pApplication: CK_VOID_PTR,
        Notify: CK_NOTIFY,
        phSession: CK_SESSION_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_CloseSession =
    ::std::option::Option<unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV>;
pub type CK_C_CloseAllSessions =
    ::std::option::Option<unsafe extern "C" fn(slotID: CK_SLOT_ID) -> CK_RV>;
pub type CK_C_GetSessionInfo = ::std::option::Option<
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, pInfo: CK_SESSION_INFO_PTR) -> CK_RV,
>;
pub type CK_C_GetOperationState = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pOperationState: CK_BYTE_PTR,
        pulOperationStateLen: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_SetOperationState = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pOperationState: CK_BYTE_PTR,
        ulOperationStateLen: CK_ULONG,
        hEncryptionKey: CK_OBJECT_HANDLE,
        hAuthenticationKey: CK_OBJECT_HANDLE,
    ) -> CK_RV,
>;
pub type CK_C_Login = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        userType: CK_USER_TYPE,
        pPin: CK_UTF8CHAR_PTR,
        ulPinLen: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_Logout =
    ::std::option::Option<unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV>;
pub type CK_C_CreateObject = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
        phObject: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_CopyObject = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
        phNewObject: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_DestroyObject = ::std::option::Option<
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, hObject: CK_OBJECT_HANDLE) -> CK_RV,
>;
pub type CK_C_GetObjectSize = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pulSize: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_GetAttributeValue = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_SetAttributeValue = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_FindObjectsInit = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_FindObjects = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        phObject: CK_OBJECT_HANDLE_PTR,
        ulMaxObjectCount: CK_ULONG,
        pulObjectCount: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_FindObjectsFinal =
    ::std::option::Option<unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV>;

/// Shape shared by every `C_*Init` taking a mechanism and a key.
pub type CK_C_MechanismKeyInit = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV,
>;
/// Shape shared by single-part and dual-function operations: input buffer in, output
/// buffer and length out.
pub type CK_C_InOut = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pIn: CK_BYTE_PTR,
        ulInLen: CK_ULONG,
        pOut: CK_BYTE_PTR,
        pulOutLen: CK_ULONG_PTR,
    ) -> CK_RV,
>;
/// Shape shared by the `C_*Final` functions producing output.
pub type CK_C_Out = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pOut: CK_BYTE_PTR,
        pulOutLen: CK_ULONG_PTR,
    ) -> CK_RV,
>;
/// Shape shared by the update functions consuming input only.
pub type CK_C_In = ::std::option::Option<
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, pIn: CK_BYTE_PTR, ulInLen: CK_ULONG) -> CK_RV,
>;

pub type CK_C_EncryptInit = CK_C_MechanismKeyInit;
pub type CK_C_Encrypt = CK_C_InOut;
pub type CK_C_EncryptUpdate = CK_C_InOut;
pub type CK_C_EncryptFinal = CK_C_Out;
pub type CK_C_DecryptInit = CK_C_MechanismKeyInit;
pub type CK_C_Decrypt = CK_C_InOut;
pub type CK_C_DecryptUpdate = CK_C_InOut;
pub type CK_C_DecryptFinal = CK_C_Out;
pub type CK_C_DigestInit = ::std::option::Option<
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, pMechanism: CK_MECHANISM_PTR) -> CK_RV,
>;
pub type CK_C_Digest = CK_C_InOut;
pub type CK_C_DigestUpdate = CK_C_In;
pub type CK_C_DigestKey = ::std::option::Option<
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, hKey: CK_OBJECT_HANDLE) -> CK_RV,
>;
pub type CK_C_DigestFinal = CK_C_Out;
pub type CK_C_SignInit = CK_C_MechanismKeyInit;
pub type CK_C_Sign = CK_C_InOut;
pub type CK_C_SignUpdate = CK_C_In;
pub type CK_C_SignFinal = CK_C_Out;
pub type CK_C_SignRecoverInit = CK_C_MechanismKeyInit;
pub type CK_C_SignRecover = CK_C_InOut;
pub type CK_C_VerifyInit = CK_C_MechanismKeyInit;
pub type CK_C_Verify = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pData: CK_BYTE_PTR,
        ulDataLen: CK_ULONG,
        pSignature: CK_BYTE_PTR,
        ulSignatureLen: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_VerifyUpdate = CK_C_In;
pub type CK_C_VerifyFinal = CK_C_In;
pub type CK_C_VerifyRecoverInit = CK_C_MechanismKeyInit;
pub type CK_C_VerifyRecover = CK_C_InOut;
pub type CK_C_DigestEncryptUpdate = CK_C_InOut;
pub type CK_C_DecryptDigestUpdate = CK_C_InOut;
pub type CK_C_SignEncryptUpdate = CK_C_InOut;
pub type CK_C_DecryptVerifyUpdate = CK_C_InOut;
pub type CK_C_GenerateKey = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
        phKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_GenerateKeyPair = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        pPublicKeyTemplate: CK_ATTRIBUTE_PTR,
        ulPublicKeyAttributeCount: CK_ULONG,
        pPrivateKeyTemplate: CK_ATTRIBUTE_PTR,
        ulPrivateKeyAttributeCount: CK_ULONG,
        phPublicKey: CK_OBJECT_HANDLE_PTR,
        phPrivateKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_WrapKey = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        hWrappingKey: CK_OBJECT_HANDLE,
        hKey: CK_OBJECT_HANDLE,
        pWrappedKey: CK_BYTE_PTR,
        pulWrappedKeyLen: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_UnwrapKey = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        hUnwrappingKey: CK_OBJECT_HANDLE,
        pWrappedKey: CK_BYTE_PTR,
        ulWrappedKeyLen: CK_ULONG,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulAttributeCount: CK_ULONG,
        phKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_DeriveKey = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        hBaseKey: CK_OBJECT_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulAttributeCount: CK_ULONG,
        phKey: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_SeedRandom = CK_C_In;
pub type CK_C_GenerateRandom = ::std::option::Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        RandomData: CK_BYTE_PTR,
        ulRandomLen: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_GetFunctionStatus =
    ::std::option::Option<unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV>;
pub type CK_C_CancelFunction =
    ::std::option::Option<unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV>;
pub type CK_C_WaitForSlotEvent = ::std::option::Option<
    unsafe extern "C" fn(flags: CK_FLAGS, pSlot: CK_SLOT_ID_PTR, pRserved: CK_VOID_PTR) -> CK_RV,
>;

cryptoki_aligned! {
    #[derive(Debug, Default, Copy, Clone)]
    pub struct CK_FUNCTION_LIST {
        pub version: CK_VERSION,
        pub C_Initialize: CK_C_Initialize,
        pub C_Finalize: CK_C_Finalize,
        pub C_GetInfo: CK_C_GetInfo,
        pub C_GetFunctionList: CK_C_GetFunctionList,
        pub C_GetSlotList: CK_C_GetSlotList,
        pub C_GetSlotInfo: CK_C_GetSlotInfo,
        pub C_GetTokenInfo: CK_C_GetTokenInfo,
        pub C_GetMechanismList: CK_C_GetMechanismList,
        pub C_GetMechanismInfo: CK_C_GetMechanismInfo,
        pub C_InitToken: CK_C_InitToken,
        pub C_InitPIN: CK_C_InitPIN,
        pub C_SetPIN: CK_C_SetPIN,
        pub C_OpenSession: CK_C_OpenSession,
        pub C_CloseSession: CK_C_CloseSession,
        pub C_CloseAllSessions: CK_C_CloseAllSessions,
        pub C_GetSessionInfo: CK_C_GetSessionInfo,
        pub C_GetOperationState: CK_C_GetOperationState,
        pub C_SetOperationState: CK_C_SetOperationState,
        pub C_Login: CK_C_Login,
        pub C_Logout: CK_C_Logout,
        pub C_CreateObject: CK_C_CreateObject,
        pub C_CopyObject: CK_C_CopyObject,
        pub C_DestroyObject: CK_C_DestroyObject,
        pub C_GetObjectSize: CK_C_GetObjectSize,
        pub C_GetAttributeValue: CK_C_GetAttributeValue,
        pub C_SetAttributeValue: CK_C_SetAttributeValue,
        pub C_FindObjectsInit: CK_C_FindObjectsInit,
        pub C_FindObjects: CK_C_FindObjects,
        pub C_FindObjectsFinal: CK_C_FindObjectsFinal,
        pub C_EncryptInit: CK_C_EncryptInit,
        pub C_Encrypt: CK_C_Encrypt,
        pub C_EncryptUpdate: CK_C_EncryptUpdate,
        pub C_EncryptFinal: CK_C_EncryptFinal,
        pub C_DecryptInit: CK_C_DecryptInit,
        pub C_Decrypt: CK_C_Decrypt,
        pub C_DecryptUpdate: CK_C_DecryptUpdate,
        pub C_DecryptFinal: CK_C_DecryptFinal,
        pub C_DigestInit: CK_C_DigestInit,
        pub C_Digest: CK_C_Digest,
        pub C_DigestUpdate: CK_C_DigestUpdate,
        pub C_DigestKey: CK_C_DigestKey,
        pub C_DigestFinal: CK_C_DigestFinal,
        pub C_SignInit: CK_C_SignInit,
        pub C_Sign: CK_C_Sign,
        pub C_SignUpdate: CK_C_SignUpdate,
        pub C_SignFinal: CK_C_SignFinal,
        pub C_SignRecoverInit: CK_C_SignRecoverInit,
        pub C_SignRecover: CK_C_SignRecover,
        pub C_VerifyInit: CK_C_VerifyInit,
        pub C_Verify: CK_C_Verify,
        pub C_VerifyUpdate: CK_C_VerifyUpdate,
        pub C_VerifyFinal: CK_C_VerifyFinal,
        pub C_VerifyRecoverInit: CK_C_VerifyRecoverInit,
        pub C_VerifyRecover: CK_C_VerifyRecover,
        pub C_DigestEncryptUpdate: CK_C_DigestEncryptUpdate,
        pub C_DecryptDigestUpdate: CK_C_DecryptDigestUpdate,
        pub C_SignEncryptUpdate: CK_C_SignEncryptUpdate,
        pub C_DecryptVerifyUpdate: CK_C_DecryptVerifyUpdate,
        pub C_GenerateKey: CK_C_GenerateKey,
        pub C_GenerateKeyPair: CK_C_GenerateKeyPair,
        pub C_WrapKey: CK_C_WrapKey,
        pub C_UnwrapKey: CK_C_UnwrapKey,
        pub C_DeriveKey: CK_C_DeriveKey,
        pub C_SeedRandom: CK_C_SeedRandom,
        pub C_GenerateRandom: CK_C_GenerateRandom,
        pub C_GetFunctionStatus: CK_C_GetFunctionStatus,
        pub C_CancelFunction: CK_C_CancelFunction,
        pub C_WaitForSlotEvent: CK_C_WaitForSlotEvent,
    }
}
pub type CK_FUNCTION_LIST_PTR = *mut CK_FUNCTION_LIST;
pub type CK_FUNCTION_LIST_PTR_PTR = *mut CK_FUNCTION_LIST_PTR;

// Object classes
pub const CKO_DATA: CK_OBJECT_CLASS = 0x0000_0000;
pub const CKO_CERTIFICATE: CK_OBJECT_CLASS = 0x0000_0001;
pub const CKO_PUBLIC_KEY: CK_OBJECT_CLASS = 0x0000_0002;
pub const CKO_PRIVATE_KEY: CK_OBJECT_CLASS = 0x0000_0003;
pub const CKO_SECRET_KEY: CK_OBJECT_CLASS = 0x0000_0004;
pub const CKO_VENDOR_DEFINED: CK_OBJECT_CLASS = 0x8000_0000;

// Key types
pub const CKK_RSA: CK_KEY_TYPE = 0x0000_0000;
pub const CKK_EC: CK_KEY_TYPE = 0x0000_0003;
pub const CKK_GENERIC_SECRET: CK_KEY_TYPE = 0x0000_0010;
pub const CKK_AES: CK_KEY_TYPE = 0x0000_001F;
pub const CKK_VENDOR_DEFINED: CK_KEY_TYPE = 0x8000_0000;

// Attribute types
pub const CKA_CLASS: CK_ATTRIBUTE_TYPE = 0x0000_0000;
pub const CKA_TOKEN: CK_ATTRIBUTE_TYPE = 0x0000_0001;
pub const CKA_PRIVATE: CK_ATTRIBUTE_TYPE = 0x0000_0002;
pub const CKA_LABEL: CK_ATTRIBUTE_TYPE = 0x0000_0003;
pub const CKA_APPLICATION: CK_ATTRIBUTE_TYPE = 0x0000_0010;
pub const CKA_VALUE: CK_ATTRIBUTE_TYPE = 0x0000_0011;
pub const CKA_KEY_TYPE: CK_ATTRIBUTE_TYPE = 0x0000_0100;
pub const CKA_ID: CK_ATTRIBUTE_TYPE = 0x0000_0102;
pub const CKA_SENSITIVE: CK_ATTRIBUTE_TYPE = 0x0000_0103;
pub const CKA_ENCRYPT: CK_ATTRIBUTE_TYPE = 0x0000_0104;
pub const CKA_DECRYPT: CK_ATTRIBUTE_TYPE = 0x0000_0105;
pub const CKA_WRAP: CK_ATTRIBUTE_TYPE = 0x0000_0106;
pub const CKA_UNWRAP: CK_ATTRIBUTE_TYPE = 0x0000_0107;
pub const CKA_SIGN: CK_ATTRIBUTE_TYPE = 0x0000_0108;
pub const CKA_VERIFY: CK_ATTRIBUTE_TYPE = 0x0000_010A;
pub const CKA_DERIVE: CK_ATTRIBUTE_TYPE = 0x0000_010C;
pub const CKA_MODULUS: CK_ATTRIBUTE_TYPE = 0x0000_0120;
pub const CKA_MODULUS_BITS: CK_ATTRIBUTE_TYPE = 0x0000_0121;
pub const CKA_PUBLIC_EXPONENT: CK_ATTRIBUTE_TYPE = 0x0000_0122;
pub const CKA_VALUE_LEN: CK_ATTRIBUTE_TYPE = 0x0000_0161;
pub const CKA_EXTRACTABLE: CK_ATTRIBUTE_TYPE = 0x0000_0162;
pub const CKA_EC_PARAMS: CK_ATTRIBUTE_TYPE = 0x0000_0180;
pub const CKA_EC_POINT: CK_ATTRIBUTE_TYPE = 0x0000_0181;
pub const CKA_VENDOR_DEFINED: CK_ATTRIBUTE_TYPE = 0x8000_0000;

// Mechanism types
pub const CKM_RSA_PKCS_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x0000_0000;
pub const CKM_RSA_PKCS: CK_MECHANISM_TYPE = 0x0000_0001;
pub const CKM_SHA1_RSA_PKCS: CK_MECHANISM_TYPE = 0x0000_0006;
pub const CKM_RSA_PKCS_OAEP: CK_MECHANISM_TYPE = 0x0000_0009;
pub const CKM_SHA256_RSA_PKCS: CK_MECHANISM_TYPE = 0x0000_0040;
pub const CKM_SHA_1: CK_MECHANISM_TYPE = 0x0000_0220;
pub const CKM_SHA256: CK_MECHANISM_TYPE = 0x0000_0250;
pub const CKM_EC_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x0000_1040;
pub const CKM_ECDSA: CK_MECHANISM_TYPE = 0x0000_1041;
pub const CKM_ECDH1_DERIVE: CK_MECHANISM_TYPE = 0x0000_1050;
pub const CKM_AES_KEY_GEN: CK_MECHANISM_TYPE = 0x0000_1080;
pub const CKM_AES_CBC: CK_MECHANISM_TYPE = 0x0000_1082;
pub const CKM_AES_GCM: CK_MECHANISM_TYPE = 0x0000_1087;
pub const CKM_AES_KEY_WRAP: CK_MECHANISM_TYPE = 0x0000_2109;
pub const CKM_VENDOR_DEFINED: CK_MECHANISM_TYPE = 0x8000_0000;

// User types
pub const CKU_SO: CK_USER_TYPE = 0;
pub const CKU_USER: CK_USER_TYPE = 1;
pub const CKU_CONTEXT_SPECIFIC: CK_USER_TYPE = 2;

// Flags
pub const CKF_TOKEN_PRESENT: CK_FLAGS = 0x0000_0001;
pub const CKF_RW_SESSION: CK_FLAGS = 0x0000_0002;
pub const CKF_SERIAL_SESSION: CK_FLAGS = 0x0000_0004;
pub const CKF_LIBRARY_CANT_CREATE_OS_THREADS: CK_FLAGS = 0x0000_0001;
pub const CKF_OS_LOCKING_OK: CK_FLAGS = 0x0000_0002;
pub const CKF_DONT_BLOCK: CK_FLAGS = 0x0000_0001;

// Return values
pub const CKR_OK: CK_RV = 0x0000_0000;
pub const CKR_CANCEL: CK_RV = 0x0000_0001;
pub const CKR_HOST_MEMORY: CK_RV = 0x0000_0002;
pub const CKR_SLOT_ID_INVALID: CK_RV = 0x0000_0003;
pub const CKR_GENERAL_ERROR: CK_RV = 0x0000_0005;
pub const CKR_FUNCTION_FAILED: CK_RV = 0x0000_0006;
pub const CKR_ARGUMENTS_BAD: CK_RV = 0x0000_0007;
pub const CKR_ATTRIBUTE_READ_ONLY: CK_RV = 0x0000_0010;
pub const CKR_ATTRIBUTE_SENSITIVE: CK_RV = 0x0000_0011;
pub const CKR_ATTRIBUTE_TYPE_INVALID: CK_RV = 0x0000_0012;
pub const CKR_ATTRIBUTE_VALUE_INVALID: CK_RV = 0x0000_0013;
pub const CKR_DATA_INVALID: CK_RV = 0x0000_0020;
pub const CKR_DATA_LEN_RANGE: CK_RV = 0x0000_0021;
pub const CKR_DEVICE_ERROR: CK_RV = 0x0000_0030;
pub const CKR_DEVICE_MEMORY: CK_RV = 0x0000_0031;
pub const CKR_DEVICE_REMOVED: CK_RV = 0x0000_0032;
pub const CKR_FUNCTION_CANCELED: CK_RV = 0x0000_0050;
pub const CKR_FUNCTION_NOT_SUPPORTED: CK_RV = 0x0000_0054;
pub const CKR_KEY_HANDLE_INVALID: CK_RV = 0x0000_0060;
pub const CKR_KEY_SIZE_RANGE: CK_RV = 0x0000_0062;
pub const CKR_KEY_TYPE_INCONSISTENT: CK_RV = 0x0000_0063;
pub const CKR_MECHANISM_INVALID: CK_RV = 0x0000_0070;
pub const CKR_MECHANISM_PARAM_INVALID: CK_RV = 0x0000_0071;
pub const CKR_OBJECT_HANDLE_INVALID: CK_RV = 0x0000_0082;
pub const CKR_OPERATION_ACTIVE: CK_RV = 0x0000_0090;
pub const CKR_OPERATION_NOT_INITIALIZED: CK_RV = 0x0000_0091;
pub const CKR_PIN_INCORRECT: CK_RV = 0x0000_00A0;
pub const CKR_SESSION_HANDLE_INVALID: CK_RV = 0x0000_00B3;
pub const CKR_SIGNATURE_INVALID: CK_RV = 0x0000_00C0;
pub const CKR_TEMPLATE_INCOMPLETE: CK_RV = 0x0000_00D0;
pub const CKR_TEMPLATE_INCONSISTENT: CK_RV = 0x0000_00D1;
pub const CKR_TOKEN_NOT_PRESENT: CK_RV = 0x0000_00E0;
pub const CKR_TOKEN_NOT_RECOGNIZED: CK_RV = 0x0000_00E1;
pub const CKR_USER_ALREADY_LOGGED_IN: CK_RV = 0x0000_0100;
pub const CKR_USER_NOT_LOGGED_IN: CK_RV = 0x0000_0101;
pub const CKR_BUFFER_TOO_SMALL: CK_RV = 0x0000_0150;
pub const CKR_CRYPTOKI_NOT_INITIALIZED: CK_RV = 0x0000_0190;
pub const CKR_CRYPTOKI_ALREADY_INITIALIZED: CK_RV = 0x0000_0191;
pub const CKR_VENDOR_DEFINED: CK_RV = 0x8000_0000;
