//! Default-alignment counterparts of the PKCS#11 records the shim marshals.
//!
//! Each mirror keeps the field order, types and names of its pkcs11.h structure; only the
//! compiler-inserted padding may differ from the native layout.

use std::{marker::PhantomData, mem::size_of, ptr};

use cryptoki_shim_sys::{
    CK_ATTRIBUTE_TYPE, CK_FLAGS, CK_MECHANISM_TYPE, CK_ULONG, CK_UTF8CHAR, CK_VERSION, CK_VOID_PTR,
};

/// Mirror of `CK_INFO`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Info {
    pub cryptokiVersion: CK_VERSION,
    pub manufacturerID: [CK_UTF8CHAR; 32],
    pub flags: CK_FLAGS,
    pub libraryDescription: [CK_UTF8CHAR; 32],
    pub libraryVersion: CK_VERSION,
}

impl Info {
    /// `manufacturerID` without its blank padding.
    #[must_use]
    pub fn manufacturer_id(&self) -> String {
        padded_to_string(&self.manufacturerID)
    }

    /// `libraryDescription` without its blank padding.
    #[must_use]
    pub fn library_description(&self) -> String {
        padded_to_string(&self.libraryDescription)
    }
}

fn padded_to_string(field: &[CK_UTF8CHAR]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches([' ', '\0'])
        .to_owned()
}

/// `len` as a `CK_ULONG`, capped at `CK_ULONG::MAX` where `CK_ULONG` is narrower than
/// `usize` (64-bit Windows). A capped length describes a prefix of the buffer, never more.
pub(crate) fn clamp_len(len: usize) -> CK_ULONG {
    CK_ULONG::try_from(len).unwrap_or(CK_ULONG::MAX)
}

/// Mirror of `CK_ATTRIBUTE`.
///
/// `pValue` points into a buffer owned by the caller; the shim never frees it and never
/// reads through it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub type_: CK_ATTRIBUTE_TYPE,
    pub pValue: CK_VOID_PTR,
    pub ulValueLen: CK_ULONG,
}

impl Attribute {
    /// An attribute whose value lives in `value`. A buffer longer than `CK_ULONG::MAX` bytes
    /// is offered through its first `CK_ULONG::MAX` bytes.
    pub fn new(type_: CK_ATTRIBUTE_TYPE, value: &mut [u8]) -> Self {
        Self {
            type_,
            pValue: value.as_mut_ptr().cast(),
            ulValueLen: clamp_len(value.len()),
        }
    }

    /// An attribute pointing at a fixed-size value such as a `CK_BBOOL` or a `CK_ULONG`.
    pub fn from_value<T>(type_: CK_ATTRIBUTE_TYPE, value: &mut T) -> Self {
        Self {
            type_,
            pValue: ptr::from_mut(value).cast(),
            ulValueLen: clamp_len(size_of::<T>()),
        }
    }

    /// An attribute without a buffer: `C_GetAttributeValue` answers with the value length.
    #[must_use]
    pub const fn query(type_: CK_ATTRIBUTE_TYPE) -> Self {
        Self {
            type_,
            pValue: ptr::null_mut(),
            ulValueLen: 0,
        }
    }
}

/// Mirror of `CK_MECHANISM`.
///
/// The parameter block is passed through as is: it is neither copied nor repacked.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mechanism {
    pub mechanism: CK_MECHANISM_TYPE,
    pub pParameter: CK_VOID_PTR,
    pub ulParameterLen: CK_ULONG,
}

impl Mechanism {
    #[must_use]
    pub const fn new(mechanism: CK_MECHANISM_TYPE) -> Self {
        Self {
            mechanism,
            pParameter: ptr::null_mut(),
            ulParameterLen: 0,
        }
    }

    pub fn with_parameter<T>(mechanism: CK_MECHANISM_TYPE, parameter: &mut T) -> Self {
        Self {
            mechanism,
            pParameter: ptr::from_mut(parameter).cast(),
            ulParameterLen: clamp_len(size_of::<T>()),
        }
    }
}

/// A `(pTemplate, ulCount)` pair over caller-owned mirror attributes.
pub struct AttributeView<'a> {
    ptr: *mut Attribute,
    count: CK_ULONG,
    _marker: PhantomData<&'a mut [Attribute]>,
}

impl<'a> AttributeView<'a> {
    pub fn new(attributes: &'a mut [Attribute]) -> Self {
        if attributes.is_empty() {
            return Self::empty();
        }
        Self {
            ptr: attributes.as_mut_ptr(),
            // a longer slice is viewed through its first CK_ULONG::MAX entries
            count: clamp_len(attributes.len()),
            _marker: PhantomData,
        }
    }

    /// A `(NULL, 0)` template.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            count: 0,
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// Unless `count` is zero, `ptr` must be valid for reads and writes of `count`
    /// consecutive `Attribute`s for `'a`, and nothing else may access them meanwhile.
    #[must_use]
    pub const unsafe fn from_raw_parts(ptr: *mut Attribute, count: CK_ULONG) -> Self {
        Self {
            ptr,
            count,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn len(&self) -> CK_ULONG {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub(crate) const fn as_mut_ptr(&self) -> *mut Attribute {
        self.ptr
    }
}

impl<'a> From<&'a mut [Attribute]> for AttributeView<'a> {
    fn from(attributes: &'a mut [Attribute]) -> Self {
        Self::new(attributes)
    }
}

impl<'a, const N: usize> From<&'a mut [Attribute; N]> for AttributeView<'a> {
    fn from(attributes: &'a mut [Attribute; N]) -> Self {
        Self::new(attributes)
    }
}

impl<'a> From<&'a mut Vec<Attribute>> for AttributeView<'a> {
    fn from(attributes: &'a mut Vec<Attribute>) -> Self {
        Self::new(attributes)
    }
}
