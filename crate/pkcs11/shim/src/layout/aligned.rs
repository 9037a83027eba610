use std::{
    marker::PhantomData,
    mem::{align_of, offset_of, size_of},
    ptr,
};

use cryptoki_shim_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_PTR, CK_INFO, CK_INFO_PTR, CK_MECHANISM, CK_MECHANISM_PTR, CK_RV,
    CK_ULONG,
};

use super::{NativeInfo, NativeMechanism, NativeTemplate, Packing};
use crate::{
    ShimResult,
    mirror::{Attribute, AttributeView, Info, Mechanism},
};

// The mirrors are handed to the vendor as is: both layouts must coincide.
const _: () = {
    assert!(size_of::<Attribute>() == size_of::<CK_ATTRIBUTE>());
    assert!(align_of::<Attribute>() == align_of::<CK_ATTRIBUTE>());
    assert!(offset_of!(Attribute, type_) == offset_of!(CK_ATTRIBUTE, type_));
    assert!(offset_of!(Attribute, pValue) == offset_of!(CK_ATTRIBUTE, pValue));
    assert!(offset_of!(Attribute, ulValueLen) == offset_of!(CK_ATTRIBUTE, ulValueLen));

    assert!(size_of::<Mechanism>() == size_of::<CK_MECHANISM>());
    assert!(align_of::<Mechanism>() == align_of::<CK_MECHANISM>());
    assert!(offset_of!(Mechanism, mechanism) == offset_of!(CK_MECHANISM, mechanism));
    assert!(offset_of!(Mechanism, pParameter) == offset_of!(CK_MECHANISM, pParameter));
    assert!(offset_of!(Mechanism, ulParameterLen) == offset_of!(CK_MECHANISM, ulParameterLen));

    assert!(size_of::<Info>() == size_of::<CK_INFO>());
    assert!(align_of::<Info>() == align_of::<CK_INFO>());
    assert!(offset_of!(Info, cryptokiVersion) == offset_of!(CK_INFO, cryptokiVersion));
    assert!(offset_of!(Info, manufacturerID) == offset_of!(CK_INFO, manufacturerID));
    assert!(offset_of!(Info, flags) == offset_of!(CK_INFO, flags));
    assert!(offset_of!(Info, libraryDescription) == offset_of!(CK_INFO, libraryDescription));
    assert!(offset_of!(Info, libraryVersion) == offset_of!(CK_INFO, libraryVersion));
};

/// Zero-copy policy for platforms where pkcs11.h uses the default packing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aligned;

pub struct AlignedTemplate<'a> {
    ptr: CK_ATTRIBUTE_PTR,
    count: CK_ULONG,
    _marker: PhantomData<&'a mut [Attribute]>,
}

pub struct AlignedMechanism<'a> {
    ptr: CK_MECHANISM_PTR,
    _marker: PhantomData<&'a Mechanism>,
}

pub struct AlignedInfo<'a> {
    ptr: CK_INFO_PTR,
    _marker: PhantomData<&'a mut Info>,
}

impl Packing for Aligned {
    const REPACKS: bool = false;

    type Info<'a> = AlignedInfo<'a>;
    type Mechanism<'a> = AlignedMechanism<'a>;
    type Template<'a> = AlignedTemplate<'a>;

    fn attributes_to_native(attributes: AttributeView<'_>) -> ShimResult<AlignedTemplate<'_>> {
        Ok(AlignedTemplate {
            ptr: attributes.as_mut_ptr().cast(),
            count: attributes.len(),
            _marker: PhantomData,
        })
    }

    fn mechanism_to_native(mechanism: Option<&Mechanism>) -> AlignedMechanism<'_> {
        AlignedMechanism {
            // the vendor only reads pMechanism
            ptr: mechanism.map_or(ptr::null_mut(), |m| ptr::from_ref(m).cast_mut().cast()),
            _marker: PhantomData,
        }
    }

    fn info_to_native(info: &mut Info) -> AlignedInfo<'_> {
        AlignedInfo {
            ptr: ptr::from_mut(info).cast(),
            _marker: PhantomData,
        }
    }
}

impl NativeTemplate for AlignedTemplate<'_> {
    fn as_mut_ptr(&mut self) -> CK_ATTRIBUTE_PTR {
        self.ptr
    }

    fn count(&self) -> CK_ULONG {
        self.count
    }

    fn copy_lengths_back(&mut self) {}
}

impl NativeMechanism for AlignedMechanism<'_> {
    fn as_mut_ptr(&mut self) -> CK_MECHANISM_PTR {
        self.ptr
    }
}

impl NativeInfo for AlignedInfo<'_> {
    fn as_mut_ptr(&mut self) -> CK_INFO_PTR {
        self.ptr
    }

    fn complete(self, rv: CK_RV) -> CK_RV {
        rv
    }
}
