use std::{marker::PhantomData, ptr};

use cryptoki_shim_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_PTR, CK_INFO, CK_INFO_PTR, CK_MECHANISM, CK_MECHANISM_PTR, CK_RV,
    CK_ULONG, CKR_OK,
};

use super::{NativeInfo, NativeMechanism, NativeTemplate, Packing};
use crate::{
    ShimError, ShimResult,
    mirror::{Attribute, AttributeView, Info, Mechanism},
};

/// Copies every record field by field into the layout declared by pkcs11.h.
#[derive(Debug, Clone, Copy, Default)]
pub struct Repacked;

/// Heap-allocated native copy of a mirror template.
pub struct RepackedTemplate<'a> {
    mirror: *mut Attribute,
    count: CK_ULONG,
    native: Vec<CK_ATTRIBUTE>,
    _marker: PhantomData<&'a mut [Attribute]>,
}

/// Native mechanism carried by value: exactly one is needed per call.
pub struct RepackedMechanism {
    native: Option<CK_MECHANISM>,
}

pub struct RepackedInfo<'a> {
    mirror: &'a mut Info,
    native: CK_INFO,
}

impl Packing for Repacked {
    const REPACKS: bool = true;

    type Info<'a> = RepackedInfo<'a>;
    type Mechanism<'a> = RepackedMechanism;
    type Template<'a> = RepackedTemplate<'a>;

    fn attributes_to_native(attributes: AttributeView<'_>) -> ShimResult<RepackedTemplate<'_>> {
        let count = attributes.len();
        let len = usize::try_from(count).map_err(|_| ShimError::HostMemory)?;
        let mut native = Vec::new();
        native
            .try_reserve_exact(len)
            .map_err(|_| ShimError::HostMemory)?;
        let mirror = attributes.as_mut_ptr();
        for i in 0..len {
            // SAFETY: the view covers `count` readable attributes
            let attribute = unsafe { &*mirror.add(i) };
            native.push(CK_ATTRIBUTE {
                type_: attribute.type_,
                pValue: attribute.pValue,
                ulValueLen: attribute.ulValueLen,
            });
        }
        Ok(RepackedTemplate {
            mirror,
            count,
            native,
            _marker: PhantomData,
        })
    }

    fn mechanism_to_native(mechanism: Option<&Mechanism>) -> RepackedMechanism {
        RepackedMechanism {
            native: mechanism.map(|m| CK_MECHANISM {
                mechanism: m.mechanism,
                pParameter: m.pParameter,
                ulParameterLen: m.ulParameterLen,
            }),
        }
    }

    fn info_to_native(info: &mut Info) -> RepackedInfo<'_> {
        RepackedInfo {
            mirror: info,
            native: CK_INFO::default(),
        }
    }
}

impl NativeTemplate for RepackedTemplate<'_> {
    fn as_mut_ptr(&mut self) -> CK_ATTRIBUTE_PTR {
        if self.native.is_empty() {
            ptr::null_mut()
        } else {
            self.native.as_mut_ptr()
        }
    }

    fn count(&self) -> CK_ULONG {
        self.count
    }

    fn copy_lengths_back(&mut self) {
        for (i, native) in self.native.iter().enumerate() {
            let len = native.ulValueLen;
            // SAFETY: `native` was built from the `count` attributes behind `mirror`
            unsafe { (*self.mirror.add(i)).ulValueLen = len };
        }
    }
}

impl NativeMechanism for RepackedMechanism {
    fn as_mut_ptr(&mut self) -> CK_MECHANISM_PTR {
        self.native.as_mut().map_or(ptr::null_mut(), ptr::from_mut)
    }
}

impl NativeInfo for RepackedInfo<'_> {
    fn as_mut_ptr(&mut self) -> CK_INFO_PTR {
        ptr::from_mut(&mut self.native)
    }

    fn complete(self, rv: CK_RV) -> CK_RV {
        if rv == CKR_OK {
            let native = self.native;
            *self.mirror = Info {
                cryptokiVersion: native.cryptokiVersion,
                manufacturerID: native.manufacturerID,
                flags: native.flags,
                libraryDescription: native.libraryDescription,
                libraryVersion: native.libraryVersion,
            };
        }
        rv
    }
}
