//! Packing policies.
//!
//! A policy turns mirror records into pointers the vendor library can consume, and copies
//! what the vendor wrote back into the mirrors. [`Repacked`] copies into the native layout
//! and works everywhere; [`Aligned`] hands the mirrors over untouched and only exists where
//! the native layout is the default one. [`DefaultPacking`] is chosen at build time.

use cryptoki_shim_sys::{CK_ATTRIBUTE_PTR, CK_INFO_PTR, CK_MECHANISM_PTR, CK_RV, CK_ULONG};

use crate::{
    ShimResult,
    mirror::{self, AttributeView},
};

#[cfg(not(windows))]
mod aligned;
mod repacked;

#[cfg(not(windows))]
pub use aligned::Aligned;
pub use repacked::Repacked;

#[cfg(any(windows, feature = "force-repack"))]
pub type DefaultPacking = Repacked;
#[cfg(not(any(windows, feature = "force-repack")))]
pub type DefaultPacking = Aligned;

pub trait Packing {
    /// `true` when the policy copies records into a separate native layout.
    const REPACKS: bool;

    type Template<'a>: NativeTemplate;
    type Mechanism<'a>: NativeMechanism;
    type Info<'a>: NativeInfo;

    /// Native form of an attribute template.
    ///
    /// Fails with [`crate::ShimError::HostMemory`] when the native copy cannot be
    /// allocated; nothing has been allocated in that case.
    fn attributes_to_native(attributes: AttributeView<'_>) -> ShimResult<Self::Template<'_>>;

    /// Native form of an optional mechanism; `None` gives a null pointer.
    fn mechanism_to_native(mechanism: Option<&mirror::Mechanism>) -> Self::Mechanism<'_>;

    /// Native output slot for `C_GetInfo`.
    fn info_to_native(info: &mut mirror::Info) -> Self::Info<'_>;
}

/// Native attribute array built for one call. Dropping it releases the native copy.
pub trait NativeTemplate {
    /// `pTemplate` argument; null for an empty template.
    fn as_mut_ptr(&mut self) -> CK_ATTRIBUTE_PTR;

    /// `ulCount` argument.
    fn count(&self) -> CK_ULONG;

    /// Copy every `ulValueLen` written by the vendor back into the mirror attributes.
    /// Types and value pointers belong to the caller and are left alone.
    fn copy_lengths_back(&mut self);
}

pub trait NativeMechanism {
    fn as_mut_ptr(&mut self) -> CK_MECHANISM_PTR;
}

pub trait NativeInfo {
    fn as_mut_ptr(&mut self) -> CK_INFO_PTR;

    /// Publish the record filled by the vendor to the mirror when `rv` is `CKR_OK`, then
    /// return `rv` unchanged.
    fn complete(self, rv: CK_RV) -> CK_RV;
}
