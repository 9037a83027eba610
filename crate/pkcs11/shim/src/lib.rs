//! Copyright 2024 Cosmian Tech SAS
//!
//! PKCS#11 requires byte-packed structures on Windows and default alignment elsewhere.
//! Callers of this crate always build default-alignment mirror records ([`Info`],
//! [`Attribute`], [`Mechanism`]); the [`FunctionList`] entry points convert them to the
//! native layout right before calling into the vendor library and copy results back right
//! after, using the [`Packing`] policy selected at build time ([`DefaultPacking`]).

#![allow(non_snake_case)]
#![allow(clippy::missing_safety_doc)]
#![deny(unsafe_op_in_unsafe_fn)]

mod config;
mod error;
mod function_list;
mod layout;
mod library;
pub mod logging;
mod mirror;

pub use config::LibraryConfig;
pub use cryptoki_shim_sys as sys;
pub use error::{ShimError, ShimResult, rv_name};
pub use function_list::FunctionList;
#[cfg(not(windows))]
pub use layout::Aligned;
pub use layout::{
    DefaultPacking, NativeInfo, NativeMechanism, NativeTemplate, Packing, Repacked,
};
pub use library::Pkcs11Library;
pub use mirror::{Attribute, AttributeView, Info, Mechanism};
