use std::ptr;

use cryptoki_shim_sys::{
    CK_C_INITIALIZE_ARGS, CK_FUNCTION_LIST_PTR, CK_FUNCTION_LIST_PTR_PTR, CK_RV, CK_VOID_PTR,
    CKF_OS_LOCKING_OK, CKR_CRYPTOKI_ALREADY_INITIALIZED, CKR_OK,
};
use libloading::{Library, Symbol};
use tracing::{debug, warn};

use crate::{
    DefaultPacking, FunctionList, Info, LibraryConfig, ShimError, ShimResult, layout::Packing,
};

type GetFunctionList = unsafe extern "C" fn(CK_FUNCTION_LIST_PTR_PTR) -> CK_RV;

/// A vendor PKCS#11 library loaded at runtime and driven through the shim.
///
/// The library stays mapped for as long as this value lives. If [`Pkcs11Library::initialize`]
/// succeeded, dropping the value calls `C_Finalize`.
pub struct Pkcs11Library<P: Packing = DefaultPacking> {
    functions: FunctionList<P>,
    os_locking: bool,
    initialized: bool,
    // must outlive `functions`
    _library: Library,
}

impl<P: Packing> Pkcs11Library<P> {
    pub fn load(config: &LibraryConfig) -> ShimResult<Self> {
        // dlopen("") resolves to the running executable
        if config.library_path.as_os_str().is_empty() {
            return Err(ShimError::EmptyLibraryPath);
        }
        let library = unsafe { Library::new(&config.library_path) }?;
        let mut list: CK_FUNCTION_LIST_PTR = ptr::null_mut();
        let rv = {
            let get_function_list: Symbol<'_, GetFunctionList> =
                unsafe { library.get(b"C_GetFunctionList") }?;
            unsafe { get_function_list(&raw mut list) }
        };
        ShimError::check("C_GetFunctionList", rv)?;
        let functions = unsafe { FunctionList::from_raw(list) }?;
        debug!(
            "loaded {}: cryptoki {:?}, repacking: {}",
            config.library_path.display(),
            functions.version(),
            P::REPACKS
        );
        Ok(Self {
            functions,
            os_locking: config.os_locking,
            initialized: false,
            _library: library,
        })
    }

    /// Call `C_Initialize`. A library already initialized by another user in the process is
    /// accepted, but is then not finalized on drop.
    pub fn initialize(&mut self) -> ShimResult<()> {
        let mut args = CK_C_INITIALIZE_ARGS {
            CreateMutex: None,
            DestroyMutex: None,
            LockMutex: None,
            UnlockMutex: None,
            flags: CKF_OS_LOCKING_OK,
            pReserved: ptr::null_mut(),
        };
        let pInitArgs: CK_VOID_PTR = if self.os_locking {
            (&raw mut args).cast()
        } else {
            ptr::null_mut()
        };
        let rv = unsafe { self.functions.C_Initialize(pInitArgs) };
        match rv {
            CKR_OK => {
                debug!("C_Initialize: OS locking: {}", self.os_locking);
                self.initialized = true;
                Ok(())
            }
            CKR_CRYPTOKI_ALREADY_INITIALIZED => {
                debug!("the PKCS#11 library was already initialized");
                Ok(())
            }
            rv => Err(ShimError::Pkcs11 {
                function: "C_Initialize",
                rv,
            }),
        }
    }

    pub fn finalize(&mut self) -> ShimResult<()> {
        let rv = unsafe { self.functions.C_Finalize(ptr::null_mut()) };
        self.initialized = false;
        debug!("C_Finalize: {rv:#x}");
        ShimError::check("C_Finalize", rv)
    }

    pub fn get_info(&self) -> ShimResult<Info> {
        let mut info = Info::default();
        ShimError::check("C_GetInfo", self.functions.C_GetInfo(&mut info))?;
        Ok(info)
    }

    #[must_use]
    pub const fn functions(&self) -> &FunctionList<P> {
        &self.functions
    }
}

impl<P: Packing> Drop for Pkcs11Library<P> {
    fn drop(&mut self) {
        if self.initialized {
            if let Err(e) = self.finalize() {
                warn!("{e}");
            }
        }
    }
}
