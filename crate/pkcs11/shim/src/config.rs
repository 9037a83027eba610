use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const fn default_os_locking() -> bool {
    true
}

/// Where to find a vendor PKCS#11 library and how to initialize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub library_path: PathBuf,
    /// Pass `CKF_OS_LOCKING_OK` to `C_Initialize` so that the library may be used from
    /// several threads.
    #[serde(default = "default_os_locking")]
    pub os_locking: bool,
}

impl LibraryConfig {
    pub fn new<P: Into<PathBuf>>(library_path: P) -> Self {
        Self {
            library_path: library_path.into(),
            os_locking: default_os_locking(),
        }
    }

    /// Library path taken from the environment variable `var`, or `default` when unset.
    #[must_use]
    pub fn from_env(var: &str, default: &str) -> Self {
        Self::new(std::env::var(var).unwrap_or_else(|_| default.to_owned()))
    }
}
