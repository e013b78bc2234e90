//! Runtime discovery of native vendor telemetry libraries.
//!
//! A probe walks an ordered candidate list, loads each library that exists and
//! resolves a complete function table from it. Resolution is all-or-nothing per
//! candidate: a library missing any required symbol is unloaded immediately and
//! the probe moves on to the next path.

use std::ffi::c_char;
use std::path::{Path, PathBuf};

use libloading::Library;
use log::debug;

use crate::error::BackendError;

/// A typed table of function pointers resolved from one library
pub trait FunctionTable: Sized {
    /// Resolve every required symbol, or return the name of the first missing one
    fn resolve(symbols: &SymbolResolver<'_>) -> Result<Self, String>;
}

/// Symbol lookup scoped to a library that is still loaded
pub struct SymbolResolver<'lib> {
    library: &'lib Library,
}

impl SymbolResolver<'_> {
    /// Resolve the first of `names` exported by the library.
    ///
    /// Later names are fallbacks for older library versions
    /// (`nvmlInit_v2` then `nvmlInit`).
    ///
    /// # Safety
    /// `F` must be the exact `extern` function pointer type of the symbol.
    pub unsafe fn function<F: Copy>(&self, names: &[&str]) -> Result<F, String> {
        for name in names {
            if let Ok(symbol) = self.library.get::<F>(name.as_bytes()) {
                return Ok(*symbol);
            }
        }
        Err(names.join("|"))
    }
}

/// A loaded library together with its validated function table.
///
/// The table's pointers are only valid while the library stays loaded, so
/// the two are owned together and the table is only reachable through here.
pub struct LoadedLibrary<T> {
    table: T,
    path: PathBuf,
    _library: Library,
}

impl<T> LoadedLibrary<T> {
    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Load the first candidate that exports a complete `T`
pub fn probe<T: FunctionTable>(candidates: &[PathBuf]) -> Result<LoadedLibrary<T>, BackendError> {
    let mut rejected: Option<BackendError> = None;

    for path in candidates {
        // SAFETY: loading runs the library's initializers; candidates are
        // vendor telemetry libraries from known install locations or the
        // user's configuration.
        let library = match unsafe { Library::new(path) } {
            Ok(library) => library,
            Err(e) => {
                debug!("Could not load {}: {}", path.display(), e);
                continue;
            }
        };

        match T::resolve(&SymbolResolver { library: &library }) {
            Ok(table) => {
                debug!("Loaded {}", path.display());
                return Ok(LoadedLibrary {
                    table,
                    path: path.clone(),
                    _library: library,
                });
            }
            Err(symbol) => {
                debug!("{} is missing {}, unloading", path.display(), symbol);
                drop(library);
                rejected = Some(BackendError::SymbolMissing {
                    path: path.display().to_string(),
                    symbol,
                });
            }
        }
    }

    Err(rejected.unwrap_or(BackendError::LibraryNotFound {
        tried: candidates.len(),
    }))
}

/// User-configured paths first, then the built-in list
pub fn candidate_list(extra: &[PathBuf], builtin: &[&str]) -> Vec<PathBuf> {
    extra
        .iter()
        .cloned()
        .chain(builtin.iter().map(PathBuf::from))
        .collect()
}

/// Decode a fixed-size, NUL-terminated C buffer
pub fn string_from_c_buf(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
