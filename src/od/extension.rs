//! `OD_extension_t` equivalent.
//!
//! The original's `OD_IO_t` carries a pair of C function pointers
//! (`read`/`write`) plus an opaque `object` context pointer on every entry
//! that wants custom behavior, leaving every other entry's `OD_extension_t*`
//! null. Per the Design Notes' guidance against raw-pointer-heavy patterns,
//! this crate instead makes "has custom behavior or not" a closed sum type:
//! plain sub-entries are `OdAccess::Default` (byte storage behind a mutex),
//! and sub-entries an application wants to intercept are
//! `OdAccess::Extended`, carrying the closures directly instead of a pointer
//! to them.

use std::sync::Mutex;

use super::result::OdResult;
use super::stream::OdStream;

pub type ReadFn = Box<dyn Fn(&OdStream, &mut [u8]) -> OdResult<usize> + Send + Sync>;
pub type WriteFn = Box<dyn FnMut(&OdStream, &[u8]) -> OdResult<usize> + Send + Sync>;

/// Application-supplied read/write hooks for one sub-entry. Either side may
/// be absent; a sub-entry read or written from its missing side returns
/// [`super::result::Odr::Unsupported`] rather than falling back to storage,
/// since an extended sub-entry carries no backing byte buffer of its own.
pub struct OdExtension {
    pub read: Option<ReadFn>,
    pub write: Option<WriteFn>,
}

impl OdExtension {
    pub fn new() -> Self {
        Self {
            read: None,
            write: None,
        }
    }

    pub fn with_read(mut self, read: ReadFn) -> Self {
        self.read = Some(read);
        self
    }

    pub fn with_write(mut self, write: WriteFn) -> Self {
        self.write = Some(write);
        self
    }
}

impl Default for OdExtension {
    fn default() -> Self {
        Self::new()
    }
}

pub enum OdAccess {
    Default(Mutex<Vec<u8>>),
    Extended(Mutex<OdExtension>),
}
