//! Opaque identifiers for objects owned by the native layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, process-unique identifier of a native object (track, source,
/// renderer, texture).
///
/// The value is never dereferenced on this side of the boundary. Zero is the
/// null handle and is never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// The null handle
    pub const NULL: NativeHandle = NativeHandle(0);

    /// Wrap a raw value handed out by the native layer
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value, for passing back across the boundary
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Check whether this is the null handle
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl Default for NativeHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for NativeHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(NativeHandle::NULL.is_null());
        assert!(NativeHandle::default().is_null());
        assert!(!NativeHandle::from_raw(0x1000).is_null());
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(NativeHandle::from_raw(0x1000).to_string(), "0x1000");
        assert_eq!(NativeHandle::from(255).as_raw(), 255);
    }
}
