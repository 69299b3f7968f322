//! # TrackBridge Core
//!
//! Lifetime and threading primitives for bridging a native media engine to
//! a host that owns graphics resources on a single main thread:
//!
//! - [`NativeHandle`]: opaque identifier of a native-side object
//! - [`HandleRegistry`]: weak table resolving native handles back to wrappers
//! - [`Dispatcher`] / [`DispatcherHandle`]: many-producer, single-consumer
//!   queue carrying native callbacks onto the main thread

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod registry;

// Re-export main types
pub use dispatcher::{DispatchAction, Dispatcher, DispatcherHandle, DispatcherStats};
pub use error::{CoreError, CoreResult};
pub use handle::NativeHandle;
pub use registry::{HandleRegistry, RegistryEntryInfo};
