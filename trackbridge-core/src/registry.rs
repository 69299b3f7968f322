//! Process-wide table from native handles to the wrappers that own them
//!
//! Native callbacks only carry the raw handle of the object they concern.
//! The registry lets them find the managed wrapper again without keeping it
//! alive: entries hold a [`Weak`] reference, so a wrapper that has been
//! dropped resolves to [`CoreError::NotFound`] instead of being revived.
//!
//! Entries are inserted by the wrapper's constructor and removed exactly once
//! by its disposal path. Inserting a handle that is already present is a
//! broken invariant (the native layer reused a live handle or a disposal
//! skipped its unregister) and is reported as [`CoreError::RegistryConflict`].

use crate::error::{CoreError, CoreResult};
use crate::handle::NativeHandle;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::any::{type_name, Any};
use std::sync::{Arc, Weak};
use tracing::{error, trace, warn};

type WeakWrapper = Weak<dyn Any + Send + Sync>;

struct RegistryEntry {
    wrapper: WeakWrapper,
    type_name: &'static str,
}

/// Concurrent handle table with weak ownership
///
/// Safe to register, resolve and unregister from any number of threads
/// without external locking.
#[derive(Default)]
pub struct HandleRegistry {
    entries: DashMap<NativeHandle, RegistryEntry>,
}

/// Point-in-time description of one registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntryInfo {
    /// Registered handle
    pub handle: NativeHandle,
    /// Type name of the wrapper registered under the handle
    pub type_name: &'static str,
    /// Whether the wrapper is still alive
    pub alive: bool,
}

impl HandleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `wrapper` under `handle`
    ///
    /// Fails with [`CoreError::RegistryConflict`] if the handle is already
    /// present, even when the previous wrapper has since been dropped.
    pub fn register<T>(&self, handle: NativeHandle, wrapper: &Arc<T>) -> CoreResult<()>
    where
        T: Any + Send + Sync,
    {
        if handle.is_null() {
            return Err(CoreError::InvalidState {
                expected: "non-null native handle".to_string(),
                actual: "null handle".to_string(),
            });
        }

        match self.entries.entry(handle) {
            Entry::Occupied(existing) => {
                error!(
                    "Native handle {} registered twice (held by {}, new {})",
                    handle,
                    existing.get().type_name,
                    type_name::<T>()
                );
                Err(CoreError::RegistryConflict { handle })
            }
            Entry::Vacant(slot) => {
                let weak: Weak<T> = Arc::downgrade(wrapper);
                let weak: WeakWrapper = weak;
                slot.insert(RegistryEntry {
                    wrapper: weak,
                    type_name: type_name::<T>(),
                });
                trace!("Registered {} as {}", handle, type_name::<T>());
                Ok(())
            }
        }
    }

    /// Resolve `handle` to a live wrapper of type `T`
    ///
    /// The returned [`Arc`] is a temporary strong reference; callers must not
    /// store it beyond the operation they are performing.
    pub fn resolve<T>(&self, handle: NativeHandle) -> CoreResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let wrapper = {
            let entry = self
                .entries
                .get(&handle)
                .ok_or(CoreError::NotFound { handle })?;
            entry.wrapper.upgrade()
        };

        let wrapper = wrapper.ok_or(CoreError::NotFound { handle })?;
        wrapper.downcast::<T>().map_err(|_| CoreError::TypeMismatch {
            handle,
            expected: type_name::<T>(),
        })
    }

    /// Remove the entry for `handle`, returning whether one was present
    pub fn unregister(&self, handle: NativeHandle) -> bool {
        let removed = self.entries.remove(&handle).is_some();
        if removed {
            trace!("Unregistered {}", handle);
        } else {
            warn!("Unregister of unknown native handle {}", handle);
        }
        removed
    }

    /// Check whether `handle` currently has an entry (live or not)
    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of entries, including entries whose wrapper is gone
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect every live wrapper of type `T`
    pub fn live<T>(&self) -> Vec<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        // Upgrade outside the shard locks: dropping the last strong reference
        // of a wrapper runs its destructor.
        let candidates: Vec<WeakWrapper> = self
            .entries
            .iter()
            .filter(|entry| entry.type_name == type_name::<T>())
            .map(|entry| entry.wrapper.clone())
            .collect();

        candidates
            .into_iter()
            .filter_map(|weak| weak.upgrade())
            .filter_map(|wrapper| wrapper.downcast::<T>().ok())
            .collect()
    }

    /// Describe every entry
    pub fn snapshot(&self) -> Vec<RegistryEntryInfo> {
        let mut entries: Vec<RegistryEntryInfo> = self
            .entries
            .iter()
            .map(|entry| RegistryEntryInfo {
                handle: *entry.key(),
                type_name: entry.type_name,
                alive: entry.wrapper.strong_count() > 0,
            })
            .collect();
        entries.sort_by_key(|info| info.handle);
        entries
    }

    /// Drop entries whose wrapper no longer exists and return their handles
    ///
    /// A dead entry means a wrapper was dropped without being disposed.
    pub fn sweep_dead(&self) -> Vec<NativeHandle> {
        let mut dead = Vec::new();
        self.entries.retain(|handle, entry| {
            let alive = entry.wrapper.strong_count() > 0;
            if !alive {
                warn!(
                    "Leaked registry entry {} ({} dropped without dispose)",
                    handle, entry.type_name
                );
                dead.push(*handle);
            }
            alive
        });
        dead.sort();
        dead
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
