//! Marshaling of native-thread callbacks onto the main execution context
//!
//! Native decode and encode threads must never touch graphics resources.
//! Instead they [`post`](DispatcherHandle::post) a deferred action tagged with
//! the handle it concerns, and the single consumer (the host's per-frame
//! update on the main thread) runs them in [`Dispatcher::drain`].
//!
//! Ordering: all actions go through one FIFO queue, so two actions posted for
//! the same handle run in the order they were posted, whichever threads
//! posted them. Nothing stronger is promised across handles.
//!
//! Teardown: once the [`Dispatcher`] is shut down or dropped, queued actions
//! are discarded without running and later posts are rejected.

use crate::error::{CoreError, CoreResult};
use crate::handle::NativeHandle;
use crate::registry::HandleRegistry;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Deferred work executed on the consumer thread
pub type DispatchAction = Box<dyn FnOnce() + Send + 'static>;

struct Dispatched {
    handle: NativeHandle,
    action: DispatchAction,
}

#[derive(Default)]
struct DispatcherCounters {
    posted: AtomicU64,
    executed: AtomicU64,
    dropped: AtomicU64,
    panicked: AtomicU64,
}

struct DispatcherShared {
    consumer: ThreadId,
    closed: AtomicBool,
    counters: DispatcherCounters,
}

/// Dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Actions accepted by `post`
    pub posted: u64,
    /// Actions run by the consumer
    pub executed: u64,
    /// Actions rejected after teardown or discarded while still queued
    pub dropped: u64,
    /// Executed actions that panicked
    pub panicked: u64,
}

impl DispatcherStats {
    /// Actions accepted but neither executed nor dropped yet
    pub fn pending(&self) -> u64 {
        self.posted
            .saturating_sub(self.executed)
            .saturating_sub(self.dropped)
    }
}

/// Consumer side of the cross-thread dispatcher
///
/// Bound to the thread that created it. Not clonable: there is exactly one
/// consumer.
pub struct Dispatcher {
    receiver: mpsc::UnboundedReceiver<Dispatched>,
    handle: DispatcherHandle,
}

/// Producer side of the cross-thread dispatcher
///
/// Cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::UnboundedSender<Dispatched>,
    shared: Arc<DispatcherShared>,
}

impl Dispatcher {
    /// Create a dispatcher whose consumer is the calling thread
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(DispatcherShared {
            consumer: thread::current().id(),
            closed: AtomicBool::new(false),
            counters: DispatcherCounters::default(),
        });

        debug!("Dispatcher created on {:?}", shared.consumer);
        Self {
            receiver,
            handle: DispatcherHandle { sender, shared },
        }
    }

    /// Get a producer handle
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Run every action queued so far, in posting order
    ///
    /// Returns the number of actions executed. Actions posted while draining
    /// are picked up in the same call.
    pub fn drain(&mut self) -> usize {
        if !self.handle.is_consumer_thread() {
            warn!(
                "Dispatcher drained from {:?}, consumer is {:?}",
                thread::current().id(),
                self.handle.shared.consumer
            );
        }

        let counters = &self.handle.shared.counters;
        let mut executed = 0;
        while let Ok(Dispatched { handle, action }) = self.receiver.try_recv() {
            trace!("Running dispatched action for {}", handle);
            if catch_unwind(AssertUnwindSafe(action)).is_err() {
                error!("Dispatched action for {} panicked", handle);
                counters.panicked.fetch_add(1, Ordering::Relaxed);
            }
            counters.executed.fetch_add(1, Ordering::Relaxed);
            executed += 1;
        }
        executed
    }

    /// Tear down the consumer side, discarding queued actions
    ///
    /// Returns the number of actions discarded. Idempotent.
    pub fn shutdown(&mut self) -> usize {
        let shared = &self.handle.shared;
        if shared.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        self.receiver.close();
        let mut discarded = 0;
        while let Ok(Dispatched { handle, action }) = self.receiver.try_recv() {
            trace!("Discarding dispatched action for {}", handle);
            drop(action);
            discarded += 1;
        }
        shared
            .counters
            .dropped
            .fetch_add(discarded as u64, Ordering::Relaxed);

        debug!("Dispatcher shut down, {} pending actions discarded", discarded);
        discarded
    }

    /// Check whether the consumer has been shut down
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Get dispatcher counters
    pub fn stats(&self) -> DispatcherStats {
        self.handle.stats()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("consumer", &self.handle.shared.consumer)
            .field("stats", &self.stats())
            .finish()
    }
}

impl DispatcherHandle {
    /// Schedule `action` to run on the consumer thread
    ///
    /// Never blocks. Fails with [`CoreError::DispatcherClosed`] if the
    /// consumer has been torn down, in which case the action is dropped
    /// without running.
    pub fn post<F>(&self, handle: NativeHandle, action: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let counters = &self.shared.counters;
        if self.is_closed() {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(CoreError::DispatcherClosed);
        }

        let dispatched = Dispatched {
            handle,
            action: Box::new(action),
        };
        match self.sender.send(dispatched) {
            Ok(()) => {
                counters.posted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(CoreError::DispatcherClosed)
            }
        }
    }

    /// Schedule `action` against the wrapper registered under `handle`
    ///
    /// The wrapper is resolved when the action is drained, not when it is
    /// posted. If it has been unregistered or dropped by then, the action is
    /// a no-op.
    pub fn post_resolved<T, F>(
        &self,
        registry: &Arc<HandleRegistry>,
        handle: NativeHandle,
        action: F,
    ) -> CoreResult<()>
    where
        T: Any + Send + Sync,
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        let registry = Arc::clone(registry);
        self.post(handle, move || match registry.resolve::<T>(handle) {
            Ok(wrapper) => action(wrapper),
            Err(e) => trace!("Skipping dispatched action: {}", e),
        })
    }

    /// Check whether the calling thread is the consumer thread
    pub fn is_consumer_thread(&self) -> bool {
        thread::current().id() == self.shared.consumer
    }

    /// Check whether the consumer has been shut down
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Get dispatcher counters
    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.counters;
        DispatcherStats {
            posted: counters.posted.load(Ordering::Relaxed),
            executed: counters.executed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("consumer", &self.shared.consumer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
