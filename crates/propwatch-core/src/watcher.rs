#![forbid(unsafe_code)]

//! Lazily computed, per-instance memoized values.
//!
//! # Design
//!
//! A [`Watcher`] is declared once per type with a compute function and a
//! watchlist of dependency names. Binding flattens the watchlist into the
//! set of [`AttributeSlot`](crate::AttributeSlot)s it ultimately depends on
//! and subscribes the watcher to each of them. The cached value itself lives
//! in the [`Instance`], so invalidating one instance never touches another.
//!
//! # Invariants
//!
//! 1. `get()` calls the compute function at most once per cache miss.
//! 2. A cached value stays until a subscribed slot is written or deleted on
//!    the same instance, or the watcher is explicitly invalidated.
//! 3. A value is cached only if no invalidation reached the watcher while it
//!    was being computed. A compute function that writes one of its own
//!    dependencies returns its result uncached.
//! 4. Watchers are read-only: `set()` and `delete()` always fail.
//!
//! # Failure Modes
//!
//! - **Compute function errors**: the error is returned to the caller and
//!   nothing is cached, so the next `get()` retries.
//! - **Compute function panics**: no `RefCell` borrow is held across the
//!   call, so the instance stays usable and the entry stays empty.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "tracing")]
use crate::logging::trace;
#[cfg(not(feature = "tracing"))]
use crate::trace;

use crate::error::{Result, WatchError};
use crate::instance::Instance;
use crate::slot::SlotId;
use crate::type_def::DefId;

/// Compute function signature.
pub type ComputeFn<V> = dyn Fn(&Instance<V>) -> Result<V>;

// ─── Metrics counters ────────────────────────────────────────────────────────

static COMPUTATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);
static INVALIDATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Total compute function invocations that returned a value.
#[must_use]
pub fn computations_total() -> u64 {
    COMPUTATIONS_TOTAL.load(Ordering::Relaxed)
}

/// Total cache entries dropped by invalidation.
#[must_use]
pub fn invalidations_total() -> u64 {
    INVALIDATIONS_TOTAL.load(Ordering::Relaxed)
}

// ─── Watcher ─────────────────────────────────────────────────────────────────

/// Stable identity of a watcher within its owning type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u32);

impl WatcherId {
    /// `index` must fit in `u32`; `TypeBuilder::build` checks this up front.
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "watcher index overflow");
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A computed, cached value with an explicit list of dependency names.
pub struct Watcher<V> {
    id: WatcherId,
    def: DefId,
    owner: String,
    name: String,
    qualified_name: String,
    watchlist: Vec<String>,
    resolved: BTreeSet<SlotId>,
    compute: Box<ComputeFn<V>>,
}

impl<V> Watcher<V> {
    pub(crate) fn new(
        id: WatcherId,
        def: DefId,
        owner: &str,
        name: String,
        watchlist: Vec<String>,
        resolved: BTreeSet<SlotId>,
        compute: Box<ComputeFn<V>>,
    ) -> Self {
        Self {
            id,
            def,
            owner: owner.to_owned(),
            qualified_name: format!("{owner}.{name}"),
            name,
            watchlist,
            resolved,
            compute,
        }
    }

    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Type.name`, for diagnostics.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Dependency names in declaration order.
    #[must_use]
    pub fn watchlist(&self) -> &[String] {
        &self.watchlist
    }

    /// Flattened slot dependencies, including those reached through other
    /// watchers.
    pub fn resolved_dependencies(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.resolved.iter().copied()
    }

    /// Always fails: computed values cannot be assigned.
    pub fn set(&self, _instance: &Instance<V>, _value: V) -> Result<()> {
        Err(WatchError::immutable(&self.qualified_name))
    }

    /// Always fails: computed values cannot be removed except by invalidation.
    pub fn delete(&self, _instance: &Instance<V>) -> Result<()> {
        Err(WatchError::immutable(&self.qualified_name))
    }

    /// Whether `instance` holds a cached value for this watcher.
    pub fn is_cached(&self, instance: &Instance<V>) -> Result<bool> {
        instance.check_def(self.def, &self.owner)?;
        Ok(instance.has_cached(self.id))
    }

    /// Drop the cached value for `instance`. Returns whether one existed.
    pub fn invalidate(&self, instance: &Instance<V>) -> Result<bool> {
        instance.check_def(self.def, &self.owner)?;
        Ok(self.discard(instance))
    }

    pub(crate) fn discard(&self, instance: &Instance<V>) -> bool {
        instance.bump_epoch(self.id);
        let removed = instance.uncache(self.id);
        if removed {
            INVALIDATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
            trace!(
                watcher = %self.qualified_name,
                instance = instance.id().raw(),
                "cache invalidated"
            );
        }
        removed
    }
}

impl<V: Clone + 'static> Watcher<V> {
    /// Cached value for `instance`, computing and caching it on a miss.
    pub fn get(&self, instance: &Instance<V>) -> Result<V> {
        instance.check_def(self.def, &self.owner)?;
        if let Some(value) = instance.cached(self.id) {
            trace!(
                watcher = %self.qualified_name,
                instance = instance.id().raw(),
                "cache hit"
            );
            return Ok(value);
        }
        trace!(
            watcher = %self.qualified_name,
            instance = instance.id().raw(),
            "cache miss"
        );
        let epoch = instance.epoch(self.id);
        let value = (self.compute)(instance)?;
        COMPUTATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
        if instance.epoch(self.id) == epoch {
            instance.cache(self.id, value.clone());
        } else {
            trace!(
                watcher = %self.qualified_name,
                instance = instance.id().raw(),
                "dependency written during compute; result not cached"
            );
        }
        Ok(value)
    }
}

impl<V> fmt::Display for Watcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Watcher '{}'>", self.qualified_name)
    }
}

impl<V> fmt::Debug for Watcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("qualified_name", &self.qualified_name)
            .field("watchlist", &self.watchlist)
            .field("resolved", &self.resolved)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
