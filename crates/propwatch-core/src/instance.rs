#![forbid(unsafe_code)]

//! Per-instance state.
//!
//! An [`Instance`] holds everything that varies between instances of one
//! [`TypeDef`]: slot overrides keyed by [`SlotId`], watcher cache entries
//! and invalidation epochs keyed by [`WatcherId`], and untracked fields
//! keyed by name. Nothing
//! outside the instance references this state, so dropping the instance
//! reclaims it.
//!
//! `Instance` uses `RefCell` internally and is neither `Send` nor `Sync`.
//! Borrows are never held across calls into compute functions or accessors,
//! so those may freely read and write the same instance.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::error::{Result, WatchError};
use crate::slot::SlotId;
use crate::type_def::{DefId, Member, TypeDef};
use crate::watcher::WatcherId;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique instance identity, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// One instance of a built type.
pub struct Instance<V> {
    id: InstanceId,
    ty: Rc<TypeDef<V>>,
    overrides: RefCell<AHashMap<SlotId, V>>,
    cache: RefCell<AHashMap<WatcherId, V>>,
    /// Bumped on every invalidation, cached or not.
    epochs: RefCell<AHashMap<WatcherId, u64>>,
    fields: RefCell<AHashMap<String, V>>,
}

impl<V> Instance<V> {
    /// Create an instance without running the type's initializer.
    #[must_use]
    pub fn new(ty: &Rc<TypeDef<V>>) -> Self {
        Self {
            id: InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)),
            ty: Rc::clone(ty),
            overrides: RefCell::new(AHashMap::new()),
            cache: RefCell::new(AHashMap::new()),
            epochs: RefCell::new(AHashMap::new()),
            fields: RefCell::new(AHashMap::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[must_use]
    pub fn type_def(&self) -> &Rc<TypeDef<V>> {
        &self.ty
    }

    /// Whether the watcher `name` currently holds a cached value.
    /// `false` for names that are not watchers.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        match self.ty.lookup(name) {
            Some(Member::Watcher(id)) => self.has_cached(*id),
            _ => false,
        }
    }

    /// Drop the cached value of the watcher `name`. Returns whether one
    /// existed.
    pub fn invalidate(&self, name: &str) -> Result<bool> {
        match self.ty.lookup(name) {
            Some(Member::Watcher(id)) => Ok(self.ty.watcher_by_id(*id).discard(self)),
            _ => Err(WatchError::not_found(self.ty.name(), name)),
        }
    }

    pub(crate) fn check_def(&self, def: DefId, expected: &str) -> Result<()> {
        if self.ty.id() == def {
            Ok(())
        } else {
            Err(WatchError::WrongType {
                expected: expected.to_owned(),
                found: self.ty.name().to_owned(),
            })
        }
    }

    pub(crate) fn store(&self, slot: SlotId, value: V) {
        self.overrides.borrow_mut().insert(slot, value);
    }

    pub(crate) fn unstore(&self, slot: SlotId) -> Option<V> {
        self.overrides.borrow_mut().remove(&slot)
    }

    pub(crate) fn cache(&self, watcher: WatcherId, value: V) {
        self.cache.borrow_mut().insert(watcher, value);
    }

    pub(crate) fn uncache(&self, watcher: WatcherId) -> bool {
        self.cache.borrow_mut().remove(&watcher).is_some()
    }

    pub(crate) fn has_cached(&self, watcher: WatcherId) -> bool {
        self.cache.borrow().contains_key(&watcher)
    }

    pub(crate) fn epoch(&self, watcher: WatcherId) -> u64 {
        self.epochs.borrow().get(&watcher).copied().unwrap_or(0)
    }

    pub(crate) fn bump_epoch(&self, watcher: WatcherId) {
        let mut epochs = self.epochs.borrow_mut();
        let epoch = epochs.entry(watcher).or_insert(0);
        *epoch = epoch.wrapping_add(1);
    }
}

impl<V: Clone + 'static> Instance<V> {
    /// Read `name`: tracked slot, computed value, accessor, or untracked
    /// field falling back to the class-level value.
    pub fn get(&self, name: &str) -> Result<V> {
        match self.ty.lookup(name) {
            Some(Member::Slot(id)) => self.ty.slot_by_id(*id).get(self),
            Some(Member::Watcher(id)) => self.ty.watcher_by_id(*id).get(self),
            Some(Member::Accessor(accessor)) => accessor.get(self, name),
            Some(Member::Plain(class_value)) => Ok(self
                .field(name)
                .unwrap_or_else(|| class_value.clone())),
            None => self
                .field(name)
                .ok_or_else(|| WatchError::not_found(self.ty.name(), name)),
        }
    }

    /// Write `name`. Tracked slots invalidate their subscribers; computed
    /// values reject the write; anything else is stored untracked.
    pub fn set(&self, name: &str, value: V) -> Result<()> {
        match self.ty.lookup(name) {
            Some(Member::Slot(id)) => self.ty.slot_by_id(*id).set(self, value),
            Some(Member::Watcher(id)) => self.ty.watcher_by_id(*id).set(self, value),
            Some(Member::Accessor(accessor)) => accessor.set(self, name, value),
            Some(Member::Plain(_)) | None => {
                self.fields.borrow_mut().insert(name.to_owned(), value);
                Ok(())
            }
        }
    }

    /// Delete `name` for this instance.
    pub fn delete(&self, name: &str) -> Result<()> {
        match self.ty.lookup(name) {
            Some(Member::Slot(id)) => self.ty.slot_by_id(*id).delete(self),
            Some(Member::Watcher(id)) => self.ty.watcher_by_id(*id).delete(self),
            Some(Member::Accessor(accessor)) => accessor.delete(self, name),
            Some(Member::Plain(_)) | None => match self.fields.borrow_mut().remove(name) {
                Some(_) => Ok(()),
                None => Err(WatchError::not_found(self.ty.name(), name)),
            },
        }
    }

    pub(crate) fn stored(&self, slot: SlotId) -> Option<V> {
        self.overrides.borrow().get(&slot).cloned()
    }

    pub(crate) fn cached(&self, watcher: WatcherId) -> Option<V> {
        self.cache.borrow().get(&watcher).cloned()
    }

    fn field(&self, name: &str) -> Option<V> {
        self.fields.borrow().get(name).cloned()
    }
}

impl<V> fmt::Debug for Instance<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("type", &self.ty.name())
            .field("overrides", &self.overrides.borrow().len())
            .field("cached", &self.cache.borrow().len())
            .field("fields", &self.fields.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_def::TypeBuilder;
    use std::cell::Cell;

    #[test]
    fn untracked_field_shadows_class_value() {
        let ty = TypeBuilder::<i64>::new("Example")
            .class_attr("limit", 10)
            .build()
            .unwrap();
        let example = Instance::new(&ty);

        assert_eq!(example.get("limit").unwrap(), 10);
        example.set("limit", 3).unwrap();
        assert_eq!(example.get("limit").unwrap(), 3);
        example.delete("limit").unwrap();
        assert_eq!(example.get("limit").unwrap(), 10);
        assert!(example.delete("limit").unwrap_err().is_not_found());
    }

    #[test]
    fn unknown_name_is_not_found_until_set() {
        let ty = TypeBuilder::<i64>::new("Example").build().unwrap();
        let example = Instance::new(&ty);

        let err = example.get("anything").unwrap_err();
        assert_eq!(err, WatchError::not_found("Example", "anything"));
        example.set("anything", 1).unwrap();
        assert_eq!(example.get("anything").unwrap(), 1);
    }

    #[test]
    fn untracked_write_never_invalidates() {
        let count = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&count);
        let ty = TypeBuilder::<i64>::new("Example")
            .slot_with_default("x", 1)
            .class_attr("other", 0)
            .watch("view", ["x"], move |e| {
                counter.set(counter.get() + 1);
                e.get("x")
            })
            .build()
            .unwrap();
        let example = Instance::new(&ty);

        assert_eq!(example.get("view").unwrap(), 1);
        example.set("other", 5).unwrap();
        example.set("brand_new", 5).unwrap();
        assert!(example.is_cached("view"));
        assert_eq!(example.get("view").unwrap(), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn manual_invalidate_by_name() {
        let ty = TypeBuilder::<i64>::new("Example")
            .slot_with_default("x", 1)
            .watch("view", ["x"], |e| e.get("x"))
            .build()
            .unwrap();
        let example = Instance::new(&ty);

        assert!(!example.invalidate("view").unwrap());
        let _ = example.get("view").unwrap();
        assert!(example.invalidate("view").unwrap());
        assert!(example.invalidate("x").unwrap_err().is_not_found());
    }

    #[test]
    fn compute_may_write_untracked_state() {
        let ty = TypeBuilder::<i64>::new("Example")
            .slot_with_default("x", 2)
            .watch("square", ["x"], |e| {
                let x = e.get("x")?;
                e.set("last_input", x)?;
                Ok(x * x)
            })
            .build()
            .unwrap();
        let example = Instance::new(&ty);

        assert_eq!(example.get("square").unwrap(), 4);
        assert_eq!(example.get("last_input").unwrap(), 2);
    }

    #[test]
    fn ids_are_unique() {
        let ty = TypeBuilder::<i64>::new("Example").build().unwrap();
        let a = Instance::new(&ty);
        let b = Instance::new(&ty);
        assert_ne!(a.id(), b.id());
        let dbg = format!("{a:?}");
        assert!(dbg.contains("Example"));
    }
}
