#![forbid(unsafe_code)]

//! Tracked attributes.
//!
//! An [`AttributeSlot`] owns one attribute name on a type. The slot itself is
//! shared by every instance of the type; the per-instance override lives in
//! the [`Instance`] keyed by [`SlotId`].
//!
//! # Invariants
//!
//! 1. Reads never have side effects.
//! 2. Every successful write or delete invalidates every subscriber for the
//!    written instance, and only for that instance.
//! 3. The subscriber set is fixed once the owning type is built.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::accessor::Accessor;
use crate::error::{Result, WatchError};
use crate::instance::Instance;
use crate::type_def::DefId;
use crate::watcher::WatcherId;

/// Stable identity of a slot within its owning type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u32);

impl SlotId {
    /// `index` must fit in `u32`; `TypeBuilder::build` checks this up front.
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "slot index overflow");
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

enum SlotStorage<V> {
    /// Override map with an optional type-level default. `None` means unset.
    Field { default: Option<V> },
    /// Pass-through to an accessor pair.
    Accessor(Rc<dyn Accessor<V>>),
}

/// Intercepting wrapper around one tracked attribute.
pub struct AttributeSlot<V> {
    id: SlotId,
    def: DefId,
    owner: String,
    name: String,
    storage: SlotStorage<V>,
    subscribers: BTreeSet<WatcherId>,
    implicit: bool,
}

impl<V> AttributeSlot<V> {
    pub(crate) fn field(
        id: SlotId,
        def: DefId,
        owner: &str,
        name: &str,
        default: Option<V>,
        implicit: bool,
    ) -> Self {
        Self {
            id,
            def,
            owner: owner.to_owned(),
            name: name.to_owned(),
            storage: SlotStorage::Field { default },
            subscribers: BTreeSet::new(),
            implicit,
        }
    }

    pub(crate) fn accessor(
        id: SlotId,
        def: DefId,
        owner: &str,
        name: &str,
        accessor: Rc<dyn Accessor<V>>,
    ) -> Self {
        Self {
            id,
            def,
            owner: owner.to_owned(),
            name: name.to_owned(),
            storage: SlotStorage::Accessor(accessor),
            subscribers: BTreeSet::new(),
            implicit: true,
        }
    }

    #[must_use]
    pub fn id(&self) -> SlotId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether reads and writes pass through to an accessor pair.
    #[must_use]
    pub fn is_accessor(&self) -> bool {
        matches!(self.storage, SlotStorage::Accessor(_))
    }

    /// Whether binding created this slot from a plain attribute, an accessor
    /// or an undeclared name.
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// The type-level default, if one was provided.
    #[must_use]
    pub fn default_value(&self) -> Option<&V> {
        match &self.storage {
            SlotStorage::Field { default } => default.as_ref(),
            SlotStorage::Accessor(_) => None,
        }
    }

    /// Class-level read: the default, or `AttributeNotFound` when unset.
    pub fn class_value(&self) -> Result<&V> {
        self.default_value()
            .ok_or_else(|| WatchError::not_found(&self.owner, &self.name))
    }

    /// Watchers invalidated by writes to this slot.
    pub fn subscribers(&self) -> impl Iterator<Item = WatcherId> + '_ {
        self.subscribers.iter().copied()
    }

    /// Add a subscriber. Returns `false` if it was already subscribed.
    pub(crate) fn subscribe(&mut self, watcher: WatcherId) -> bool {
        self.subscribers.insert(watcher)
    }
}

impl<V: Clone + 'static> AttributeSlot<V> {
    /// Read the value for `instance`: override, then default.
    pub fn get(&self, instance: &Instance<V>) -> Result<V> {
        instance.check_def(self.def, &self.owner)?;
        match &self.storage {
            SlotStorage::Field { default } => instance
                .stored(self.id)
                .or_else(|| default.clone())
                .ok_or_else(|| WatchError::not_found(&self.owner, &self.name)),
            SlotStorage::Accessor(accessor) => accessor.get(instance, &self.name),
        }
    }

    /// Store an override for `instance` and invalidate subscribers.
    pub fn set(&self, instance: &Instance<V>, value: V) -> Result<()> {
        instance.check_def(self.def, &self.owner)?;
        match &self.storage {
            SlotStorage::Field { .. } => instance.store(self.id, value),
            SlotStorage::Accessor(accessor) => accessor.set(instance, &self.name, value)?,
        }
        self.notify(instance);
        Ok(())
    }

    /// Remove the override for `instance` and invalidate subscribers.
    ///
    /// Fails with `AttributeNotFound` when there is no override; nothing is
    /// invalidated in that case.
    pub fn delete(&self, instance: &Instance<V>) -> Result<()> {
        instance.check_def(self.def, &self.owner)?;
        match &self.storage {
            SlotStorage::Field { .. } => {
                if instance.unstore(self.id).is_none() {
                    return Err(WatchError::not_found(&self.owner, &self.name));
                }
            }
            SlotStorage::Accessor(accessor) => accessor.delete(instance, &self.name)?,
        }
        self.notify(instance);
        Ok(())
    }

    fn notify(&self, instance: &Instance<V>) {
        let ty = instance.type_def();
        for &watcher in &self.subscribers {
            ty.watcher_by_id(watcher).discard(instance);
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for AttributeSlot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSlot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("default", &self.default_value())
            .field("accessor", &self.is_accessor())
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_def::TypeBuilder;
    use std::cell::Cell;

    fn counted(count: &Rc<Cell<u32>>) -> impl Fn(&Instance<i64>) -> Result<i64> + 'static {
        let count = Rc::clone(count);
        move |instance| {
            count.set(count.get() + 1);
            instance.get("base")
        }
    }

    #[test]
    fn read_falls_back_to_default() {
        let ty = TypeBuilder::new("Counter")
            .slot_with_default("base", 10_i64)
            .build()
            .unwrap();
        let counter = Instance::new(&ty);
        let slot = ty.slot("base").unwrap();

        assert_eq!(slot.get(&counter).unwrap(), 10);
        slot.set(&counter, 3).unwrap();
        assert_eq!(slot.get(&counter).unwrap(), 3);
        assert_eq!(*slot.class_value().unwrap(), 10);
    }

    #[test]
    fn unset_slot_read_fails() {
        let ty = TypeBuilder::<i64>::new("Counter").slot("base").build().unwrap();
        let counter = Instance::new(&ty);
        let err = ty.slot("base").unwrap().get(&counter).unwrap_err();
        assert!(err.is_not_found());
        assert!(ty.slot("base").unwrap().class_value().is_err());
    }

    #[test]
    fn delete_without_override_fails_and_keeps_cache() {
        let count = Rc::new(Cell::new(0));
        let ty = TypeBuilder::new("Counter")
            .slot_with_default("base", 1_i64)
            .watch("echo", ["base"], counted(&count))
            .build()
            .unwrap();
        let counter = Instance::new(&ty);

        assert_eq!(counter.get("echo").unwrap(), 1);
        assert!(counter.delete("base").unwrap_err().is_not_found());
        assert!(counter.is_cached("echo"));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn delete_restores_default_and_invalidates() {
        let count = Rc::new(Cell::new(0));
        let ty = TypeBuilder::new("Counter")
            .slot_with_default("base", 1_i64)
            .watch("echo", ["base"], counted(&count))
            .build()
            .unwrap();
        let counter = Instance::new(&ty);

        counter.set("base", 5).unwrap();
        assert_eq!(counter.get("echo").unwrap(), 5);
        counter.delete("base").unwrap();
        assert!(!counter.is_cached("echo"));
        assert_eq!(counter.get("echo").unwrap(), 1);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn write_is_scoped_to_instance() {
        let count = Rc::new(Cell::new(0));
        let ty = TypeBuilder::new("Counter")
            .slot_with_default("base", 1_i64)
            .watch("echo", ["base"], counted(&count))
            .build()
            .unwrap();
        let a = Instance::new(&ty);
        let b = Instance::new(&ty);

        assert_eq!(a.get("echo").unwrap(), 1);
        assert_eq!(b.get("echo").unwrap(), 1);
        a.set("base", 7).unwrap();

        assert!(!a.is_cached("echo"));
        assert!(b.is_cached("echo"));
        assert_eq!(b.get("echo").unwrap(), 1);
        assert_eq!(a.get("echo").unwrap(), 7);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn slot_rejects_foreign_instance() {
        let left = TypeBuilder::<i64>::new("Left").slot("x").build().unwrap();
        let right = TypeBuilder::<i64>::new("Right").slot("x").build().unwrap();
        let stranger = Instance::new(&right);

        let err = left.slot("x").unwrap().set(&stranger, 1).unwrap_err();
        assert_eq!(
            err,
            WatchError::WrongType {
                expected: "Left".into(),
                found: "Right".into(),
            }
        );
    }

    #[test]
    fn subscribers_list_watchers() {
        let ty = TypeBuilder::<i64>::new("Pair")
            .slot("a")
            .watch("first", ["a"], |i| i.get("a"))
            .watch("second", ["a"], |i| i.get("a"))
            .build()
            .unwrap();
        let slot = ty.slot("a").unwrap();
        let names: Vec<_> = slot
            .subscribers()
            .map(|id| ty.watcher_by_id(id).name().to_owned())
            .collect();
        assert_eq!(names, ["first", "second"]);
        assert!(!slot.is_implicit());
        assert!(!slot.is_accessor());
    }
}
