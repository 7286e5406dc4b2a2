#![forbid(unsafe_code)]

//! Type definitions: the explicit attribute registry.
//!
//! A [`TypeBuilder`] collects declarations in order. [`TypeBuilder::build`]
//! runs the binder once, after every declaration is known, and freezes the
//! result into an immutable [`TypeDef`] shared by all of its instances.
//! Binding errors therefore surface before any instance can exist.
//!
//! Types are flat: names resolve only against the type's own table.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

#[cfg(feature = "tracing")]
use crate::logging::{debug, warn};
#[cfg(not(feature = "tracing"))]
use crate::{debug, warn};

use crate::accessor::Accessor;
use crate::binder::{Binder, WatchSpec};
use crate::error::{Result, WatchError};
use crate::instance::Instance;
use crate::slot::{AttributeSlot, SlotId};
use crate::watcher::{ComputeFn, Watcher, WatcherId};

static NEXT_DEF_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a built type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(u64);

impl DefId {
    fn next() -> Self {
        Self(NEXT_DEF_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Instance initializer signature.
pub type InitFn<V> = dyn Fn(&Instance<V>) -> Result<()>;

/// One entry of a built type's attribute table.
pub(crate) enum Member<V> {
    /// Untracked class-level value; instances may shadow it.
    Plain(V),
    /// Untracked accessor pair.
    Accessor(Rc<dyn Accessor<V>>),
    Slot(SlotId),
    Watcher(WatcherId),
}

/// Borrowed view of a member, for class-level introspection.
pub enum MemberRef<'a, V> {
    Plain(&'a V),
    Accessor(&'a dyn Accessor<V>),
    Slot(&'a AttributeSlot<V>),
    Watcher(&'a Watcher<V>),
}

impl<V> fmt::Debug for MemberRef<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain"),
            Self::Accessor(_) => f.write_str("Accessor"),
            Self::Slot(slot) => write!(f, "Slot({})", slot.name()),
            Self::Watcher(watcher) => write!(f, "{watcher}"),
        }
    }
}

enum Declaration<V> {
    Plain(V),
    Slot(Option<V>),
    Accessor(Rc<dyn Accessor<V>>),
    Watcher {
        watchlist: Vec<String>,
        compute: Box<ComputeFn<V>>,
    },
}

/// Collects the declarations of one type.
///
/// Re-declaring a name replaces the earlier declaration in place.
pub struct TypeBuilder<V> {
    name: String,
    declarations: Vec<(String, Declaration<V>)>,
    init: Option<Box<InitFn<V>>>,
}

impl<V: Clone + 'static> TypeBuilder<V> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declarations: Vec::new(),
            init: None,
        }
    }

    /// Untracked class-level attribute. Becomes a tracked slot with `value`
    /// as its default if any watcher names it.
    #[must_use]
    pub fn class_attr(self, name: impl Into<String>, value: V) -> Self {
        self.declare(name.into(), Declaration::Plain(value))
    }

    /// Tracked slot with no default.
    #[must_use]
    pub fn slot(self, name: impl Into<String>) -> Self {
        self.declare(name.into(), Declaration::Slot(None))
    }

    /// Tracked slot with a type-level default.
    #[must_use]
    pub fn slot_with_default(self, name: impl Into<String>, default: V) -> Self {
        self.declare(name.into(), Declaration::Slot(Some(default)))
    }

    /// Accessor-backed attribute.
    #[must_use]
    pub fn accessor(self, name: impl Into<String>, accessor: impl Accessor<V> + 'static) -> Self {
        self.declare(name.into(), Declaration::Accessor(Rc::new(accessor)))
    }

    /// Declare a computed value recomputed whenever anything in `watchlist`
    /// (directly or through other watchers) changes.
    #[must_use]
    pub fn watch<I, S>(
        self,
        name: impl Into<String>,
        watchlist: I,
        compute: impl Fn(&Instance<V>) -> Result<V> + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let watchlist = watchlist.into_iter().map(Into::into).collect();
        self.declare(
            name.into(),
            Declaration::Watcher {
                watchlist,
                compute: Box::new(compute),
            },
        )
    }

    /// Initializer run by [`TypeDef::instantiate`].
    #[must_use]
    pub fn init(mut self, init: impl Fn(&Instance<V>) -> Result<()> + 'static) -> Self {
        self.init = Some(Box::new(init));
        self
    }

    fn declare(mut self, name: String, declaration: Declaration<V>) -> Self {
        if let Some(entry) = self.declarations.iter_mut().find(|(n, _)| *n == name) {
            warn!(owner = %self.name, name = %name, "declaration replaced");
            entry.1 = declaration;
        } else {
            self.declarations.push((name, declaration));
        }
        self
    }

    /// Resolve every watchlist and freeze the type.
    ///
    /// Fails with `Configuration` on a dependency cycle, a watched
    /// read-only accessor, or more members than fit in a 32-bit id.
    pub fn build(self) -> Result<Rc<TypeDef<V>>> {
        // Upper bound on slots and watchers: every declaration plus one
        // implicit slot per watchlist entry.
        let bound = self.declarations.len()
            + self
                .declarations
                .iter()
                .map(|(_, declaration)| match declaration {
                    Declaration::Watcher { watchlist, .. } => watchlist.len(),
                    _ => 0,
                })
                .sum::<usize>();
        ensure_id_space(&self.name, bound)?;

        let def = DefId::next();
        let owner = self.name;
        let mut members = AHashMap::with_capacity(self.declarations.len());
        let mut order = Vec::with_capacity(self.declarations.len());
        let mut slots = Vec::new();
        let mut pending = Vec::new();

        for (name, declaration) in self.declarations {
            let member = match declaration {
                Declaration::Plain(value) => Member::Plain(value),
                Declaration::Accessor(accessor) => Member::Accessor(accessor),
                Declaration::Slot(default) => {
                    let id = SlotId::from_index(slots.len());
                    slots.push(AttributeSlot::field(id, def, &owner, &name, default, false));
                    Member::Slot(id)
                }
                Declaration::Watcher { watchlist, compute } => {
                    let id = WatcherId::from_index(pending.len());
                    pending.push((name.clone(), watchlist, compute));
                    Member::Watcher(id)
                }
            };
            order.push(name.clone());
            members.insert(name, member);
        }

        let specs: Vec<WatchSpec<'_>> = pending
            .iter()
            .map(|(name, watchlist, _)| WatchSpec {
                name: name.as_str(),
                watchlist: watchlist.as_slice(),
            })
            .collect();
        let resolved =
            Binder::new(def, &owner, &mut members, &mut order, &mut slots, &specs).bind()?;

        let watchers = pending
            .into_iter()
            .zip(resolved)
            .enumerate()
            .map(|(index, ((name, watchlist, compute), deps))| {
                Watcher::new(
                    WatcherId::from_index(index),
                    def,
                    &owner,
                    name,
                    watchlist,
                    deps,
                    compute,
                )
            })
            .collect::<Vec<_>>();

        debug!(
            owner = %owner,
            slots = slots.len(),
            watchers = watchers.len(),
            "type built"
        );
        Ok(Rc::new(TypeDef {
            id: def,
            name: owner,
            members,
            order,
            slots,
            watchers,
            init: self.init,
        }))
    }
}

fn ensure_id_space(owner: &str, members: usize) -> Result<()> {
    if u32::try_from(members).is_ok() {
        Ok(())
    } else {
        Err(WatchError::configuration(
            owner,
            format!("{members} members exceed the 32-bit id space"),
        ))
    }
}

/// A built type: attribute table, slots and watchers.
pub struct TypeDef<V> {
    id: DefId,
    name: String,
    members: AHashMap<String, Member<V>>,
    order: Vec<String>,
    slots: Vec<AttributeSlot<V>>,
    watchers: Vec<Watcher<V>>,
    init: Option<Box<InitFn<V>>>,
}

impl<V> TypeDef<V> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> DefId {
        self.id
    }

    /// Class-level lookup. Watchers come back as themselves, not as values.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<MemberRef<'_, V>> {
        Some(match self.members.get(name)? {
            Member::Plain(value) => MemberRef::Plain(value),
            Member::Accessor(accessor) => MemberRef::Accessor(accessor.as_ref()),
            Member::Slot(id) => MemberRef::Slot(self.slot_by_id(*id)),
            Member::Watcher(id) => MemberRef::Watcher(self.watcher_by_id(*id)),
        })
    }

    #[must_use]
    pub fn watcher(&self, name: &str) -> Option<&Watcher<V>> {
        match self.members.get(name)? {
            Member::Watcher(id) => Some(self.watcher_by_id(*id)),
            _ => None,
        }
    }

    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&AttributeSlot<V>> {
        match self.members.get(name)? {
            Member::Slot(id) => Some(self.slot_by_id(*id)),
            _ => None,
        }
    }

    /// Member names in declaration order; implicitly created slots last.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn watchers(&self) -> impl Iterator<Item = &Watcher<V>> {
        self.watchers.iter()
    }

    pub fn slots(&self) -> impl Iterator<Item = &AttributeSlot<V>> {
        self.slots.iter()
    }

    /// Watchers invalidated by a write to `name`. Empty for untracked names.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&Watcher<V>> {
        self.slot(name)
            .map(|slot| slot.subscribers().map(|id| self.watcher_by_id(id)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Member<V>> {
        self.members.get(name)
    }

    pub(crate) fn slot_by_id(&self, id: SlotId) -> &AttributeSlot<V> {
        &self.slots[id.index()]
    }

    pub(crate) fn watcher_by_id(&self, id: WatcherId) -> &Watcher<V> {
        &self.watchers[id.index()]
    }

    /// Every slot any watcher of this type depends on.
    #[must_use]
    pub fn watched_slots(&self) -> BTreeSet<SlotId> {
        self.watchers
            .iter()
            .flat_map(|watcher| watcher.resolved_dependencies())
            .collect()
    }
}

impl<V: Clone + 'static> TypeDef<V> {
    /// Create an instance and run the initializer, if any.
    pub fn instantiate(ty: &Rc<Self>) -> Result<Instance<V>> {
        let instance = Instance::new(ty);
        if let Some(init) = &ty.init {
            init(&instance)?;
        }
        Ok(instance)
    }
}

impl<V> fmt::Debug for TypeDef<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.name)
            .field("members", &self.order)
            .field("slots", &self.slots.len())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}
