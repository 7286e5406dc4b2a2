#![forbid(unsafe_code)]

//! Watchlist resolution.
//!
//! Runs once per type inside [`TypeBuilder::build`](crate::TypeBuilder::build),
//! after every declaration is known, so watchlists may name members declared
//! later in the builder chain.
//!
//! Resolution is a depth-first pass over the watcher graph. A watchlist entry
//! naming another watcher inlines that watcher's resolved slots rather than
//! subscribing to its cache, so a write fires each dependent watcher exactly
//! once and declaration order between watchers never matters. Each watcher
//! is resolved exactly once; reaching one that is still on the stack is a
//! cycle and fails the build.

use std::collections::BTreeSet;
use std::rc::Rc;

use ahash::AHashMap;

#[cfg(feature = "tracing")]
use crate::logging::debug;
#[cfg(not(feature = "tracing"))]
use crate::debug;

use crate::accessor::Accessor;
use crate::error::{Result, WatchError};
use crate::slot::{AttributeSlot, SlotId};
use crate::type_def::{DefId, Member};
use crate::watcher::WatcherId;

/// Name and watchlist of one declared watcher, indexed by [`WatcherId`].
#[derive(Clone, Copy)]
pub(crate) struct WatchSpec<'a> {
    pub name: &'a str,
    pub watchlist: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    Visiting,
    Done,
}

pub(crate) struct Binder<'a, V> {
    def: DefId,
    owner: &'a str,
    members: &'a mut AHashMap<String, Member<V>>,
    order: &'a mut Vec<String>,
    slots: &'a mut Vec<AttributeSlot<V>>,
    specs: &'a [WatchSpec<'a>],
    state: Vec<Visit>,
    resolved: Vec<BTreeSet<SlotId>>,
    path: Vec<WatcherId>,
}

impl<'a, V> Binder<'a, V> {
    pub(crate) fn new(
        def: DefId,
        owner: &'a str,
        members: &'a mut AHashMap<String, Member<V>>,
        order: &'a mut Vec<String>,
        slots: &'a mut Vec<AttributeSlot<V>>,
        specs: &'a [WatchSpec<'a>],
    ) -> Self {
        Self {
            def,
            owner,
            members,
            order,
            slots,
            specs,
            state: vec![Visit::Pending; specs.len()],
            resolved: vec![BTreeSet::new(); specs.len()],
            path: Vec::new(),
        }
    }

    /// Resolve every watcher and subscribe it to its flattened slots.
    ///
    /// Returns the resolved slot set of each watcher, indexed by id.
    pub(crate) fn bind(mut self) -> Result<Vec<BTreeSet<SlotId>>> {
        for index in 0..self.specs.len() {
            self.resolve(WatcherId::from_index(index))?;
        }
        for (index, deps) in self.resolved.iter().enumerate() {
            for slot in deps {
                self.slots[slot.index()].subscribe(WatcherId::from_index(index));
            }
        }
        Ok(self.resolved)
    }

    fn resolve(&mut self, id: WatcherId) -> Result<()> {
        match self.state[id.index()] {
            Visit::Done => return Ok(()),
            Visit::Visiting => return Err(self.cycle_error(id)),
            Visit::Pending => {}
        }
        self.state[id.index()] = Visit::Visiting;
        self.path.push(id);

        let spec = self.specs[id.index()];
        let mut deps = BTreeSet::new();
        for dep in spec.watchlist {
            match self.members.remove(dep.as_str()) {
                Some(Member::Watcher(other)) => {
                    self.members.insert(dep.clone(), Member::Watcher(other));
                    self.resolve(other)?;
                    deps.extend(self.resolved[other.index()].iter().copied());
                }
                Some(Member::Slot(slot)) => {
                    self.members.insert(dep.clone(), Member::Slot(slot));
                    deps.insert(slot);
                }
                Some(Member::Plain(value)) => {
                    deps.insert(self.install_field(dep, Some(value)));
                }
                Some(Member::Accessor(accessor)) => {
                    if !accessor.is_writable() {
                        return Err(WatchError::configuration(
                            self.qualified(id),
                            format!("'{dep}' is a read-only accessor; its changes cannot be observed"),
                        ));
                    }
                    deps.insert(self.install_accessor(dep, accessor));
                }
                None => {
                    self.order.push(dep.clone());
                    deps.insert(self.install_field(dep, None));
                }
            }
        }

        debug!(
            watcher = %self.qualified(id),
            slots = deps.len(),
            "watcher bound"
        );
        self.path.pop();
        self.state[id.index()] = Visit::Done;
        self.resolved[id.index()] = deps;
        Ok(())
    }

    fn install_field(&mut self, name: &str, default: Option<V>) -> SlotId {
        let id = SlotId::from_index(self.slots.len());
        debug!(owner = self.owner, name, "implicit slot created");
        self.slots.push(AttributeSlot::field(
            id, self.def, self.owner, name, default, true,
        ));
        self.members.insert(name.to_owned(), Member::Slot(id));
        id
    }

    fn install_accessor(&mut self, name: &str, accessor: Rc<dyn Accessor<V>>) -> SlotId {
        let id = SlotId::from_index(self.slots.len());
        debug!(owner = self.owner, name, "accessor wrapped in slot");
        self.slots
            .push(AttributeSlot::accessor(id, self.def, self.owner, name, accessor));
        self.members.insert(name.to_owned(), Member::Slot(id));
        id
    }

    fn qualified(&self, id: WatcherId) -> String {
        format!("{}.{}", self.owner, self.specs[id.index()].name)
    }

    fn cycle_error(&self, id: WatcherId) -> WatchError {
        let start = self.path.iter().position(|&p| p == id).unwrap_or(0);
        let cycle: Vec<&str> = self.path[start..]
            .iter()
            .chain(std::iter::once(&id))
            .map(|p| self.specs[p.index()].name)
            .collect();
        WatchError::configuration(
            self.qualified(id),
            format!("dependency cycle: {}", cycle.join(" -> ")),
        )
    }
}
