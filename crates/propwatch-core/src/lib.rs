#![forbid(unsafe_code)]

//! Dependency-tracked memoized attributes.
//!
//! A [`Watcher`] is a computed value cached per [`Instance`]. It declares the
//! attributes it depends on by name; writing or deleting any of them on an
//! instance discards that instance's cached value, and the next read
//! recomputes it.
//!
//! - [`AttributeSlot`]: a tracked attribute with an optional type-level
//!   default. Writes and deletes invalidate subscribed watchers.
//! - [`Watcher`]: a lazily computed, per-instance memoized value.
//! - [`TypeBuilder`] / [`TypeDef`]: the explicit attribute registry. Binding
//!   runs once in [`TypeBuilder::build`] and flattens watcher-on-watcher
//!   dependencies into direct slot subscriptions.
//! - [`Accessor`] / [`Property`]: getter/setter pairs that can be watched.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use propwatch_core::{Instance, TypeBuilder};
//!
//! let calls = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&calls);
//! let rect = TypeBuilder::<i64>::new("Rect")
//!     .slot_with_default("width", 3)
//!     .slot_with_default("height", 4)
//!     .class_attr("label", 0)
//!     .watch("area", ["width", "height"], move |r| {
//!         counter.set(counter.get() + 1);
//!         Ok(r.get("width")? * r.get("height")?)
//!     })
//!     .build()?;
//!
//! let r = Instance::new(&rect);
//! assert_eq!(r.get("area")?, 12);
//! assert_eq!(r.get("area")?, 12);
//! assert_eq!(calls.get(), 1);
//!
//! r.set("width", 5)?;
//! assert_eq!(r.get("area")?, 20);
//! assert_eq!(calls.get(), 2);
//!
//! r.set("label", 7)?; // not watched
//! assert_eq!(r.get("area")?, 20);
//! assert_eq!(calls.get(), 2);
//! # Ok::<(), propwatch_core::WatchError>(())
//! ```
//!
//! # Invariants
//!
//! 1. Two reads with no intervening dependency write compute once.
//! 2. Invalidation is scoped to the instance written.
//! 3. Writes to names outside every watchlist never invalidate.
//! 4. A watcher on another watcher recomputes when the other's dependencies
//!    change, even if the other was never read.

pub mod accessor;
mod binder;
pub mod error;
pub mod instance;
mod logging;
pub mod slot;
pub mod type_def;
pub mod watcher;

pub use accessor::{Accessor, Property};
pub use error::{Result, WatchError};
pub use instance::{Instance, InstanceId};
pub use slot::{AttributeSlot, SlotId};
pub use type_def::{DefId, MemberRef, TypeBuilder, TypeDef};
pub use watcher::{Watcher, WatcherId, computations_total, invalidations_total};
