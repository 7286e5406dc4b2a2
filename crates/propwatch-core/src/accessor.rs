#![forbid(unsafe_code)]

//! Accessor-backed attributes.
//!
//! An [`Accessor`] is a getter/setter/deleter triple that computes or stores
//! an attribute somewhere other than the slot override map. When an accessor
//! is named in a watchlist it gets wrapped in a pass-through
//! [`AttributeSlot`](crate::AttributeSlot): reads go straight to the getter,
//! writes and deletes go to the accessor and then invalidate subscribers.
//!
//! Only writable accessors can be watched. A getter-only accessor has no
//! write path to intercept, so binding rejects it.

use crate::error::{Result, WatchError};
use crate::instance::Instance;

/// Read/write/delete hooks for one attribute name.
pub trait Accessor<V> {
    /// Read the attribute for `instance`.
    fn get(&self, instance: &Instance<V>, name: &str) -> Result<V>;

    /// Write the attribute for `instance`.
    fn set(&self, instance: &Instance<V>, name: &str, value: V) -> Result<()>;

    /// Delete the attribute for `instance`.
    fn delete(&self, instance: &Instance<V>, name: &str) -> Result<()>;

    /// Whether [`set`](Accessor::set) can succeed at all.
    fn is_writable(&self) -> bool;
}

type Getter<V> = Box<dyn Fn(&Instance<V>) -> Result<V>>;
type Setter<V> = Box<dyn Fn(&Instance<V>, V) -> Result<()>>;
type Deleter<V> = Box<dyn Fn(&Instance<V>) -> Result<()>>;

/// Closure-based [`Accessor`].
///
/// A missing setter or deleter makes the corresponding operation fail with
/// [`WatchError::AttributeImmutable`].
pub struct Property<V> {
    getter: Getter<V>,
    setter: Option<Setter<V>>,
    deleter: Option<Deleter<V>>,
}

impl<V: Clone + 'static> Property<V> {
    /// Getter-only property.
    #[must_use]
    pub fn new(getter: impl Fn(&Instance<V>) -> Result<V> + 'static) -> Self {
        Self {
            getter: Box::new(getter),
            setter: None,
            deleter: None,
        }
    }

    /// Property stored in the untracked instance field `field`.
    ///
    /// Equivalent to a getter, setter and deleter that forward to
    /// `instance.get(field)`, `instance.set(field, ..)` and
    /// `instance.delete(field)`.
    #[must_use]
    pub fn backed_by(field: impl Into<String>) -> Self {
        let field: std::rc::Rc<str> = field.into().into();
        let get_field = std::rc::Rc::clone(&field);
        let set_field = std::rc::Rc::clone(&field);
        Self::new(move |instance| instance.get(&get_field))
            .with_setter(move |instance, value| instance.set(&set_field, value))
            .with_deleter(move |instance| instance.delete(&field))
    }

    #[must_use]
    pub fn with_setter(mut self, setter: impl Fn(&Instance<V>, V) -> Result<()> + 'static) -> Self {
        self.setter = Some(Box::new(setter));
        self
    }

    #[must_use]
    pub fn with_deleter(mut self, deleter: impl Fn(&Instance<V>) -> Result<()> + 'static) -> Self {
        self.deleter = Some(Box::new(deleter));
        self
    }
}

impl<V> Accessor<V> for Property<V> {
    fn get(&self, instance: &Instance<V>, _name: &str) -> Result<V> {
        (self.getter)(instance)
    }

    fn set(&self, instance: &Instance<V>, name: &str, value: V) -> Result<()> {
        match &self.setter {
            Some(setter) => setter(instance, value),
            None => Err(WatchError::immutable(name)),
        }
    }

    fn delete(&self, instance: &Instance<V>, name: &str) -> Result<()> {
        match &self.deleter {
            Some(deleter) => deleter(instance),
            None => Err(WatchError::immutable(name)),
        }
    }

    fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

impl<V> std::fmt::Debug for Property<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("setter", &self.setter.is_some())
            .field("deleter", &self.deleter.is_some())
            .finish()
    }
}
