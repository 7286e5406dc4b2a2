//! Error taxonomy for slots, watchers and type binding.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// Read with no override and no default, or delete with nothing to delete.
    #[error("'{owner}' object has no attribute '{name}'")]
    AttributeNotFound { owner: String, name: String },

    /// Set or delete on a computed value or on an accessor missing that half.
    #[error("attribute '{name}' cannot be set or deleted")]
    AttributeImmutable { name: String },

    /// Watchlist that cannot be wired: read-only accessor or dependency cycle.
    #[error("invalid watch configuration for '{watcher}': {message}")]
    Configuration { watcher: String, message: String },

    /// Slot or watcher handed an instance of a different type.
    #[error("instance of '{found}' used with a member of '{expected}'")]
    WrongType { expected: String, found: String },

    /// Raised by a compute function.
    #[error("computing '{watcher}' failed: {message}")]
    Compute { watcher: String, message: String },
}

impl WatchError {
    #[must_use]
    pub fn not_found(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AttributeNotFound {
            owner: owner.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn immutable(name: impl Into<String>) -> Self {
        Self::AttributeImmutable { name: name.into() }
    }

    #[must_use]
    pub fn configuration(watcher: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            watcher: watcher.into(),
            message: message.into(),
        }
    }

    /// Error for a compute function to return when it cannot produce a value.
    #[must_use]
    pub fn compute(watcher: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compute {
            watcher: watcher.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AttributeNotFound { .. })
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::AttributeImmutable { .. })
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
