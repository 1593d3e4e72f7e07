//! Handles into a session's identity map and typed relationship descriptors

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use serde::{Deserialize, Serialize};

/// Slot index inside one session's identity map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

/// Lifecycle state of a tracked instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectState {
    /// Added to the session, not yet flushed
    Pending,
    /// Has a row identity in the store
    Persistent,
    /// Row removed by a flush; the last values stay readable
    Deleted,
    /// No longer tracked by the session
    Detached,
}

impl ObjectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectState::Pending => "pending",
            ObjectState::Persistent => "persistent",
            ObjectState::Deleted => "deleted",
            ObjectState::Detached => "detached",
        }
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle to one instance of `E` tracked by a session.
///
/// Keys are plain copies; the session owns the data. A key used with a
/// different (or closed) session fails with [`crate::Error::Detached`].
pub struct Key<E> {
    pub(crate) session: u64,
    pub(crate) id: ObjectId,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Key<E> {
    pub(crate) fn new(session: u64, id: ObjectId) -> Self {
        Self {
            session,
            id,
            _marker: PhantomData,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl<E> Clone for Key<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Key<E> {}

impl<E> PartialEq for Key<E> {
    fn eq(&self, other: &Self) -> bool {
        self.session == other.session && self.id == other.id
    }
}

impl<E> Eq for Key<E> {}

impl<E> Hash for Key<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.hash(state);
        self.id.hash(state);
    }
}

impl<E> fmt::Debug for Key<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}:{})", self.session, self.id.0)
    }
}

/// Many-to-one relationship attribute of `S` pointing at one `T` (e.g. `hero.team`)
pub struct ManyToOne<S, T> {
    pub name: &'static str,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> ManyToOne<S, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<S, T> Clone for ManyToOne<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for ManyToOne<S, T> {}

/// One-to-many collection attribute of `S` holding many `T` (e.g. `team.heroes`)
pub struct OneToMany<S, T> {
    pub name: &'static str,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> OneToMany<S, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<S, T> Clone for OneToMany<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for OneToMany<S, T> {}
