use core::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
};
use indexmap::{IndexMap as _IndexMap, IndexSet as _IndexSet};
use rustc_hash::FxBuildHasher;
use std::{
    collections::{HashMap as _HashMap, HashSet as _HashSet},
    sync::Arc,
};

pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;
pub(crate) type HashSet<T> = _HashSet<T, FxBuildHasher>;
pub(crate) type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;

/// Identity of a value type flowing through the graph.
///
/// Equality and hashing are defined by the underlying [`TypeId`] alone, so
/// distinct newtypes over the same representation are distinct graph nodes.
/// The captured type name is carried for diagnostics only.
#[derive(Debug, Clone, Copy)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
}

impl TypeToken {
    /// The token identifying `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: core::any::type_name::<T>(),
        }
    }

    /// Diagnostic name of the identified type. Not part of the identity.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl Hash for TypeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A value in the store, erased behind its type identity.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;
