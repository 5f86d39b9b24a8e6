//! Collection registry: collection name -> remote address + local table
//!
//! Every collection that can appear in the outbox must be registered.
//! A missing entry is a configuration defect; the push path reports it
//! and leaves the outbox entry pending instead of dropping it.

use std::collections::BTreeMap;

use crate::remote::{CollectionRef, RemoteRef};
use crate::types::Collection;

/// Remote location of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBinding {
    /// Local table handle
    pub collection: Collection,
    /// Remote collection path
    pub path: String,
}

impl RemoteBinding {
    /// Reference constructor for one document
    pub fn doc_ref(&self, id: &str) -> RemoteRef {
        RemoteRef::new(self.path.clone(), id)
    }

    pub fn collection_ref(&self) -> CollectionRef {
        CollectionRef::new(self.path.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectionRegistry {
    bindings: BTreeMap<String, RemoteBinding>,
}

impl CollectionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Every collection, mapped to a remote path of the same name
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for collection in Collection::ALL {
            registry.register(collection, collection.as_str());
        }
        registry
    }

    /// Map `collection` to `path` on the remote, replacing any previous mapping
    pub fn register(&mut self, collection: Collection, path: impl Into<String>) -> &mut Self {
        self.bindings.insert(
            collection.as_str().to_string(),
            RemoteBinding {
                collection,
                path: path.into(),
            },
        );
        self
    }

    /// Drop the mapping for `collection`
    #[must_use]
    pub fn without(mut self, collection: Collection) -> Self {
        self.bindings.remove(collection.as_str());
        self
    }

    /// Look up a collection by its stored name
    pub fn resolve(&self, name: &str) -> Option<&RemoteBinding> {
        self.bindings.get(name)
    }

    pub fn contains(&self, collection: Collection) -> bool {
        self.bindings.contains_key(collection.as_str())
    }

    pub fn bindings(&self) -> impl Iterator<Item = &RemoteBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_maps_every_collection() {
        let registry = CollectionRegistry::standard();
        assert_eq!(registry.len(), Collection::ALL.len());
        for collection in Collection::ALL {
            let binding = registry.resolve(collection.as_str()).unwrap();
            assert_eq!(binding.collection, collection);
        }
    }

    #[test]
    fn test_doc_ref_uses_remote_path() {
        let mut registry = CollectionRegistry::new();
        registry.register(Collection::Todos, "class-7a/todos");

        let binding = registry.resolve("todos").unwrap();
        assert_eq!(binding.doc_ref("t1").path(), "class-7a/todos/t1");
        assert_eq!(binding.collection_ref().path, "class-7a/todos");
    }

    #[test]
    fn test_unregistered_does_not_resolve() {
        let registry = CollectionRegistry::standard().without(Collection::Journals);
        assert!(registry.resolve("journals").is_none());
        assert!(registry.resolve("grades").is_none());
        assert!(!registry.contains(Collection::Journals));
    }
}
