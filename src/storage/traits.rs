//! The `KnowledgeStore` trait.

use std::sync::Arc;

use crate::error::Result;
use crate::program::KnowledgeBase;

/// Trait for knowledge-base storage backends.
pub trait KnowledgeStore: Send + Sync {
    /// Retrieve a knowledge base by name.
    ///
    /// Returns `Ok(None)` if nothing is stored under that name.
    fn get(&self, name: &str) -> Result<Option<KnowledgeBase>>;

    /// Store a knowledge base, replacing any previous one with the same name.
    fn put(&self, name: &str, kb: &KnowledgeBase) -> Result<()>;

    /// Names of all stored knowledge bases, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Delete a knowledge base.
    ///
    /// Returns `Ok(())` even if it doesn't exist.
    fn delete(&self, name: &str) -> Result<()>;

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_some())
    }
}

impl<T: KnowledgeStore + ?Sized> KnowledgeStore for Arc<T> {
    fn get(&self, name: &str) -> Result<Option<KnowledgeBase>> {
        (**self).get(name)
    }

    fn put(&self, name: &str, kb: &KnowledgeBase) -> Result<()> {
        (**self).put(name, kb)
    }

    fn list(&self) -> Result<Vec<String>> {
        (**self).list()
    }

    fn delete(&self, name: &str) -> Result<()> {
        (**self).delete(name)
    }
}

/// Shared checks for every `KnowledgeStore` implementation.
#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::program::{Action, Call, Term};

    pub fn sample_kb() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        let wave = kb.create_primitive("wave", &["arm"]);
        kb.add(Action::new("greet", &["arm"]).then(Call::new(wave).arg("arm", Term::new("arm"))));
        kb
    }

    pub fn test_knowledge_store_crud<S: KnowledgeStore>(store: &S) {
        let kb = sample_kb();

        assert!(!store.exists("demo").unwrap());
        assert!(store.get("demo").unwrap().is_none());

        store.put("demo", &kb).unwrap();
        assert!(store.exists("demo").unwrap());
        assert_eq!(store.get("demo").unwrap().unwrap(), kb);

        store.put("another", &KnowledgeBase::new()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["another", "demo"]);

        store.delete("demo").unwrap();
        assert!(!store.exists("demo").unwrap());
        assert_eq!(store.list().unwrap(), vec!["another"]);

        // Deleting twice is fine.
        store.delete("demo").unwrap();
    }
}
