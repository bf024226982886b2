//! In-memory knowledge store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::Result;
use crate::program::KnowledgeBase;
use crate::storage::KnowledgeStore;

/// Thread-safe knowledge store backed by `RwLock<HashMap>`. Contents are lost
/// when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeStore {
    bases: RwLock<HashMap<String, KnowledgeBase>>,
}

impl MemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bases.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.bases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl KnowledgeStore for MemoryKnowledgeStore {
    fn get(&self, name: &str) -> Result<Option<KnowledgeBase>> {
        let bases = self.bases.read().unwrap_or_else(PoisonError::into_inner);
        Ok(bases.get(name).cloned())
    }

    fn put(&self, name: &str, kb: &KnowledgeBase) -> Result<()> {
        let mut bases = self.bases.write().unwrap_or_else(PoisonError::into_inner);
        bases.insert(name.to_string(), kb.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let bases = self.bases.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = bases.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut bases = self.bases.write().unwrap_or_else(PoisonError::into_inner);
        bases.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::{sample_kb, test_knowledge_store_crud};

    #[test]
    fn test_memory_store_crud() {
        let store = MemoryKnowledgeStore::new();
        test_knowledge_store_crud(&store);
    }

    #[test]
    fn test_len_and_clear() {
        let store = MemoryKnowledgeStore::new();
        assert!(store.is_empty());
        store.put("a", &sample_kb()).unwrap();
        store.put("b", &sample_kb()).unwrap();
        store.put("a", &KnowledgeBase::new()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("a").unwrap().unwrap().executables.is_empty());
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryKnowledgeStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let name = format!("kb{}", i);
                    store.put(&name, &sample_kb()).unwrap();
                    assert!(store.get(&name).unwrap().is_some());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8);
    }
}
