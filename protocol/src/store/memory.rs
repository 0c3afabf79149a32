//! In-memory share store. Testing only — nothing survives the process.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{ShareStore, StoreError};

/// A `HashMap` behind a read/write lock. Mutations take the write lock;
/// retrievals share the read lock.
#[derive(Debug, Default)]
pub struct MemoryShareStore {
    shares: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored shares.
    pub fn len(&self) -> usize {
        self.shares.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.read().is_empty()
    }
}

impl ShareStore for MemoryShareStore {
    fn store(&self, id: &str, value: &[u8]) -> Result<(), StoreError> {
        if id.is_empty() || value.is_empty() {
            return Err(StoreError::Invalid);
        }
        let mut shares = self.shares.write();
        if shares.contains_key(id) {
            return Err(StoreError::AlreadyExists);
        }
        shares.insert(id.to_string(), value.to_vec());
        Ok(())
    }

    fn retrieve(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        if id.is_empty() {
            return Err(StoreError::Invalid);
        }
        self.shares
            .read()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::Invalid);
        }
        self.shares
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[test]
    fn contract_store_retrieve_delete() {
        contract::store_retrieve_delete(&MemoryShareStore::new());
    }

    #[test]
    fn contract_create_only() {
        contract::store_is_create_only(&MemoryShareStore::new());
    }

    #[test]
    fn contract_missing_ids() {
        contract::missing_ids_are_not_found(&MemoryShareStore::new());
    }

    #[test]
    fn contract_empty_inputs() {
        contract::empty_inputs_are_invalid(&MemoryShareStore::new());
    }

    #[test]
    fn concurrent_store_of_one_id_admits_exactly_one_writer() {
        use std::sync::Arc;

        let store = Arc::new(MemoryShareStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.store("contended", &[t as u8 + 1]).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|stored| *stored)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }
}
