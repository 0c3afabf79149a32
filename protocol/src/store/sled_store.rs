//! Durable share store on sled's embedded B+ tree.
//!
//! Each operation is its own atomic step: the create-only insert is a
//! single compare-and-swap, and every mutation is flushed before the call
//! returns, so a stored share survives an immediate process kill.
//! Concurrent writers to the same share id serialize inside sled.

use std::path::Path;

use super::{ShareStore, StoreError};

/// Name of the sled tree holding share blobs.
const SHARES_TREE: &str = "shares";

/// Durable [`ShareStore`] backed by a sled database.
///
/// Clone-friendly: sled handles are `Arc`s internally, so one open
/// database can serve every request handler.
#[derive(Debug, Clone)]
pub struct SledShareStore {
    db: sled::Db,
    shares: sled::Tree,
}

impl SledShareStore {
    /// Opens (or creates) a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Creates a temporary store that is discarded on drop. Unit tests
    /// only — no filesystem residue, no cleanup.
    pub fn open_temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let shares = db.open_tree(SHARES_TREE)?;
        Ok(Self { db, shares })
    }

    /// Number of stored shares.
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl ShareStore for SledShareStore {
    fn store(&self, id: &str, value: &[u8]) -> Result<(), StoreError> {
        if id.is_empty() || value.is_empty() {
            return Err(StoreError::Invalid);
        }

        // Compare-and-swap against an absent key gives create-only
        // semantics without a lock around read-then-write.
        self.shares
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(value))?
            .map_err(|_| StoreError::AlreadyExists)?;
        self.flush()
    }

    fn retrieve(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        if id.is_empty() {
            return Err(StoreError::Invalid);
        }
        match self.shares.get(id.as_bytes())? {
            Some(value) => Ok(value.to_vec()),
            None => Err(StoreError::NotFound),
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::Invalid);
        }
        match self.shares.remove(id.as_bytes())? {
            Some(_) => self.flush(),
            None => Err(StoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[test]
    fn contract_store_retrieve_delete() {
        contract::store_retrieve_delete(&SledShareStore::open_temporary().unwrap());
    }

    #[test]
    fn contract_create_only() {
        contract::store_is_create_only(&SledShareStore::open_temporary().unwrap());
    }

    #[test]
    fn contract_missing_ids() {
        contract::missing_ids_are_not_found(&SledShareStore::open_temporary().unwrap());
    }

    #[test]
    fn contract_empty_inputs() {
        contract::empty_inputs_are_invalid(&SledShareStore::open_temporary().unwrap());
    }

    #[test]
    fn shares_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = SledShareStore::open(dir.path()).unwrap();
            store.store("durable", b"still here").unwrap();
        }

        let store = SledShareStore::open(dir.path()).unwrap();
        assert_eq!(store.retrieve("durable").unwrap(), b"still here");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deletes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = SledShareStore::open(dir.path()).unwrap();
            store.store("gone", b"soon").unwrap();
            store.delete("gone").unwrap();
        }

        let store = SledShareStore::open(dir.path()).unwrap();
        assert!(matches!(store.retrieve("gone"), Err(StoreError::NotFound)));
    }

    #[test]
    fn concurrent_writers_to_one_id_serialize() {
        use std::sync::Arc;

        let store = Arc::new(SledShareStore::open_temporary().unwrap());
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
    }
}
