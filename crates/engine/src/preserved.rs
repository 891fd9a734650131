//! Addresses the operator restored to the page's original content.
//!
//! A preserved address is never hydrated again, across reloads, until the
//! operator saves a new value for it. The set is stored as a JSON array of
//! address strings through a [`KeyValueStore`].

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use crate::address::BindingAddress;

/// Storage key of the preserved set.
pub const PRESERVED_KEY: &str = "mineiro_preserved_originals";

/// Errors that can occur when persisting client state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String key-value persistence.
pub trait KeyValueStore: Send {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub const fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// The persisted set of preserved addresses.
pub struct PreservedOriginals {
    store: Box<dyn KeyValueStore>,
    addresses: BTreeSet<String>,
}

impl std::fmt::Debug for PreservedOriginals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreservedOriginals")
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

impl PreservedOriginals {
    /// Load the set from `store`.
    ///
    /// A corrupt stored value is logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: Box<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let addresses = match store.get(PRESERVED_KEY)? {
            Some(raw) => serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Discarding unreadable preserved-originals set");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(Self {
            store,
            // Sets written with raw attribute values read back in canonical form.
            addresses: addresses
                .iter()
                .map(|raw| BindingAddress::parse(raw).to_string())
                .collect(),
        })
    }

    #[must_use]
    pub fn contains(&self, address: &BindingAddress) -> bool {
        self.addresses.contains(&address.to_string())
    }

    /// Add an address. Returns whether it was new.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be persisted.
    pub fn insert(&mut self, address: &BindingAddress) -> Result<bool, StorageError> {
        let added = self.addresses.insert(address.to_string());
        if added {
            self.persist()?;
        }
        Ok(added)
    }

    /// Remove an address. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be persisted.
    pub fn remove(&mut self, address: &BindingAddress) -> Result<bool, StorageError> {
        let removed = self.addresses.remove(&address.to_string());
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Forget every preserved address.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value cannot be deleted.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.addresses.clear();
        self.store.remove(PRESERVED_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addresses.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&self.addresses)?;
        self.store.set(PRESERVED_KEY, &raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!("mineiro-preserved-{}", uuid::Uuid::new_v4()));
        let address = BindingAddress::parse("hero.titulo");

        let mut set = PreservedOriginals::load(Box::new(FileStore::new(dir.clone()))).unwrap();
        assert!(set.insert(&address).unwrap());
        assert!(!set.insert(&address).unwrap());

        let reloaded = PreservedOriginals::load(Box::new(FileStore::new(dir.clone()))).unwrap();
        assert!(reloaded.contains(&address));
        assert_eq!(reloaded.iter().collect::<Vec<_>>(), vec!["hero.titulo"]);

        let stored = fs::read_to_string(dir.join("mineiro_preserved_originals.json")).unwrap();
        assert_eq!(stored, "[\"hero.titulo\"]");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_remove_and_clear() {
        let mut set = PreservedOriginals::load(Box::new(MemoryStore::new())).unwrap();
        let a = BindingAddress::parse("hero.titulo");
        let b = BindingAddress::parse("footer.texto");
        set.insert(&a).unwrap();
        set.insert(&b).unwrap();

        assert!(set.remove(&a).unwrap());
        assert!(!set.contains(&a));
        assert_eq!(set.len(), 1);

        set.clear().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_raw_attribute_keys_are_recognized() {
        let mut store = MemoryStore::new();
        store
            .set(PRESERVED_KEY, r#"["whatsapp", "banner.titulo"]"#)
            .unwrap();
        let set = PreservedOriginals::load(Box::new(store)).unwrap();

        assert!(set.contains(&BindingAddress::parse("whatsapp")));
        assert!(set.contains(&BindingAddress::parse("config-tienda.whatsapp")));
        assert!(set.contains(&BindingAddress::parse("hero.titulo")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_corrupt_value_starts_empty() {
        let mut store = MemoryStore::new();
        store.set(PRESERVED_KEY, "not json").unwrap();
        let set = PreservedOriginals::load(Box::new(store)).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_file_store_missing_key() {
        let mut store = FileStore::new(std::env::temp_dir().join("mineiro-missing-dir"));
        assert!(store.get("nothing").unwrap().is_none());
        store.remove("nothing").unwrap();
    }
}
