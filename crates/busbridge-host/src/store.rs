//! Durable onboarding containers.
//!
//! One JSON file per category under the store root, each mapping
//! `OnboardingKey -> OnboardingRecord`. A reserved, startup-cleared
//! container tracks the set of devices active in the current host lifetime;
//! its leading dot keeps it out of the legal category namespace.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use busbridge_core::{OnboardingKey, OnboardingRecord};
use thiserror::Error;
use tracing::debug;

/// Container holding the currently-active set. Never a legal category:
/// categories may not start with `.`.
pub const RESERVED_ACTIVE: &str = ".active";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

type Container = BTreeMap<OnboardingKey, OnboardingRecord>;

/// File-backed store, one container per category.
///
/// All mutation goes through a single lock: containers are small and the
/// read-modify-write cycle on a category file must not interleave.
pub struct PersistentStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl PersistentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn container_path(&self, category: &str) -> PathBuf {
        self.root.join(format!("{}.json", category))
    }

    fn load(&self, category: &str) -> Result<Container, StoreError> {
        let path = self.container_path(category);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Container::new()),
            Err(e) => Err(e.into()),
        }
    }

    // Atomic write: temp file then rename, so a crash never leaves a
    // half-written container.
    fn save(&self, category: &str, container: &Container) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let path = self.container_path(category);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(container)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Insert a record into its category container unless the key is
    /// already present. First write wins; existing records are never
    /// overwritten. Returns whether the record was written.
    pub fn insert_if_absent(
        &self,
        category: &str,
        record: &OnboardingRecord,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut container = self.load(category)?;
        if container.contains_key(&record.key) {
            return Ok(false);
        }
        container.insert(record.key.clone(), record.clone());
        self.save(category, &container)?;
        debug!(category, key = %record.key, "record persisted");
        Ok(true)
    }

    pub fn contains(&self, category: &str, key: &OnboardingKey) -> Result<bool, StoreError> {
        Ok(self.load(category)?.contains_key(key))
    }

    /// All persisted categories, excluding the reserved active container.
    pub fn categories(&self) -> Result<Vec<String>, StoreError> {
        let mut categories = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(categories),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem != RESERVED_ACTIVE {
                    categories.push(stem.to_string());
                }
            }
        }
        categories.sort();
        Ok(categories)
    }

    pub fn records(&self, category: &str) -> Result<Vec<OnboardingRecord>, StoreError> {
        Ok(self.load(category)?.into_values().collect())
    }

    /// Remove a whole category container. Absent containers are fine.
    pub fn clear(&self, category: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        match fs::remove_file(self.container_path(category)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a device as active in the current host lifetime.
    pub fn insert_active(&self, record: &OnboardingRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut container = self.load(RESERVED_ACTIVE)?;
        container
            .entry(record.key.clone())
            .or_insert_with(|| record.clone());
        self.save(RESERVED_ACTIVE, &container)
    }

    /// Drop the persisted active set. Called exactly once at the start of
    /// the startup replay, before any replay attempt.
    pub fn clear_active(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        self.save(RESERVED_ACTIVE, &Container::new())
    }

    pub fn active_keys(&self) -> Result<Vec<OnboardingKey>, StoreError> {
        Ok(self.load(RESERVED_ACTIVE)?.into_keys().collect())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
