//! Onboarding registry.
//!
//! Owns the durable per-category containers and the transient active set,
//! and guarantees that each `category:id` key is materialized through the
//! bus engine at most once per host lifetime. Requests on distinct keys
//! proceed independently; requests on the same key serialize on a per-key
//! lock so exactly one engine invocation wins.

use std::path::PathBuf;
use std::sync::Arc;

use busbridge_core::record::validate_category;
use busbridge_core::{
    extract_id, BridgeEngine, OnboardError, OnboardingKey, OnboardingRecord, TokenExchange,
};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::PersistentStore;

pub struct OnboardingRegistry {
    store: PersistentStore,
    /// Devices materialized in the current host lifetime. Membership here
    /// means the engine accepted the device since the last startup replay.
    active: DashMap<OnboardingKey, OnboardingRecord>,
    /// Per-key mutexes serializing the materialization path.
    locks: DashMap<OnboardingKey, Arc<Mutex<()>>>,
    tokens: Arc<dyn TokenExchange>,
    engine: Arc<dyn BridgeEngine>,
    modules_path: PathBuf,
}

impl OnboardingRegistry {
    pub fn new(
        store: PersistentStore,
        tokens: Arc<dyn TokenExchange>,
        engine: Arc<dyn BridgeEngine>,
        modules_path: PathBuf,
    ) -> Self {
        Self {
            store,
            active: DashMap::new(),
            locks: DashMap::new(),
            tokens,
            engine,
            modules_path,
        }
    }

    /// Is this device already active in the current host lifetime?
    pub fn is_active(&self, key: &OnboardingKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Materialize a device through the bus engine, at most once per key.
    ///
    /// Re-onboarding an active key is a success with no side effect. On
    /// engine or token failure nothing is persisted. On success the record
    /// lands in its category container (first write wins) and in the active
    /// set.
    pub async fn try_onboard(&self, record: OnboardingRecord) -> Result<(), OnboardError> {
        // Validate before any I/O. Records arriving via replay were
        // validated when first persisted, but the props blob is the
        // authority for the id, so re-check at the registry boundary.
        validate_category(record.key.category())?;
        extract_id(&record.props)?;

        if self.is_active(&record.key) {
            debug!(key = %record.key, "device already onboarded, skipping");
            return Ok(());
        }

        let lock = self
            .locks
            .entry(record.key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _serialized = lock.lock().await;

        // A concurrent request for the same key may have won the lock first.
        if self.is_active(&record.key) {
            debug!(key = %record.key, "device onboarded concurrently, skipping");
            return Ok(());
        }

        let script = self.tokens.resolve(&record.script_token).await?;
        let schema = self.tokens.resolve(&record.schema_token).await?;

        self.engine
            .add_device(&record.descriptor(), &schema, &script, &self.modules_path)
            .await
            .map_err(|e| OnboardError::MaterializationFailed(e.to_string()))?;

        self.store
            .insert_if_absent(record.key.category(), &record)
            .map_err(|e| OnboardError::Store(e.to_string()))?;
        self.store
            .insert_active(&record)
            .map_err(|e| OnboardError::Store(e.to_string()))?;

        info!(key = %record.key, name = %record.name, "device onboarded");
        self.active.insert(record.key.clone(), record);
        Ok(())
    }

    /// Re-materialize every persisted record at host startup.
    ///
    /// Clears the active set exactly once up front, then replays each
    /// category container through `try_onboard`. A failing record is
    /// logged and skipped; it never aborts the remaining replay, and the
    /// category containers themselves are never rewritten here.
    pub async fn replay_all(&self) -> Vec<(OnboardingKey, Result<(), OnboardError>)> {
        self.active.clear();
        if let Err(e) = self.store.clear_active() {
            warn!(error = %e, "failed to clear persisted active set");
        }

        let categories = match self.store.categories() {
            Ok(categories) => categories,
            Err(e) => {
                warn!(error = %e, "failed to enumerate onboarding containers");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::new();
        for category in categories {
            let records = match self.store.records(&category) {
                Ok(records) => records,
                Err(e) => {
                    warn!(category, error = %e, "failed to read onboarding container");
                    continue;
                }
            };
            for record in records {
                let key = record.key.clone();
                let outcome = self.try_onboard(record).await;
                if let Err(ref e) = outcome {
                    warn!(key = %key, error = %e, "replay failed for device");
                }
                outcomes.push((key, outcome));
            }
        }
        outcomes
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }
}
