//! StateStore — redb-backed state persistence for the autoscaler.
//!
//! Provides typed CRUD operations over policy records, instance metric
//! history, and bindings. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.open_table(APP_METRICS).map_err(map_err!(Table))?;
        txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put<T: Serialize>(
        &self,
        table_def: JsonTable,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table_def: JsonTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn delete(
        &self,
        table_def: JsonTable,
        key: &str,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Policies ───────────────────────────────────────────────────

    /// Insert or update a policy record.
    pub fn put_policy(&self, record: &PolicyRecord) -> StateResult<()> {
        self.put(POLICIES, &record.app_id, record)?;
        debug!(app_id = %record.app_id, status = ?record.status, "policy stored");
        Ok(())
    }

    /// Get the policy record for an application, whatever its status.
    pub fn get_policy_record(&self, app_id: &str) -> StateResult<Option<PolicyRecord>> {
        self.get(POLICIES, app_id)
    }

    /// Get the policy the engine should act on. Pending records are invisible.
    pub fn get_active_policy(&self, app_id: &str) -> StateResult<Option<ScalingPolicy>> {
        Ok(self
            .get_policy_record(app_id)?
            .filter(|r| r.status == PolicyStatus::Active)
            .map(|r| r.policy))
    }

    /// List ids of all applications with an active policy.
    pub fn list_active_app_ids(&self) -> StateResult<Vec<AppId>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: PolicyRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.status == PolicyStatus::Active {
                results.push(record.app_id);
            }
        }
        Ok(results)
    }

    /// Delete an application's policy. Returns true if it existed.
    pub fn delete_policy(&self, app_id: &str) -> StateResult<bool> {
        let existed = self.delete(POLICIES, app_id)?;
        debug!(%app_id, existed, "policy deleted");
        Ok(existed)
    }

    // ── Metric history ─────────────────────────────────────────────

    /// Insert a batch of history records in a single transaction.
    pub fn put_app_metrics(&self, metrics: &[AppInstanceMetric]) -> StateResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APP_METRICS).map_err(map_err!(Table))?;
            for m in metrics {
                let key = m.table_key();
                let value = serde_json::to_vec(m).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// History for one app and metric with `start <= collected_at <= end`,
    /// ordered by collection time.
    pub fn list_app_metrics(
        &self,
        app_id: &str,
        name: MetricName,
        start: i64,
        end: i64,
    ) -> StateResult<Vec<AppInstanceMetric>> {
        let prefix = format!("{app_id}:{name}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APP_METRICS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let metric: AppInstanceMetric =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                // The prefix also matches apps whose id continues past `{app_id}:{name}:`.
                if metric.app_id == app_id
                    && metric.name == name
                    && (start..=end).contains(&metric.collected_at)
                {
                    results.push(metric);
                }
            }
        }
        Ok(results)
    }

    /// Delete every history record collected before `before`. Returns number deleted.
    pub fn prune_app_metrics(&self, before: i64) -> StateResult<u32> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(APP_METRICS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let metric: AppInstanceMetric =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if metric.collected_at < before {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(APP_METRICS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(before, pruned = count, "metric history pruned");
        Ok(count)
    }

    // ── Bindings ───────────────────────────────────────────────────

    /// Insert or update a binding record.
    pub fn put_binding(&self, binding: &BindingRecord) -> StateResult<()> {
        self.put(BINDINGS, &binding.binding_id, binding)
    }

    pub fn get_binding(&self, binding_id: &str) -> StateResult<Option<BindingRecord>> {
        self.get(BINDINGS, binding_id)
    }

    /// Delete a binding by id. Returns true if it existed.
    pub fn delete_binding(&self, binding_id: &str) -> StateResult<bool> {
        self.delete(BINDINGS, binding_id)
    }
}
