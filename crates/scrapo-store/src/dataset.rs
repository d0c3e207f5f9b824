//! Schema-consistent accumulation of extracted pages.
//!
//! Every merge is a read-modify-write of the whole collection stored under a
//! handle. Merges and clears for the same handle take the same async lock, so
//! a concurrent merge can never read a stale collection and drop records.
//! That lock is per process; hosts sharing one database coordinate through
//! the store's leases instead.

use crate::error::{Result, StoreError};
use crate::kv::KeyValueStore;
use scrapo_core::{DatasetHandle, DatasetShape, Record, Row, SchemaDriftPolicy, TableSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Accumulates extracted records and tables into persisted datasets.
pub struct DatasetStore {
    store: Arc<dyn KeyValueStore>,
    drift_policy: SchemaDriftPolicy,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DatasetStore {
    /// Wrap a key-value store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, drift_policy: SchemaDriftPolicy) -> Self {
        Self {
            store,
            drift_policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Take the store-wide lease `name` for `holder`. See [`KeyValueStore::try_acquire_lease`].
    pub async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        self.store.try_acquire_lease(name, holder, ttl).await
    }

    /// Give up the store-wide lease `name` if `holder` has it.
    pub async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        self.store.release_lease(name, holder).await
    }

    fn lock_for(&self, handle: &DatasetHandle) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(handle.key().to_string()).or_default().clone()
    }

    /// Append records in arrival order. Returns the new total record count.
    pub async fn append_records(&self, handle: &DatasetHandle, batch: Vec<Record>) -> Result<usize> {
        expect_shape(handle, DatasetShape::Records)?;
        let lock = self.lock_for(handle);
        let _guard = lock.lock().await;

        let mut records: Vec<Record> = self.read(handle).await?;
        let added = batch.len();
        records.extend(batch);
        self.write(handle, &records).await?;

        tracing::debug!(dataset = %handle, added, total = records.len(), "Merged records");
        Ok(records.len())
    }

    /// Merge one extracted table. Returns the data row count (header excluded).
    ///
    /// # Errors
    /// Returns `StoreError::SchemaDrift` when the header differs from the
    /// stored one and the policy is [`SchemaDriftPolicy::Reject`]; the
    /// dataset is left unchanged.
    pub async fn append_table(&self, handle: &DatasetHandle, snapshot: TableSnapshot) -> Result<usize> {
        expect_shape(handle, DatasetShape::Rows)?;
        let lock = self.lock_for(handle);
        let _guard = lock.lock().await;

        let existing: Vec<Row> = self.read(handle).await?;
        let added = snapshot.rows.len();
        let rows = merge_rows(existing, snapshot, self.drift_policy).map_err(|found| {
            StoreError::SchemaDrift {
                key: handle.key().to_string(),
                expected: found.0,
                found: found.1,
            }
        })?;
        self.write(handle, &rows).await?;

        let total = data_row_count(&rows);
        tracing::debug!(dataset = %handle, added, total, "Merged table rows");
        Ok(total)
    }

    /// All records stored under the handle.
    pub async fn load_records(&self, handle: &DatasetHandle) -> Result<Vec<Record>> {
        expect_shape(handle, DatasetShape::Records)?;
        self.read(handle).await
    }

    /// All rows stored under the handle, header first.
    pub async fn load_rows(&self, handle: &DatasetHandle) -> Result<Vec<Row>> {
        expect_shape(handle, DatasetShape::Rows)?;
        self.read(handle).await
    }

    /// Records held, or data rows held (header excluded).
    pub async fn count(&self, handle: &DatasetHandle) -> Result<usize> {
        match handle.shape() {
            DatasetShape::Records => Ok(self.load_records(handle).await?.len()),
            DatasetShape::Rows => Ok(data_row_count(&self.load_rows(handle).await?)),
        }
    }

    /// Remove the collection. Waits for any in-flight merge on the handle.
    pub async fn clear(&self, handle: &DatasetHandle) -> Result<()> {
        let lock = self.lock_for(handle);
        let _guard = lock.lock().await;
        self.store.remove(handle.key()).await?;
        tracing::debug!(dataset = %handle, "Cleared dataset");
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, handle: &DatasetHandle) -> Result<Vec<T>> {
        match self.store.get(handle.key()).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write<T: Serialize>(&self, handle: &DatasetHandle, items: &[T]) -> Result<()> {
        let value = serde_json::to_value(items)?;
        self.store.set(handle.key(), &value).await
    }
}

fn expect_shape(handle: &DatasetHandle, actual: DatasetShape) -> Result<()> {
    if handle.shape() == actual {
        Ok(())
    } else {
        Err(StoreError::ShapeMismatch {
            key: handle.key().to_string(),
            expected: handle.shape(),
            actual,
        })
    }
}

fn data_row_count(rows: &[Row]) -> usize {
    rows.len().saturating_sub(1)
}

/// Merge a table into stored rows.
///
/// An empty dataset takes the snapshot's header. A matching header (same
/// length, same columns in the same order) is dropped and only data rows are
/// appended. Any other header, including one that merely extends the stored
/// header with extra columns, is either placed at the front ahead of all old
/// rows or refused with `Err((stored_header, new_header))`, depending on
/// `policy`.
pub fn merge_rows(
    mut existing: Vec<Row>,
    snapshot: TableSnapshot,
    policy: SchemaDriftPolicy,
) -> std::result::Result<Vec<Row>, (Row, Row)> {
    let TableSnapshot { header, rows } = snapshot;

    let Some(stored_header) = existing.first() else {
        let mut merged = Vec::with_capacity(rows.len() + 1);
        merged.push(header);
        merged.extend(rows);
        return Ok(merged);
    };

    if *stored_header == header {
        existing.extend(rows);
        return Ok(existing);
    }

    match policy {
        SchemaDriftPolicy::PrependHeader => {
            tracing::warn!(
                stored = ?stored_header,
                new = ?header,
                "Header changed between pages; previous header is now embedded in the data"
            );
            let mut merged = Vec::with_capacity(existing.len() + rows.len() + 1);
            merged.push(header);
            merged.append(&mut existing);
            merged.extend(rows);
            Ok(merged)
        }
        SchemaDriftPolicy::Reject => Err((stored_header.clone(), header)),
    }
}
