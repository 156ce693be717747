//! Registry of open stores, one per table identifier
//!
//! Owned explicitly by the caller rather than living in a global. Repeated
//! lookups of a table share one store and its file handles until
//! [`StoreRegistry::reset`] closes and forgets them all.

use super::store::{MiniThumbStore, StoreStats};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::metrics;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Table identifier of a content URI: its second path segment.
///
/// `content://media/external/images/media` → `images`
pub fn table_id_from_uri(uri: &str) -> Option<&str> {
    let uri = uri.split(['?', '#']).next().unwrap_or(uri);
    let path = match uri.split_once("://") {
        // Skip the authority
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => uri,
    };
    path.split('/').filter(|segment| !segment.is_empty()).nth(1)
}

/// Table identifier → store
pub struct StoreRegistry {
    config: Arc<StoreConfig>,
    stores: RwLock<HashMap<String, Arc<MiniThumbStore>>>,
}

impl StoreRegistry {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        metrics::init_metrics();
        info!(base_dir = ?config.base_dir, "Thumbnail store registry created");
        Ok(Self {
            config: Arc::new(config),
            stores: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store for `table`, created on first use
    pub fn instance(&self, table: &str) -> Arc<MiniThumbStore> {
        if let Some(store) = self.stores.read().get(table) {
            return store.clone();
        }

        let mut stores = self.stores.write();
        stores
            .entry(table.to_string())
            .or_insert_with(|| {
                debug!(table, "Creating thumbnail store");
                metrics::ACTIVE_STORES.inc();
                Arc::new(MiniThumbStore::new(table, self.config.clone()))
            })
            .clone()
    }

    /// Store for the table named by a content URI
    pub fn instance_for_uri(&self, uri: &str) -> Option<Arc<MiniThumbStore>> {
        table_id_from_uri(uri).map(|table| self.instance(table))
    }

    /// Deactivate and forget every store; later lookups start from scratch
    pub fn reset(&self) {
        let drained: Vec<_> = self.stores.write().drain().collect();
        if drained.is_empty() {
            return;
        }

        for (_, store) in &drained {
            store.deactivate();
        }
        metrics::ACTIVE_STORES.sub(drained.len() as i64);
        info!(stores = drained.len(), "Thumbnail store registry reset");
    }

    /// Table identifiers with a live store
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.stores.read().keys().cloned().collect();
        tables.sort();
        tables
    }

    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }

    /// Statistics for every live store
    pub fn stats(&self) -> Vec<StoreStats> {
        let stores: Vec<_> = self.stores.read().values().cloned().collect();
        let mut stats: Vec<_> = stores.iter().map(|store| store.stats()).collect();
        stats.sort_by(|a, b| a.table.cmp(&b.table));
        stats
    }
}

impl Drop for StoreRegistry {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("config", &self.config)
            .field("tables", &self.tables())
            .finish()
    }
}
