//! Data provider registry

use chrono::Utc;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};

use crate::datasets::DataSetStore;
use crate::error::{Result, StoreError};
use crate::model::{DataProvider, DataProviderProperties, ResultSlice};
use crate::records::RecordStore;
use crate::slice::{decode_token, encode_token, paginate};

type ProviderTable = BTreeMap<String, DataProvider>;

/// Proof that a provider exists, valid while the guard is alive.
///
/// Deleting a provider needs the table write lock, so it waits until every
/// outstanding guard is dropped.
pub struct ProviderGuard {
    _table: OwnedRwLockReadGuard<ProviderTable>,
    provider: DataProvider,
}

impl ProviderGuard {
    pub fn provider(&self) -> &DataProvider {
        &self.provider
    }
}

/// Registry of data providers, ordered by id
#[derive(Default)]
pub struct DataProviderRegistry {
    providers: Arc<RwLock<ProviderTable>>,
}

impl DataProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, id: &str, properties: DataProviderProperties) -> Result<DataProvider> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("Provider id must not be empty".to_string()));
        }
        let mut providers = self.providers.write().await;
        if providers.contains_key(id) {
            return Err(StoreError::ProviderAlreadyExists(id.to_string()));
        }
        let provider = DataProvider {
            id: id.to_string(),
            properties,
            created_at: Utc::now(),
        };
        providers.insert(id.to_string(), provider.clone());
        tracing::info!("Created data provider {}", id);
        Ok(provider)
    }

    pub async fn get(&self, id: &str) -> Result<DataProvider> {
        self.providers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ProviderNotFound(id.to_string()))
    }

    /// Replace the descriptive properties of a provider
    pub async fn update(&self, id: &str, properties: DataProviderProperties) -> Result<DataProvider> {
        let mut providers = self.providers.write().await;
        let provider = providers
            .get_mut(id)
            .ok_or_else(|| StoreError::ProviderNotFound(id.to_string()))?;
        provider.properties = properties;
        Ok(provider.clone())
    }

    /// Providers ordered by id, starting at the token's position
    pub async fn list(&self, start_from: Option<&str>, limit: usize) -> Result<ResultSlice<DataProvider>> {
        let start = match start_from {
            Some(token) => Bound::Included(decode_token(token, 1)?.remove(0)),
            None => Bound::Unbounded,
        };
        let providers = self.providers.read().await;
        paginate(
            providers
                .range::<String, _>((start, Bound::Unbounded))
                .map(|(_, p)| p.clone()),
            limit,
            |p| encode_token(&[&p.id]),
        )
    }

    /// Delete a provider nothing refers to any more.
    ///
    /// The table stays write-locked across both reference checks, so no
    /// representation or data set can be attributed to the provider between
    /// the check and the removal.
    pub async fn delete(&self, id: &str, records: &RecordStore, data_sets: &DataSetStore) -> Result<()> {
        let mut providers = self.providers.write().await;
        if !providers.contains_key(id) {
            return Err(StoreError::ProviderNotFound(id.to_string()));
        }
        if data_sets.has_data_sets(id).await {
            return Err(StoreError::ProviderHasDataSets(id.to_string()));
        }
        if records.references_provider(id).await {
            return Err(StoreError::ProviderHasRecords(id.to_string()));
        }
        providers.remove(id);
        tracing::info!("Deleted data provider {}", id);
        Ok(())
    }

    /// Hold the provider in place while something is attributed to it
    pub async fn pin(&self, id: &str) -> Result<ProviderGuard> {
        let table = self.providers.clone().read_owned().await;
        let provider = table
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ProviderNotFound(id.to_string()))?;
        Ok(ProviderGuard {
            _table: table,
            provider,
        })
    }

    pub async fn export(&self) -> Vec<DataProvider> {
        self.providers.read().await.values().cloned().collect()
    }

    pub async fn import(&self, providers: Vec<DataProvider>) {
        *self.providers.write().await = providers.into_iter().map(|p| (p.id.clone(), p)).collect();
    }
}
