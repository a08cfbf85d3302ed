//! Data sets and their assignments
//!
//! A data set belongs to one provider and holds at most one pointer per
//! (record, representation name). A pointer names an explicit version or,
//! when the version is omitted, whatever is latest at read time.
//!
//! Pointers are checked when they are added and never again: listing skips
//! targets that have disappeared since. A pointer to a draft that has been
//! persisted follows it to the persisted version.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::events::{Notifier, StoreEvent};
use crate::model::{CompoundDataSetId, DataSet, Representation, ResultSlice};
use crate::providers::DataProviderRegistry;
use crate::records::RecordStore;
use crate::slice::{decode_token, encode_token, paginate};
use crate::version::VersionId;

/// Pointer from a data set into the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub cloud_id: String,
    pub representation_name: String,
    /// `None` follows the latest version
    pub version: Option<VersionId>,
}

/// Serializable image of one data set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSetSnapshot {
    pub data_set: DataSet,
    pub assignments: Vec<Assignment>,
}

type AssignmentKey = (String, String);

struct DataSetEntry {
    data_set: DataSet,
    assignments: BTreeMap<AssignmentKey, Option<VersionId>>,
}

pub struct DataSetStore {
    data_sets: RwLock<BTreeMap<CompoundDataSetId, DataSetEntry>>,
    records: Arc<RecordStore>,
    providers: Arc<DataProviderRegistry>,
    notifier: Notifier,
}

impl DataSetStore {
    pub fn new(records: Arc<RecordStore>, providers: Arc<DataProviderRegistry>, notifier: Notifier) -> Self {
        Self {
            data_sets: RwLock::new(BTreeMap::new()),
            records,
            providers,
            notifier,
        }
    }

    pub async fn create_data_set(
        &self,
        provider_id: &str,
        data_set_id: &str,
        description: Option<&str>,
    ) -> Result<DataSet> {
        if data_set_id.is_empty() {
            return Err(StoreError::InvalidArgument("Data set id must not be empty".to_string()));
        }
        let _provider = self.providers.pin(provider_id).await?;
        let id = CompoundDataSetId::new(provider_id, data_set_id);
        let mut data_sets = self.data_sets.write().await;
        if data_sets.contains_key(&id) {
            return Err(StoreError::DataSetAlreadyExists {
                provider_id: provider_id.to_string(),
                data_set_id: data_set_id.to_string(),
            });
        }
        let data_set = DataSet {
            provider_id: provider_id.to_string(),
            id: data_set_id.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        data_sets.insert(
            id,
            DataSetEntry {
                data_set: data_set.clone(),
                assignments: BTreeMap::new(),
            },
        );
        tracing::info!("Created data set {}/{}", provider_id, data_set_id);
        Ok(data_set)
    }

    pub async fn update_data_set(
        &self,
        provider_id: &str,
        data_set_id: &str,
        description: Option<&str>,
    ) -> Result<DataSet> {
        let mut data_sets = self.data_sets.write().await;
        let entry = data_sets
            .get_mut(&CompoundDataSetId::new(provider_id, data_set_id))
            .ok_or_else(|| StoreError::data_set_not_found(provider_id, data_set_id))?;
        entry.data_set.description = description.map(str::to_string);
        Ok(entry.data_set.clone())
    }

    pub async fn get_data_set(&self, provider_id: &str, data_set_id: &str) -> Result<DataSet> {
        self.data_sets
            .read()
            .await
            .get(&CompoundDataSetId::new(provider_id, data_set_id))
            .map(|e| e.data_set.clone())
            .ok_or_else(|| StoreError::data_set_not_found(provider_id, data_set_id))
    }

    /// Data sets of one provider, ordered by id
    pub async fn get_data_sets(
        &self,
        provider_id: &str,
        start_from: Option<&str>,
        limit: usize,
    ) -> Result<ResultSlice<DataSet>> {
        self.providers.get(provider_id).await?;
        let first = match start_from {
            Some(token) => decode_token(token, 1)?.remove(0),
            None => String::new(),
        };
        let data_sets = self.data_sets.read().await;
        let from = CompoundDataSetId::new(provider_id, first);
        paginate(
            data_sets
                .range(from..)
                .take_while(|(id, _)| id.provider_id == provider_id)
                .map(|(_, e)| e.data_set.clone()),
            limit,
            |ds| encode_token(&[&ds.id]),
        )
    }

    pub async fn has_data_sets(&self, provider_id: &str) -> bool {
        self.data_sets
            .read()
            .await
            .keys()
            .any(|id| id.provider_id == provider_id)
    }

    /// Point the data set at a representation version, replacing any earlier
    /// pointer for the same record and representation name
    pub async fn add_assignment(
        &self,
        provider_id: &str,
        data_set_id: &str,
        cloud_id: &str,
        representation_name: &str,
        version: Option<&VersionId>,
    ) -> Result<()> {
        let id = CompoundDataSetId::new(provider_id, data_set_id);
        if !self.data_sets.read().await.contains_key(&id) {
            return Err(StoreError::data_set_not_found(provider_id, data_set_id));
        }
        let representation = self
            .records
            .get_representation(cloud_id, representation_name, version)
            .await?;
        {
            let mut data_sets = self.data_sets.write().await;
            // the data set may have been deleted during the lookup
            let entry = data_sets
                .get_mut(&id)
                .ok_or_else(|| StoreError::data_set_not_found(provider_id, data_set_id))?;
            entry.assignments.insert(
                (cloud_id.to_string(), representation_name.to_string()),
                version.copied(),
            );
        }
        tracing::debug!("Assigned {} to data set {}", representation.path(), id);
        self.notifier
            .notify(StoreEvent::AssignmentAdded {
                representation,
                data_set: id,
            })
            .await;
        Ok(())
    }

    /// Drop the pointer for (record, representation name), if there is one
    pub async fn remove_assignment(
        &self,
        provider_id: &str,
        data_set_id: &str,
        cloud_id: &str,
        representation_name: &str,
    ) -> Result<()> {
        let id = CompoundDataSetId::new(provider_id, data_set_id);
        let removed = {
            let mut data_sets = self.data_sets.write().await;
            let entry = data_sets
                .get_mut(&id)
                .ok_or_else(|| StoreError::data_set_not_found(provider_id, data_set_id))?;
            entry
                .assignments
                .remove(&(cloud_id.to_string(), representation_name.to_string()))
                .is_some()
        };
        if removed {
            tracing::debug!("Unassigned {}/{} from data set {}", cloud_id, representation_name, id);
            self.notifier
                .notify(StoreEvent::AssignmentRemoved {
                    cloud_id: cloud_id.to_string(),
                    representation_name: representation_name.to_string(),
                    data_sets: vec![id],
                })
                .await;
        }
        Ok(())
    }

    async fn assignments_from(
        &self,
        provider_id: &str,
        data_set_id: &str,
        start: Bound<AssignmentKey>,
    ) -> Result<Vec<(AssignmentKey, Option<VersionId>)>> {
        let data_sets = self.data_sets.read().await;
        let entry = data_sets
            .get(&CompoundDataSetId::new(provider_id, data_set_id))
            .ok_or_else(|| StoreError::data_set_not_found(provider_id, data_set_id))?;
        Ok(entry
            .assignments
            .range((start, Bound::Unbounded))
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }

    /// Resolve a pointer, treating a vanished target as absent
    async fn resolve(&self, key: &AssignmentKey, version: Option<VersionId>) -> Result<Option<Representation>> {
        match self
            .records
            .resolve_pointer(&key.0, &key.1, version.as_ref())
            .await
        {
            Ok(rep) => Ok(Some(rep)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Representations the data set points at, ordered by record and name.
    /// Dangling pointers are left out.
    pub async fn list_data_set(
        &self,
        provider_id: &str,
        data_set_id: &str,
        start_from: Option<&str>,
        limit: usize,
    ) -> Result<ResultSlice<Representation>> {
        let start = match start_from {
            Some(token) => {
                let mut parts = decode_token(token, 2)?;
                let name = parts.remove(1);
                Bound::Included((parts.remove(0), name))
            }
            None => Bound::Unbounded,
        };
        let assignments = self.assignments_from(provider_id, data_set_id, start).await?;

        let mut resolved = Vec::new();
        for (key, version) in assignments {
            if resolved.len() > limit {
                break;
            }
            if let Some(rep) = self.resolve(&key, version).await? {
                resolved.push(rep);
            }
        }
        paginate(resolved, limit, |rep| {
            encode_token(&[&rep.cloud_id, &rep.representation_name])
        })
    }

    /// Every live target of the data set
    pub async fn members(&self, provider_id: &str, data_set_id: &str) -> Result<Vec<Representation>> {
        let assignments = self
            .assignments_from(provider_id, data_set_id, Bound::Unbounded)
            .await?;
        let mut members = Vec::with_capacity(assignments.len());
        for (key, version) in assignments {
            if let Some(rep) = self.resolve(&key, version).await? {
                members.push(rep);
            }
        }
        Ok(members)
    }

    /// Names of the representations the data set points at
    pub async fn representation_names(&self, provider_id: &str, data_set_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .members(provider_id, data_set_id)
            .await?
            .into_iter()
            .map(|rep| rep.representation_name)
            .collect())
    }

    pub async fn delete_data_set(&self, provider_id: &str, data_set_id: &str) -> Result<()> {
        let id = CompoundDataSetId::new(provider_id, data_set_id);
        let removed = self
            .data_sets
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| StoreError::data_set_not_found(provider_id, data_set_id))?;
        tracing::info!(
            "Deleted data set {} ({} assignments)",
            id,
            removed.assignments.len()
        );
        self.notifier
            .notify(StoreEvent::AllAssignmentsRemovedFromDataSet { data_set: id })
            .await;
        Ok(())
    }

    /// Data sets whose pointer for (record, name) resolves to `version`
    /// when `version` is the latest one
    pub async fn data_sets_for_representation(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
    ) -> Vec<CompoundDataSetId> {
        let key = (cloud_id.to_string(), representation_name.to_string());
        self.data_sets
            .read()
            .await
            .iter()
            .filter(|(_, entry)| match entry.assignments.get(&key) {
                Some(Some(v)) => v == version,
                Some(None) => true,
                None => false,
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Move pointers naming `from` to `to`, after a draft was persisted
    pub async fn retarget(&self, cloud_id: &str, representation_name: &str, from: &VersionId, to: &VersionId) {
        let key = (cloud_id.to_string(), representation_name.to_string());
        let mut data_sets = self.data_sets.write().await;
        for entry in data_sets.values_mut() {
            if let Some(pointer) = entry.assignments.get_mut(&key) {
                if pointer.as_ref() == Some(from) {
                    *pointer = Some(*to);
                }
            }
        }
    }

    pub async fn export(&self) -> Vec<DataSetSnapshot> {
        self.data_sets
            .read()
            .await
            .values()
            .map(|entry| DataSetSnapshot {
                data_set: entry.data_set.clone(),
                assignments: entry
                    .assignments
                    .iter()
                    .map(|((cloud_id, name), version)| Assignment {
                        cloud_id: cloud_id.clone(),
                        representation_name: name.clone(),
                        version: *version,
                    })
                    .collect(),
            })
            .collect()
    }

    pub async fn import(&self, snapshot: Vec<DataSetSnapshot>) {
        let imported = snapshot
            .into_iter()
            .map(|s| {
                let assignments = s
                    .assignments
                    .into_iter()
                    .map(|a| ((a.cloud_id, a.representation_name), a.version))
                    .collect();
                (
                    s.data_set.compound_id(),
                    DataSetEntry {
                        data_set: s.data_set,
                        assignments,
                    },
                )
            })
            .collect();
        *self.data_sets.write().await = imported;
    }
}
