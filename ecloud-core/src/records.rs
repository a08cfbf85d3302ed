//! Record store
//!
//! Owns the Record → Representation → Version → File hierarchy.
//!
//! Every (record, representation name) pair is a *lineage*: its version
//! history plus the id allocator, behind its own `RwLock`. The record map has
//! a separate lock that is only held long enough to find or insert a lineage,
//! so mutations of different representations never wait on each other.
//! Lock order is always record map first, lineage second.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::model::{File, Record, Representation, RepresentationRevision, Revision};
use crate::version::{VersionAllocator, VersionId};

/// A version plus the draft id it was created under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub representation: Representation,
    pub allocated_as: VersionId,
    /// Draft whose content is being deleted. Never written to snapshots.
    #[serde(skip)]
    pub deleting: bool,
}

#[derive(Debug)]
struct Lineage {
    allocator: VersionAllocator,
    /// Oldest first. A persisted version moves to the end.
    history: Vec<VersionEntry>,
    /// Set once the lineage is unlinked from the record map
    removed: bool,
}

impl Lineage {
    fn new() -> Self {
        Self {
            allocator: VersionAllocator::new(),
            history: Vec::new(),
            removed: false,
        }
    }

    /// Most recent persistent version, else the most recent draft
    fn latest(&self) -> Option<&Representation> {
        self.history
            .iter()
            .rev()
            .find(|e| e.representation.persistent)
            .or_else(|| self.history.last())
            .map(|e| &e.representation)
    }

    fn position(&self, version: &VersionId) -> Option<usize> {
        self.history
            .iter()
            .position(|e| e.representation.version == *version)
    }

    /// Position of a version that is not on its way out
    fn live_position(&self, cloud_id: &str, name: &str, version: &VersionId) -> Result<usize> {
        if self.removed {
            return Err(StoreError::representation_not_found(cloud_id, name));
        }
        self.position(version)
            .filter(|&idx| !self.history[idx].deleting)
            .ok_or_else(|| StoreError::version_not_found(cloud_id, name, version))
    }

    /// Like `position`, but also follows a draft id to the version it was
    /// persisted as
    fn position_or_alias(&self, version: &VersionId) -> Option<usize> {
        self.position(version).or_else(|| {
            self.history
                .iter()
                .position(|e| e.allocated_as == *version && e.representation.persistent)
        })
    }

    /// Append a new draft
    fn push_draft(
        &mut self,
        cloud_id: &str,
        name: &str,
        provider_id: &str,
        content_id: Uuid,
        files: Vec<File>,
    ) -> Representation {
        let version = self.allocator.next_draft();
        let representation = Representation {
            cloud_id: cloud_id.to_string(),
            representation_name: name.to_string(),
            version,
            data_provider: provider_id.to_string(),
            files,
            persistent: false,
            creation_date: Utc::now(),
            content_id,
            revisions: Vec::new(),
        };
        self.history.push(VersionEntry {
            representation: representation.clone(),
            allocated_as: version,
            deleting: false,
        });
        tracing::debug!("Created draft {}", representation.path());
        representation
    }

    /// Find a version that is about to be mutated. A draft id that has been
    /// persisted since is reported as an immutability violation.
    fn position_for_update(&self, cloud_id: &str, name: &str, version: &VersionId) -> Result<usize> {
        if let Some(idx) = self.position(version) {
            return Ok(idx);
        }
        match self.history.iter().find(|e| e.allocated_as == *version) {
            Some(entry) => Err(StoreError::CannotModifyPersistentRepresentation(format!(
                "{}/{}/{} was persisted as version {}",
                cloud_id, name, version, entry.representation.version
            ))),
            None => Err(StoreError::version_not_found(cloud_id, name, version)),
        }
    }
}

type LineageRef = Arc<RwLock<Lineage>>;

/// Exclusive hold on one version (and the rest of its lineage).
///
/// While a `LockedVersion` is alive no other operation can persist, delete
/// or modify any version of the same representation.
pub struct LockedVersion {
    guard: OwnedRwLockWriteGuard<Lineage>,
    index: usize,
}

impl LockedVersion {
    pub fn representation(&self) -> &Representation {
        &self.guard.history[self.index].representation
    }

    fn representation_mut(&mut self) -> &mut Representation {
        &mut self.guard.history[self.index].representation
    }

    pub fn is_persistent(&self) -> bool {
        self.representation().persistent
    }

    /// Fail unless the version is still a draft that is not being deleted
    pub fn ensure_draft(&self) -> Result<()> {
        let rep = self.representation();
        if rep.persistent {
            return Err(StoreError::CannotModifyPersistentRepresentation(rep.path()));
        }
        if self.guard.history[self.index].deleting {
            return Err(StoreError::version_not_found(
                &rep.cloud_id,
                &rep.representation_name,
                rep.version,
            ));
        }
        Ok(())
    }

    /// Start deleting the draft. Until [`LockedVersion::remove`] or
    /// [`LockedVersion::cancel_delete`], every mutation of it fails with
    /// `VersionNotFound`, while reads still see it.
    pub fn begin_delete(&mut self) -> Result<Representation> {
        self.ensure_draft()?;
        self.guard.history[self.index].deleting = true;
        Ok(self.representation().clone())
    }

    pub fn cancel_delete(&mut self) {
        self.guard.history[self.index].deleting = false;
    }

    /// Add a file, replacing one with the same name in place
    pub fn add_or_replace_file(&mut self, file: File) -> Result<Representation> {
        self.ensure_draft()?;
        let rep = self.representation_mut();
        match rep.files.iter_mut().find(|f| f.file_name == file.file_name) {
            Some(existing) => *existing = file,
            None => rep.files.push(file),
        }
        Ok(rep.clone())
    }

    pub fn remove_file(&mut self, file_name: &str) -> Result<Representation> {
        self.ensure_draft()?;
        let rep = self.representation_mut();
        let idx = rep
            .files
            .iter()
            .position(|f| f.file_name == file_name)
            .ok_or_else(|| StoreError::FileNotFound(format!("{}/{}", rep.path(), file_name)))?;
        rep.files.remove(idx);
        Ok(rep.clone())
    }

    /// Turn the draft into the next persistent version
    pub fn persist(&mut self, reject_empty: bool) -> Result<Representation> {
        self.ensure_draft()?;
        if reject_empty && self.representation().files.is_empty() {
            return Err(StoreError::CannotPersistEmptyRepresentation(
                self.representation().path(),
            ));
        }
        let lineage = &mut *self.guard;
        let new_id = lineage.allocator.next_persistent();
        let mut entry = lineage.history.remove(self.index);
        entry.representation.version = new_id;
        entry.representation.persistent = true;
        entry.representation.creation_date = Utc::now();
        lineage.history.push(entry);
        self.index = lineage.history.len() - 1;
        Ok(self.representation().clone())
    }

    /// Drop the draft from the history
    pub fn remove(mut self) -> Result<Representation> {
        if self.is_persistent() {
            return Err(StoreError::CannotModifyPersistentRepresentation(
                self.representation().path(),
            ));
        }
        Ok(self.guard.history.remove(self.index).representation)
    }
}

/// Serializable image of one lineage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageSnapshot {
    pub representation_name: String,
    pub allocator: VersionAllocator,
    pub versions: Vec<VersionEntry>,
}

/// Serializable image of one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub cloud_id: String,
    pub lineages: Vec<LineageSnapshot>,
}

/// Record/representation/version metadata store
pub struct RecordStore {
    /// cloud id -> representation name -> lineage
    records: RwLock<HashMap<String, HashMap<String, LineageRef>>>,
    reject_empty_persist: bool,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            reject_empty_persist: false,
        }
    }

    /// Refuse to persist drafts without files
    pub fn with_reject_empty_persist(mut self, reject: bool) -> Self {
        self.reject_empty_persist = reject;
        self
    }

    async fn lineage(&self, cloud_id: &str, name: &str) -> Result<LineageRef> {
        let records = self.records.read().await;
        let reps = records
            .get(cloud_id)
            .ok_or_else(|| StoreError::RecordNotFound(cloud_id.to_string()))?;
        reps.get(name)
            .cloned()
            .ok_or_else(|| StoreError::representation_not_found(cloud_id, name))
    }

    /// Append a new empty draft, creating the record and lineage if needed
    async fn insert_draft(&self, cloud_id: &str, name: &str, provider_id: &str) -> Representation {
        loop {
            let lineage = {
                let mut records = self.records.write().await;
                records
                    .entry(cloud_id.to_string())
                    .or_default()
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(RwLock::new(Lineage::new())))
                    .clone()
            };
            let mut lineage = lineage.write().await;
            if lineage.removed {
                // lost a race with a delete; the next round starts a fresh lineage
                continue;
            }
            return lineage.push_draft(cloud_id, name, provider_id, Uuid::new_v4(), Vec::new());
        }
    }

    /// Create a new empty draft. The provider must have been checked by the caller.
    pub async fn create_representation(
        &self,
        cloud_id: &str,
        name: &str,
        provider_id: &str,
    ) -> Result<Representation> {
        if cloud_id.is_empty() || name.is_empty() {
            return Err(StoreError::InvalidArgument(
                "Cloud id and representation name must not be empty".to_string(),
            ));
        }
        Ok(self.insert_draft(cloud_id, name, provider_id).await)
    }

    /// The record with the latest version of each representation
    pub async fn get_record(&self, cloud_id: &str) -> Result<Record> {
        let lineages: Vec<LineageRef> = {
            let records = self.records.read().await;
            records
                .get(cloud_id)
                .ok_or_else(|| StoreError::RecordNotFound(cloud_id.to_string()))?
                .values()
                .cloned()
                .collect()
        };
        let mut representations = Vec::new();
        for lineage in lineages {
            let lineage = lineage.read().await;
            if lineage.removed {
                continue;
            }
            if let Some(latest) = lineage.latest() {
                representations.push(latest.clone());
            }
        }
        representations.sort_by(|a, b| a.representation_name.cmp(&b.representation_name));
        Ok(Record {
            cloud_id: cloud_id.to_string(),
            representations,
        })
    }

    /// A specific version, or the latest one when `version` is `None`
    pub async fn get_representation(
        &self,
        cloud_id: &str,
        name: &str,
        version: Option<&VersionId>,
    ) -> Result<Representation> {
        let lineage = self.lineage(cloud_id, name).await?;
        let lineage = lineage.read().await;
        if lineage.removed || lineage.history.is_empty() {
            return Err(StoreError::representation_not_found(cloud_id, name));
        }
        match version {
            None => lineage
                .latest()
                .cloned()
                .ok_or_else(|| StoreError::representation_not_found(cloud_id, name)),
            Some(v) => lineage
                .position(v)
                .map(|idx| lineage.history[idx].representation.clone())
                .ok_or_else(|| StoreError::version_not_found(cloud_id, name, v)),
        }
    }

    /// Resolve a stored pointer. Unlike [`RecordStore::get_representation`],
    /// a draft id that has been persisted resolves to the persisted version.
    pub async fn resolve_pointer(
        &self,
        cloud_id: &str,
        name: &str,
        version: Option<&VersionId>,
    ) -> Result<Representation> {
        let Some(v) = version else {
            return self.get_representation(cloud_id, name, None).await;
        };
        let lineage = self.lineage(cloud_id, name).await?;
        let lineage = lineage.read().await;
        if lineage.removed || lineage.history.is_empty() {
            return Err(StoreError::representation_not_found(cloud_id, name));
        }
        lineage
            .position_or_alias(v)
            .map(|idx| lineage.history[idx].representation.clone())
            .ok_or_else(|| StoreError::version_not_found(cloud_id, name, v))
    }

    /// A version that is about to receive content. Fails unless it is
    /// still a draft, including when its draft id has since been persisted.
    pub async fn get_draft(&self, cloud_id: &str, name: &str, version: &VersionId) -> Result<Representation> {
        let lineage = self.lineage(cloud_id, name).await?;
        let lineage = lineage.read().await;
        if lineage.removed {
            return Err(StoreError::representation_not_found(cloud_id, name));
        }
        let idx = lineage.position_for_update(cloud_id, name, version)?;
        let rep = &lineage.history[idx].representation;
        if rep.persistent {
            return Err(StoreError::CannotModifyPersistentRepresentation(rep.path()));
        }
        if lineage.history[idx].deleting {
            return Err(StoreError::version_not_found(cloud_id, name, version));
        }
        Ok(rep.clone())
    }

    /// All versions, most recent first
    pub async fn list_versions(&self, cloud_id: &str, name: &str) -> Result<Vec<Representation>> {
        let lineage = self.lineage(cloud_id, name).await?;
        let lineage = lineage.read().await;
        if lineage.removed || lineage.history.is_empty() {
            return Err(StoreError::representation_not_found(cloud_id, name));
        }
        Ok(lineage
            .history
            .iter()
            .rev()
            .map(|e| e.representation.clone())
            .collect())
    }

    /// Every version of every representation of the record
    pub async fn record_versions(&self, cloud_id: &str) -> Result<Vec<Representation>> {
        let lineages: Vec<LineageRef> = {
            let records = self.records.read().await;
            records
                .get(cloud_id)
                .ok_or_else(|| StoreError::RecordNotFound(cloud_id.to_string()))?
                .values()
                .cloned()
                .collect()
        };
        let mut versions = Vec::new();
        for lineage in lineages {
            let lineage = lineage.read().await;
            versions.extend(lineage.history.iter().map(|e| e.representation.clone()));
        }
        Ok(versions)
    }

    /// Take the exclusive lock of the lineage holding `version`
    pub async fn lock_version(
        &self,
        cloud_id: &str,
        name: &str,
        version: &VersionId,
    ) -> Result<LockedVersion> {
        let lineage = self.lineage(cloud_id, name).await?;
        let guard = lineage.write_owned().await;
        if guard.removed {
            return Err(StoreError::representation_not_found(cloud_id, name));
        }
        let index = guard.position_for_update(cloud_id, name, version)?;
        Ok(LockedVersion { guard, index })
    }

    pub async fn add_or_replace_file(
        &self,
        cloud_id: &str,
        name: &str,
        version: &VersionId,
        file: File,
    ) -> Result<Representation> {
        let mut locked = self.lock_version(cloud_id, name, version).await?;
        locked.add_or_replace_file(file)
    }

    pub async fn remove_file(
        &self,
        cloud_id: &str,
        name: &str,
        version: &VersionId,
        file_name: &str,
    ) -> Result<Representation> {
        let mut locked = self.lock_version(cloud_id, name, version).await?;
        locked.remove_file(file_name)
    }

    pub async fn persist(&self, cloud_id: &str, name: &str, version: &VersionId) -> Result<Representation> {
        let mut locked = self.lock_version(cloud_id, name, version).await?;
        let persisted = locked.persist(self.reject_empty_persist)?;
        tracing::info!("Persisted {}/{}/{} as {}", cloud_id, name, version, persisted.version);
        Ok(persisted)
    }

    /// Remove a draft from the history. Content is the caller's business.
    pub async fn delete_version(&self, cloud_id: &str, name: &str, version: &VersionId) -> Result<Representation> {
        let locked = self.lock_version(cloud_id, name, version).await?;
        let removed = locked.remove()?;
        tracing::info!("Deleted version {}", removed.path());
        Ok(removed)
    }

    /// Remove every version under `name`, persistent or not.
    /// Returns the versions that were removed.
    pub async fn delete_representation(&self, cloud_id: &str, name: &str) -> Result<Vec<Representation>> {
        let lineage = {
            let mut records = self.records.write().await;
            let reps = records
                .get_mut(cloud_id)
                .ok_or_else(|| StoreError::RecordNotFound(cloud_id.to_string()))?;
            reps.remove(name)
                .ok_or_else(|| StoreError::representation_not_found(cloud_id, name))?
        };
        let removed = Self::retire(&lineage).await;
        tracing::info!("Deleted representation {}/{} ({} versions)", cloud_id, name, removed.len());
        Ok(removed)
    }

    /// Remove the record and everything under it.
    /// Returns the versions that were removed.
    pub async fn delete_record(&self, cloud_id: &str) -> Result<Vec<Representation>> {
        let lineages = self
            .records
            .write()
            .await
            .remove(cloud_id)
            .ok_or_else(|| StoreError::RecordNotFound(cloud_id.to_string()))?;
        let mut removed = Vec::new();
        for lineage in lineages.values() {
            removed.extend(Self::retire(lineage).await);
        }
        tracing::info!("Deleted record {} ({} versions)", cloud_id, removed.len());
        Ok(removed)
    }

    async fn retire(lineage: &LineageRef) -> Vec<Representation> {
        let mut lineage = lineage.write().await;
        lineage.removed = true;
        lineage
            .history
            .drain(..)
            .map(|e| e.representation)
            .collect()
    }

    /// Create a new draft holding the files of `version`.
    ///
    /// `duplicate` receives the source version and the content id of the
    /// future copy and must copy the bytes of every source file. It runs
    /// before the copy exists, so no file entry ever points at missing bytes.
    ///
    /// The lineage stays write-locked from reading the source until the copy
    /// is appended: the source cannot change under `duplicate`, and a
    /// representation deleted in the meantime is never brought back.
    pub async fn copy_representation<F, Fut>(
        &self,
        cloud_id: &str,
        name: &str,
        version: &VersionId,
        duplicate: F,
    ) -> Result<Representation>
    where
        F: FnOnce(Representation, Uuid) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let lineage = self.lineage(cloud_id, name).await?;
        let mut lineage = lineage.write().await;
        let idx = lineage.live_position(cloud_id, name, version)?;
        let source = lineage.history[idx].representation.clone();
        let content_id = Uuid::new_v4();
        let provider_id = source.data_provider.clone();
        let files = source.files.clone();
        duplicate(source, content_id).await?;
        let copy = lineage.push_draft(cloud_id, name, &provider_id, content_id, files);
        tracing::info!("Copied {}/{}/{} to {}", cloud_id, name, version, copy.version);
        Ok(copy)
    }

    /// Tag a version (draft or persistent) with a revision, replacing an
    /// earlier revision with the same provider and name
    pub async fn add_revision(
        &self,
        cloud_id: &str,
        name: &str,
        version: &VersionId,
        revision: Revision,
    ) -> Result<Representation> {
        if revision.revision_name.is_empty() || revision.revision_provider_id.is_empty() {
            return Err(StoreError::RevisionNotValid(
                "Revision name and revision provider must not be empty".to_string(),
            ));
        }
        let lineage = self.lineage(cloud_id, name).await?;
        let mut lineage = lineage.write().await;
        let idx = lineage.live_position(cloud_id, name, version)?;
        let rep = &mut lineage.history[idx].representation;
        match rep.revisions.iter_mut().find(|r| r.same_mark(&revision)) {
            Some(existing) => *existing = revision,
            None => rep.revisions.push(revision),
        }
        Ok(rep.clone())
    }

    /// Revision of a version by its `provider_name` key
    pub async fn get_revision(
        &self,
        cloud_id: &str,
        name: &str,
        version: &VersionId,
        revision_key: &str,
    ) -> Result<Revision> {
        let rep = self.get_representation(cloud_id, name, Some(version)).await?;
        rep.revisions
            .iter()
            .find(|r| r.key() == revision_key)
            .cloned()
            .ok_or_else(|| StoreError::RevisionNotFound(format!("{}/{}", rep.path(), revision_key)))
    }

    pub async fn delete_revision(
        &self,
        cloud_id: &str,
        name: &str,
        version: &VersionId,
        revision_name: &str,
        revision_provider_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Revision> {
        let lineage = self.lineage(cloud_id, name).await?;
        let mut lineage = lineage.write().await;
        let idx = lineage.live_position(cloud_id, name, version)?;
        let rep = &mut lineage.history[idx].representation;
        let pos = rep
            .revisions
            .iter()
            .position(|r| {
                r.revision_name == revision_name
                    && r.revision_provider_id == revision_provider_id
                    && r.creation_timestamp == timestamp
            })
            .ok_or_else(|| {
                StoreError::RevisionNotFound(format!(
                    "{}/{}_{} at {}",
                    rep.path(),
                    revision_provider_id,
                    revision_name,
                    timestamp
                ))
            })?;
        Ok(rep.revisions.remove(pos))
    }

    /// The version carrying the given revision. Without a timestamp the most
    /// recent such revision wins.
    pub async fn get_representation_revision(
        &self,
        cloud_id: &str,
        name: &str,
        revision_provider_id: &str,
        revision_name: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<RepresentationRevision> {
        let lineage = self.lineage(cloud_id, name).await?;
        let lineage = lineage.read().await;
        if lineage.removed {
            return Err(StoreError::representation_not_found(cloud_id, name));
        }
        let mut best: Option<(&Representation, &Revision)> = None;
        for rep in lineage.history.iter().map(|e| &e.representation) {
            for revision in &rep.revisions {
                if revision.revision_provider_id != revision_provider_id
                    || revision.revision_name != revision_name
                    || timestamp.is_some_and(|t| t != revision.creation_timestamp)
                {
                    continue;
                }
                if best.is_none_or(|(_, b)| revision.creation_timestamp >= b.creation_timestamp) {
                    best = Some((rep, revision));
                }
            }
        }
        let (rep, revision) = best.ok_or_else(|| {
            StoreError::RevisionNotFound(format!(
                "{}/{}/{}_{}",
                cloud_id, name, revision_provider_id, revision_name
            ))
        })?;
        Ok(RepresentationRevision {
            cloud_id: cloud_id.to_string(),
            representation_name: name.to_string(),
            version: rep.version,
            revision: revision.clone(),
            files: rep.files.clone(),
        })
    }

    /// Every stored version accepted by `filter`, ordered by record,
    /// representation name and history
    pub async fn find_representations<F>(&self, filter: F) -> Vec<Representation>
    where
        F: Fn(&Representation) -> bool,
    {
        let mut lineages: Vec<(String, String, LineageRef)> = {
            let records = self.records.read().await;
            records
                .iter()
                .flat_map(|(cloud_id, reps)| {
                    reps.iter()
                        .map(move |(name, l)| (cloud_id.clone(), name.clone(), l.clone()))
                })
                .collect()
        };
        lineages.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        let mut found = Vec::new();
        for (_, _, lineage) in lineages {
            let lineage = lineage.read().await;
            found.extend(
                lineage
                    .history
                    .iter()
                    .map(|e| &e.representation)
                    .filter(|r| filter(r))
                    .cloned(),
            );
        }
        found
    }

    /// Whether any version anywhere is attributed to `provider_id`
    pub async fn references_provider(&self, provider_id: &str) -> bool {
        !self
            .find_representations(|r| r.data_provider == provider_id)
            .await
            .is_empty()
    }

    pub async fn export(&self) -> Vec<RecordSnapshot> {
        let records: Vec<(String, Vec<(String, LineageRef)>)> = {
            let records = self.records.read().await;
            records
                .iter()
                .map(|(cloud_id, reps)| {
                    let reps = reps.iter().map(|(n, l)| (n.clone(), l.clone())).collect();
                    (cloud_id.clone(), reps)
                })
                .collect()
        };
        let mut snapshot = Vec::with_capacity(records.len());
        for (cloud_id, reps) in records {
            let mut lineages = Vec::with_capacity(reps.len());
            for (name, lineage) in reps {
                let lineage = lineage.read().await;
                lineages.push(LineageSnapshot {
                    representation_name: name,
                    allocator: lineage.allocator.clone(),
                    versions: lineage.history.clone(),
                });
            }
            snapshot.push(RecordSnapshot { cloud_id, lineages });
        }
        snapshot
    }

    /// Replace the whole store content with a snapshot
    pub async fn import(&self, snapshot: Vec<RecordSnapshot>) {
        let mut imported = HashMap::with_capacity(snapshot.len());
        for record in snapshot {
            let lineages = record
                .lineages
                .into_iter()
                .map(|l| {
                    let lineage = Lineage {
                        allocator: l.allocator,
                        history: l.versions,
                        removed: false,
                    };
                    (l.representation_name, Arc::new(RwLock::new(lineage)))
                })
                .collect();
            imported.insert(record.cloud_id, lineages);
        }
        *self.records.write().await = imported;
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> File {
        File::new(name, "text/xml")
    }

    fn v(s: &str) -> VersionId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_first_draft() {
        let store = RecordStore::new();
        let rep = store.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(rep.version.to_string(), "1.PRE-1");
        assert!(!rep.persistent);
        assert!(rep.files.is_empty());
        assert_eq!(rep.data_provider, "P1");
    }

    #[tokio::test]
    async fn test_persist_numbering() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        let second = store.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(second.version, v("1.PRE-2"));

        let persisted = store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();
        assert_eq!(persisted.version, v("1"));
        assert!(persisted.persistent);

        let next = store.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(next.version, v("2.PRE-1"));

        let persisted = store.persist("R1", "edm", &v("1.PRE-2")).await.unwrap();
        assert_eq!(persisted.version, v("2"));
    }

    #[tokio::test]
    async fn test_latest_resolution_prefers_persistent() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(
            store.get_representation("R1", "edm", None).await.unwrap().version,
            v("1.PRE-1")
        );
        store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(store.get_representation("R1", "edm", None).await.unwrap().version, v("1"));
    }

    #[tokio::test]
    async fn test_add_replace_remove_file() {
        let store = RecordStore::new();
        let draft = store.create_representation("R1", "edm", "P1").await.unwrap();
        store.add_or_replace_file("R1", "edm", &draft.version, file("a.xml")).await.unwrap();
        store.add_or_replace_file("R1", "edm", &draft.version, file("b.xml")).await.unwrap();
        let mut replacement = file("a.xml");
        replacement.mime_type = "application/xml".to_string();
        let rep = store
            .add_or_replace_file("R1", "edm", &draft.version, replacement)
            .await
            .unwrap();
        assert_eq!(rep.files.len(), 2);
        assert_eq!(rep.files[0].file_name, "a.xml");
        assert_eq!(rep.files[0].mime_type, "application/xml");

        let rep = store.remove_file("R1", "edm", &draft.version, "a.xml").await.unwrap();
        assert_eq!(rep.files.len(), 1);
        assert!(matches!(
            store.remove_file("R1", "edm", &draft.version, "a.xml").await,
            Err(StoreError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persistent_is_immutable() {
        let store = RecordStore::new();
        let draft = store.create_representation("R1", "edm", "P1").await.unwrap();
        store.add_or_replace_file("R1", "edm", &draft.version, file("a.xml")).await.unwrap();
        let persisted = store.persist("R1", "edm", &draft.version).await.unwrap();

        let add = store.add_or_replace_file("R1", "edm", &persisted.version, file("b.xml")).await;
        assert!(matches!(add, Err(StoreError::CannotModifyPersistentRepresentation(_))));
        let remove = store.remove_file("R1", "edm", &persisted.version, "a.xml").await;
        assert!(matches!(remove, Err(StoreError::CannotModifyPersistentRepresentation(_))));
        let delete = store.delete_version("R1", "edm", &persisted.version).await;
        assert!(matches!(delete, Err(StoreError::CannotModifyPersistentRepresentation(_))));
        let again = store.persist("R1", "edm", &persisted.version).await;
        assert!(matches!(again, Err(StoreError::CannotModifyPersistentRepresentation(_))));

        let unchanged = store.get_representation("R1", "edm", Some(&persisted.version)).await.unwrap();
        assert_eq!(unchanged.files, persisted.files);
    }

    #[tokio::test]
    async fn test_old_draft_id_after_persist() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();

        let again = store.persist("R1", "edm", &v("1.PRE-1")).await;
        assert!(matches!(again, Err(StoreError::CannotModifyPersistentRepresentation(_))));
        let read = store.get_representation("R1", "edm", Some(&v("1.PRE-1"))).await;
        assert!(matches!(read, Err(StoreError::VersionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_not_found_errors() {
        let store = RecordStore::new();
        assert!(matches!(
            store.get_representation("nope", "edm", None).await,
            Err(StoreError::RecordNotFound(_))
        ));
        store.create_representation("R1", "edm", "P1").await.unwrap();
        assert!(matches!(
            store.get_representation("R1", "other", None).await,
            Err(StoreError::RepresentationNotFound { .. })
        ));
        assert!(matches!(
            store.get_representation("R1", "edm", Some(&v("9"))).await,
            Err(StoreError::VersionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_deleted_draft_id_not_reused() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        let second = store.create_representation("R1", "edm", "P1").await.unwrap();
        store.delete_version("R1", "edm", &second.version).await.unwrap();
        let third = store.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(third.version, v("1.PRE-3"));
    }

    #[tokio::test]
    async fn test_empty_representation_reports_not_found() {
        let store = RecordStore::new();
        let draft = store.create_representation("R1", "edm", "P1").await.unwrap();
        store.delete_version("R1", "edm", &draft.version).await.unwrap();
        assert!(matches!(
            store.get_representation("R1", "edm", None).await,
            Err(StoreError::RepresentationNotFound { .. })
        ));
        let record = store.get_record("R1").await.unwrap();
        assert!(record.representations.is_empty());
    }

    #[tokio::test]
    async fn test_list_versions_most_recent_first() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        let versions: Vec<String> = store
            .list_versions("R1", "edm")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.version.to_string())
            .collect();
        assert_eq!(versions, vec!["2.PRE-1", "1"]);
    }

    #[tokio::test]
    async fn test_delete_representation_and_record() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();
        store.create_representation("R1", "dc", "P1").await.unwrap();

        let removed = store.delete_representation("R1", "edm").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store.get_representation("R1", "edm", None).await.is_err());
        assert_eq!(store.get_record("R1").await.unwrap().representations.len(), 1);

        // a fresh lineage restarts numbering
        let fresh = store.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(fresh.version, v("1.PRE-1"));

        let removed = store.delete_record("R1").await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(matches!(store.get_record("R1").await, Err(StoreError::RecordNotFound(_))));
        assert!(matches!(store.delete_record("R1").await, Err(StoreError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_representation() {
        let store = RecordStore::new();
        let draft = store.create_representation("R1", "edm", "P1").await.unwrap();
        store.add_or_replace_file("R1", "edm", &draft.version, file("a.xml")).await.unwrap();
        let persisted = store.persist("R1", "edm", &draft.version).await.unwrap();

        let copy = store
            .copy_representation("R1", "edm", &persisted.version, |source, content_id| async move {
                assert_eq!(source.files.len(), 1);
                assert_ne!(source.content_id, content_id);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(copy.version, v("2.PRE-1"));
        assert!(!copy.persistent);
        assert_eq!(copy.files, persisted.files);
    }

    #[tokio::test]
    async fn test_copy_aborts_when_duplication_fails() {
        let store = RecordStore::new();
        let draft = store.create_representation("R1", "edm", "P1").await.unwrap();
        let result = store
            .copy_representation("R1", "edm", &draft.version, |_, _| async {
                Err(StoreError::FileNotFound("gone".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.list_versions("R1", "edm").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_pointer_follows_persist() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();

        let resolved = store.resolve_pointer("R1", "edm", Some(&v("1.PRE-1"))).await.unwrap();
        assert_eq!(resolved.version, v("1"));
        assert!(matches!(
            store.resolve_pointer("R1", "edm", Some(&v("1.PRE-7"))).await,
            Err(StoreError::VersionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_draft_being_deleted_rejects_mutations() {
        let store = RecordStore::new();
        let draft = store.create_representation("R1", "edm", "P1").await.unwrap();
        let marked = store
            .lock_version("R1", "edm", &draft.version)
            .await
            .unwrap()
            .begin_delete()
            .unwrap();
        assert_eq!(marked.version, draft.version);

        assert!(matches!(
            store.add_or_replace_file("R1", "edm", &draft.version, file("a.xml")).await,
            Err(StoreError::VersionNotFound { .. })
        ));
        assert!(matches!(
            store.persist("R1", "edm", &draft.version).await,
            Err(StoreError::VersionNotFound { .. })
        ));
        assert!(store.get_draft("R1", "edm", &draft.version).await.is_err());
        // still readable until removed
        assert!(store.get_representation("R1", "edm", Some(&draft.version)).await.is_ok());

        store
            .lock_version("R1", "edm", &draft.version)
            .await
            .unwrap()
            .cancel_delete();
        store.add_or_replace_file("R1", "edm", &draft.version, file("a.xml")).await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_of_deleted_representation_fails() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.create_representation("R1", "dc", "P1").await.unwrap();
        store.delete_representation("R1", "edm").await.unwrap();

        let result = store
            .copy_representation("R1", "edm", &v("1.PRE-1"), |_, _| async { Ok(()) })
            .await;
        assert!(matches!(result, Err(StoreError::RepresentationNotFound { .. })));
        assert!(store.get_representation("R1", "edm", None).await.is_err());
    }

    #[tokio::test]
    async fn test_revisions() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        let persisted = store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();

        let first = Revision::new("enriched", "P2");
        let rep = store
            .add_revision("R1", "edm", &persisted.version, first.clone())
            .await
            .unwrap();
        assert_eq!(rep.revisions, vec![first.clone()]);

        // same provider and name replaces
        let second = Revision::new("enriched", "P2").with_timestamp(first.creation_timestamp + chrono::Duration::seconds(5));
        let rep = store
            .add_revision("R1", "edm", &persisted.version, second.clone())
            .await
            .unwrap();
        assert_eq!(rep.revisions.len(), 1);
        assert_eq!(
            store.get_revision("R1", "edm", &persisted.version, "P2_enriched").await.unwrap(),
            second
        );
        assert!(matches!(
            store.get_revision("R1", "edm", &persisted.version, "P2_other").await,
            Err(StoreError::RevisionNotFound(_))
        ));
        assert!(matches!(
            store.add_revision("R1", "edm", &persisted.version, Revision::new("", "P2")).await,
            Err(StoreError::RevisionNotValid(_))
        ));

        store
            .delete_revision("R1", "edm", &persisted.version, "enriched", "P2", second.creation_timestamp)
            .await
            .unwrap();
        assert!(matches!(
            store
                .delete_revision("R1", "edm", &persisted.version, "enriched", "P2", second.creation_timestamp)
                .await,
            Err(StoreError::RevisionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_representation_revision_picks_most_recent() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.add_or_replace_file("R1", "edm", &v("2.PRE-1"), file("a.xml")).await.unwrap();

        let older = Revision::new("harvest", "P2");
        let newer = Revision::new("harvest", "P2").with_timestamp(older.creation_timestamp + chrono::Duration::minutes(1));
        store.add_revision("R1", "edm", &v("1"), older.clone()).await.unwrap();
        store.add_revision("R1", "edm", &v("2.PRE-1"), newer.clone()).await.unwrap();

        let found = store
            .get_representation_revision("R1", "edm", "P2", "harvest", None)
            .await
            .unwrap();
        assert_eq!(found.version, v("2.PRE-1"));
        assert_eq!(found.files.len(), 1);

        let found = store
            .get_representation_revision("R1", "edm", "P2", "harvest", Some(older.creation_timestamp))
            .await
            .unwrap();
        assert_eq!(found.version, v("1"));
        assert!(matches!(
            store.get_representation_revision("R1", "edm", "P3", "harvest", None).await,
            Err(StoreError::RevisionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_empty_persist() {
        let store = RecordStore::new().with_reject_empty_persist(true);
        let draft = store.create_representation("R1", "edm", "P1").await.unwrap();
        assert!(matches!(
            store.persist("R1", "edm", &draft.version).await,
            Err(StoreError::CannotPersistEmptyRepresentation(_))
        ));
    }

    #[tokio::test]
    async fn test_export_import() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        store.persist("R1", "edm", &v("1.PRE-1")).await.unwrap();

        let restored = RecordStore::new();
        restored.import(store.export().await).await;
        assert_eq!(restored.get_representation("R1", "edm", None).await.unwrap().version, v("1"));
        let next = restored.create_representation("R1", "edm", "P1").await.unwrap();
        assert_eq!(next.version, v("2.PRE-1"));
    }

    #[tokio::test]
    async fn test_references_provider() {
        let store = RecordStore::new();
        store.create_representation("R1", "edm", "P1").await.unwrap();
        assert!(store.references_provider("P1").await);
        assert!(!store.references_provider("P2").await);
    }
}
