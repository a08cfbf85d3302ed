//! Record service
//!
//! The operations external callers use. Composes the record store, the
//! content stores, providers and data sets, and keeps the rules that span
//! them:
//!
//! - bytes are only written for drafts, and a file entry is only added once
//!   its bytes are in place;
//! - deletions remove content before metadata, so a failure leaves orphaned
//!   bytes rather than files without bytes;
//! - a copy duplicates all content before the new draft becomes visible;
//! - every committed mutation produces one event.
//!
//! Revisions are processing marks. They can be added to and removed from
//! persistent versions as well as drafts.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::content::{ByteRange, ContentKey, ContentRouter};
use crate::datasets::DataSetStore;
use crate::error::{Result, StoreError};
use crate::events::{Notifier, StoreEvent};
use crate::model::{
    DataSet, File, Record, Representation, RepresentationRevision, ResultSlice, Revision, StorageBackend,
};
use crate::providers::DataProviderRegistry;
use crate::records::RecordStore;
use crate::search::RepresentationSearchParams;
use crate::slice::{decode_token, encode_token, paginate};
use crate::version::VersionId;

/// Bytes plus descriptive data of a file being uploaded
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Generated when absent
    pub file_name: Option<String>,
    pub mime_type: String,
    pub storage: StorageBackend,
    /// Checked against the MD5 of `data` when present
    pub expected_md5: Option<String>,
    pub data: Bytes,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            mime_type: mime_type.into(),
            storage: StorageBackend::default(),
            expected_md5: None,
            data: data.into(),
        }
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.expected_md5 = Some(md5.into());
        self
    }

    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub representation: Representation,
    pub file: File,
    /// `false` when an existing file was replaced
    pub created: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PageSizes {
    pub default: usize,
    pub max: usize,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self { default: 100, max: 1000 }
    }
}

pub struct RecordService {
    records: Arc<RecordStore>,
    providers: Arc<DataProviderRegistry>,
    data_sets: Arc<DataSetStore>,
    content: ContentRouter,
    notifier: Notifier,
    page_sizes: PageSizes,
}

impl RecordService {
    pub fn new(
        records: Arc<RecordStore>,
        providers: Arc<DataProviderRegistry>,
        data_sets: Arc<DataSetStore>,
        content: ContentRouter,
        notifier: Notifier,
    ) -> Self {
        Self {
            records,
            providers,
            data_sets,
            content,
            notifier,
            page_sizes: PageSizes::default(),
        }
    }

    pub fn with_page_sizes(mut self, page_sizes: PageSizes) -> Self {
        self.page_sizes = page_sizes;
        self
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    pub fn providers(&self) -> &Arc<DataProviderRegistry> {
        &self.providers
    }

    pub fn data_sets(&self) -> &Arc<DataSetStore> {
        &self.data_sets
    }

    pub fn content(&self) -> &ContentRouter {
        &self.content
    }

    fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.page_sizes.default)
            .clamp(1, self.page_sizes.max.max(1))
    }

    // ---- records and representations ----

    pub async fn get_record(&self, cloud_id: &str) -> Result<Record> {
        self.records.get_record(cloud_id).await
    }

    pub async fn delete_record(&self, cloud_id: &str) -> Result<()> {
        let versions = self.records.record_versions(cloud_id).await?;
        let deleted = self.delete_content_of(&versions).await?;
        let removed = self.records.delete_record(cloud_id).await?;
        self.sweep(&removed, &deleted).await;
        self.notifier
            .notify(StoreEvent::RecordRemoved {
                cloud_id: cloud_id.to_string(),
            })
            .await;
        Ok(())
    }

    pub async fn create_representation(
        &self,
        cloud_id: &str,
        representation_name: &str,
        provider_id: &str,
    ) -> Result<Representation> {
        let _provider = self.providers.pin(provider_id).await?;
        self.records
            .create_representation(cloud_id, representation_name, provider_id)
            .await
    }

    pub async fn get_representation(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: Option<&VersionId>,
    ) -> Result<Representation> {
        self.records
            .get_representation(cloud_id, representation_name, version)
            .await
    }

    pub async fn list_versions(&self, cloud_id: &str, representation_name: &str) -> Result<Vec<Representation>> {
        self.records.list_versions(cloud_id, representation_name).await
    }

    pub async fn persist(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
    ) -> Result<Representation> {
        let persisted = self
            .records
            .persist(cloud_id, representation_name, version)
            .await?;
        self.data_sets
            .retarget(cloud_id, representation_name, version, &persisted.version)
            .await;
        let data_sets = self
            .data_sets
            .data_sets_for_representation(cloud_id, representation_name, &persisted.version)
            .await;
        self.notifier
            .notify(StoreEvent::RepresentationPersisted {
                representation: persisted.clone(),
                data_sets,
            })
            .await;
        Ok(persisted)
    }

    /// Delete a draft and its content.
    ///
    /// The draft is marked first, so no upload or persist can slip in while
    /// its content is deleted without holding the version lock.
    pub async fn delete_version(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
    ) -> Result<()> {
        let doomed = self
            .records
            .lock_version(cloud_id, representation_name, version)
            .await?
            .begin_delete()?;
        if let Err(e) = self.delete_content_of(std::slice::from_ref(&doomed)).await {
            if let Ok(mut locked) = self
                .records
                .lock_version(cloud_id, representation_name, version)
                .await
            {
                locked.cancel_delete();
            }
            return Err(e);
        }
        match self
            .records
            .lock_version(cloud_id, representation_name, version)
            .await
        {
            Ok(locked) => {
                locked.remove()?;
            }
            // the whole representation went away in the meantime
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        tracing::info!("Deleted version {}", doomed.path());
        self.notifier
            .notify(StoreEvent::RepresentationVersionRemoved {
                cloud_id: cloud_id.to_string(),
                representation_name: representation_name.to_string(),
                version: *version,
            })
            .await;
        Ok(())
    }

    /// Delete every version of a representation, persistent ones included
    pub async fn delete_representation(&self, cloud_id: &str, representation_name: &str) -> Result<()> {
        let versions = match self.records.list_versions(cloud_id, representation_name).await {
            Ok(versions) => versions,
            // a lineage whose drafts were all deleted still has to go
            Err(StoreError::RepresentationNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        let deleted = self.delete_content_of(&versions).await?;
        let removed = self
            .records
            .delete_representation(cloud_id, representation_name)
            .await?;
        self.sweep(&removed, &deleted).await;
        self.notifier
            .notify(StoreEvent::RepresentationRemoved {
                cloud_id: cloud_id.to_string(),
                representation_name: representation_name.to_string(),
            })
            .await;
        Ok(())
    }

    /// New draft holding a copy of every file of `version`
    pub async fn copy_representation(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
    ) -> Result<Representation> {
        self.records
            .copy_representation(cloud_id, representation_name, version, |source, content_id| async move {
                let copies: Vec<(StorageBackend, ContentKey, ContentKey)> = source
                    .files
                    .iter()
                    .map(|file| {
                        let src = ContentKey::for_file(&source, &file.file_name);
                        let dst = ContentKey::new(
                            source.cloud_id.clone(),
                            source.representation_name.clone(),
                            content_id.to_string(),
                            file.file_name.clone(),
                        );
                        (file.storage, src, dst)
                    })
                    .collect();
                let copied = try_join_all(
                    copies
                        .iter()
                        .map(|(backend, src, dst)| self.content.store(*backend).copy(src, dst)),
                )
                .await;
                if let Err(e) = copied {
                    for (backend, _, dst) in &copies {
                        self.discard(*backend, dst).await;
                    }
                    return Err(e);
                }
                Ok(())
            })
            .await
    }

    // ---- files ----

    /// Store a file in a draft, replacing a file of the same name.
    ///
    /// Bytes go to a staging key first, outside any lock. They are moved to
    /// their final key and recorded while the version is locked; if the
    /// version was persisted in the meantime the staged bytes are dropped.
    pub async fn put_content(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        upload: FileUpload,
    ) -> Result<StoredFile> {
        let current = self
            .records
            .get_draft(cloud_id, representation_name, version)
            .await?;

        let file_name = match upload.file_name {
            Some(name) if name.is_empty() => {
                return Err(StoreError::InvalidArgument("File name must not be empty".to_string()));
            }
            Some(name) => name,
            None => Uuid::new_v4().to_string(),
        };
        let store = self.content.store(upload.storage).clone();
        let staged = ContentKey::for_file(
            &current,
            &format!("{}.upload-{}", file_name, Uuid::new_v4()),
        );
        let put = store
            .put(&staged, upload.data, upload.expected_md5.as_deref())
            .await?;

        let mut locked = match self
            .records
            .lock_version(cloud_id, representation_name, version)
            .await
        {
            Ok(locked) => locked,
            Err(e) => {
                self.discard(upload.storage, &staged).await;
                return Err(e);
            }
        };
        if let Err(e) = locked.ensure_draft() {
            drop(locked);
            self.discard(upload.storage, &staged).await;
            return Err(e);
        }

        let target = ContentKey::for_file(locked.representation(), &file_name);
        let previous = locked.representation().file(&file_name).cloned();
        if let Err(e) = store.rename(&staged, &target).await {
            drop(locked);
            self.discard(upload.storage, &staged).await;
            return Err(e);
        }
        if let Some(previous) = &previous {
            if previous.storage != upload.storage {
                self.discard(previous.storage, &target).await;
            }
        }

        let file = File {
            file_name,
            mime_type: upload.mime_type,
            md5: put.md5,
            content_length: put.content_length,
            date: Some(Utc::now()),
            storage: upload.storage,
        };
        let representation = locked.add_or_replace_file(file.clone())?;
        tracing::debug!(
            "Stored {} ({} bytes) in {}",
            file.file_name,
            file.content_length,
            representation.path()
        );
        Ok(StoredFile {
            representation,
            file,
            created: previous.is_none(),
        })
    }

    pub async fn get_file(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        file_name: &str,
    ) -> Result<File> {
        let rep = self
            .records
            .get_representation(cloud_id, representation_name, Some(version))
            .await?;
        rep.file(file_name)
            .cloned()
            .ok_or_else(|| StoreError::FileNotFound(format!("{}/{}", rep.path(), file_name)))
    }

    async fn locate(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        file_name: &str,
    ) -> Result<(ContentKey, File)> {
        let rep = self
            .records
            .get_representation(cloud_id, representation_name, Some(version))
            .await?;
        let file = rep
            .file(file_name)
            .cloned()
            .ok_or_else(|| StoreError::FileNotFound(format!("{}/{}", rep.path(), file_name)))?;
        Ok((ContentKey::for_file(&rep, file_name), file))
    }

    pub async fn get_content(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        file_name: &str,
        range: ByteRange,
    ) -> Result<Bytes> {
        let (key, file) = self
            .locate(cloud_id, representation_name, version, file_name)
            .await?;
        self.content.store(file.storage).get(&key, range).await
    }

    /// Whole content together with its recorded MD5
    pub async fn get_content_with_md5(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        file_name: &str,
    ) -> Result<(String, Bytes)> {
        let (key, file) = self
            .locate(cloud_id, representation_name, version, file_name)
            .await?;
        let data = self.content.store(file.storage).get(&key, ByteRange::full()).await?;
        Ok((file.md5, data))
    }

    /// Remove one file from a draft
    pub async fn delete_content(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        file_name: &str,
    ) -> Result<Representation> {
        let mut locked = self
            .records
            .lock_version(cloud_id, representation_name, version)
            .await?;
        locked.ensure_draft()?;
        let file = locked.representation().file(file_name).cloned().ok_or_else(|| {
            StoreError::FileNotFound(format!("{}/{}", locked.representation().path(), file_name))
        })?;
        let key = ContentKey::for_file(locked.representation(), file_name);
        self.content.store(file.storage).delete(&key).await?;
        locked.remove_file(file_name)
    }

    // ---- revisions ----

    pub async fn add_revision(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        revision: Revision,
    ) -> Result<Representation> {
        let representation = self
            .records
            .add_revision(cloud_id, representation_name, version, revision.clone())
            .await?;
        tracing::debug!("Added revision {} to {}", revision.key(), representation.path());
        self.notifier
            .notify(StoreEvent::RevisionAdded {
                representation: representation.clone(),
                revision,
            })
            .await;
        Ok(representation)
    }

    /// Revision by its `provider_name` key
    pub async fn get_revision(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        revision_key: &str,
    ) -> Result<Revision> {
        self.records
            .get_revision(cloud_id, representation_name, version, revision_key)
            .await
    }

    pub async fn delete_revision(
        &self,
        cloud_id: &str,
        representation_name: &str,
        version: &VersionId,
        revision_name: &str,
        revision_provider_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let revision = self
            .records
            .delete_revision(
                cloud_id,
                representation_name,
                version,
                revision_name,
                revision_provider_id,
                timestamp,
            )
            .await?;
        self.notifier
            .notify(StoreEvent::RevisionRemoved {
                cloud_id: cloud_id.to_string(),
                representation_name: representation_name.to_string(),
                version: *version,
                revision,
            })
            .await;
        Ok(())
    }

    pub async fn get_representation_revision(
        &self,
        cloud_id: &str,
        representation_name: &str,
        revision_provider_id: &str,
        revision_name: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<RepresentationRevision> {
        self.records
            .get_representation_revision(
                cloud_id,
                representation_name,
                revision_provider_id,
                revision_name,
                timestamp,
            )
            .await
    }

    // ---- providers and data sets ----

    pub async fn delete_provider(&self, provider_id: &str) -> Result<()> {
        self.providers
            .delete(provider_id, &self.records, &self.data_sets)
            .await
    }

    pub async fn list_data_set(
        &self,
        provider_id: &str,
        data_set_id: &str,
        start_from: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ResultSlice<Representation>> {
        self.data_sets
            .list_data_set(provider_id, data_set_id, start_from, self.page_limit(limit))
            .await
    }

    pub async fn get_data_sets(
        &self,
        provider_id: &str,
        start_from: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ResultSlice<DataSet>> {
        self.data_sets
            .get_data_sets(provider_id, start_from, self.page_limit(limit))
            .await
    }

    // ---- search ----

    /// Versions matching every given filter, in record, name and history order
    pub async fn search(
        &self,
        params: &RepresentationSearchParams,
        start_from: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ResultSlice<Representation>> {
        params.validate()?;
        let offset: usize = match start_from {
            Some(token) => decode_token(token, 1)?[0]
                .parse()
                .map_err(|_| StoreError::InvalidArgument(format!("Malformed continuation token: {:?}", token)))?,
            None => 0,
        };

        let members: Option<HashSet<(String, String, VersionId)>> = match &params.data_set {
            Some(id) => Some(
                self.data_sets
                    .members(&id.provider_id, &id.data_set_id)
                    .await?
                    .into_iter()
                    .map(|r| (r.cloud_id, r.representation_name, r.version))
                    .collect(),
            ),
            None => None,
        };
        let found = self
            .records
            .find_representations(|rep| {
                params.matches(rep)
                    && members.as_ref().is_none_or(|m| {
                        m.contains(&(rep.cloud_id.clone(), rep.representation_name.clone(), rep.version))
                    })
            })
            .await;

        let limit = self.page_limit(limit);
        let mut page = paginate(found.into_iter().skip(offset), limit, |_| String::new())?;
        if page.next_slice.is_some() {
            page.next_slice = Some(encode_token(&[&(offset + limit).to_string()]));
        }
        Ok(page)
    }

    // ---- helpers ----

    /// Delete the content of every file of `versions`. Returns the keys deleted.
    async fn delete_content_of(&self, versions: &[Representation]) -> Result<HashSet<(StorageBackend, ContentKey)>> {
        let targets: Vec<(StorageBackend, ContentKey)> = versions
            .iter()
            .flat_map(|rep| {
                rep.files
                    .iter()
                    .map(move |f| (f.storage, ContentKey::for_file(rep, &f.file_name)))
            })
            .collect();
        try_join_all(
            targets
                .iter()
                .map(|(backend, key)| self.content.store(*backend).delete(key)),
        )
        .await?;
        Ok(targets.into_iter().collect())
    }

    /// Best-effort removal of content of versions that appeared between
    /// listing and metadata removal
    async fn sweep(&self, removed: &[Representation], deleted: &HashSet<(StorageBackend, ContentKey)>) {
        for rep in removed {
            for file in &rep.files {
                let key = ContentKey::for_file(rep, &file.file_name);
                if !deleted.contains(&(file.storage, key.clone())) {
                    self.discard(file.storage, &key).await;
                }
            }
        }
    }

    async fn discard(&self, backend: StorageBackend, key: &ContentKey) {
        if let Err(e) = self.content.store(backend).delete(key).await {
            tracing::warn!("Could not delete orphaned content {} (ignored): {}", key, e);
        }
    }
}
