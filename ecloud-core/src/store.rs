//! Store assembly
//!
//! Builds every component once from a [`StoreConfig`] and wires them into a
//! [`RecordService`]. Each `Store` is independent; tests build as many as they
//! like.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::StoreConfig;
use crate::content::{ContentRouter, ContentStore, DiskContentStore, InMemoryContentStore, SqliteContentStore};
use crate::datasets::DataSetStore;
use crate::error::Result;
use crate::events::{BroadcastEventSink, Notifier, StoreEvent};
use crate::providers::DataProviderRegistry;
use crate::records::RecordStore;
use crate::service::{PageSizes, RecordService};
use crate::snapshot::StoreSnapshot;

pub struct Store {
    service: RecordService,
    events: Arc<BroadcastEventSink>,
    snapshot_path: Option<PathBuf>,
}

impl Store {
    /// Open the configured backends and load the metadata snapshot, if any
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let object: Arc<dyn ContentStore> = match &config.content_root {
            Some(root) => Arc::new(DiskContentStore::open(root)?),
            None => Arc::new(InMemoryContentStore::new()),
        };
        let database: Arc<dyn ContentStore> = match &config.database_path {
            Some(path) => Arc::new(SqliteContentStore::open(path)?),
            None => Arc::new(SqliteContentStore::open_in_memory()?),
        };

        let events = Arc::new(BroadcastEventSink::new(config.event_buffer));
        let notifier = Notifier::new(events.clone());
        let records = Arc::new(RecordStore::new().with_reject_empty_persist(config.reject_empty_persist));
        let providers = Arc::new(DataProviderRegistry::new());
        let data_sets = Arc::new(DataSetStore::new(records.clone(), providers.clone(), notifier.clone()));
        let service = RecordService::new(
            records,
            providers,
            data_sets,
            ContentRouter::new(object, database),
            notifier,
        )
        .with_page_sizes(PageSizes {
            default: config.default_page_size,
            max: config.max_page_size,
        });

        let store = Self {
            service,
            events,
            snapshot_path: config.snapshot_path.clone(),
        };
        store.load_snapshot().await?;
        Ok(store)
    }

    /// Store with every backend in memory
    pub async fn in_memory() -> Result<Self> {
        Self::open(StoreConfig::default()).await
    }

    pub fn service(&self) -> &RecordService {
        &self.service
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::new(
            self.service.providers().export().await,
            self.service.records().export().await,
            self.service.data_sets().export().await,
        )
    }

    pub async fn restore(&self, snapshot: StoreSnapshot) {
        self.service.providers().import(snapshot.providers).await;
        self.service.records().import(snapshot.records).await;
        self.service.data_sets().import(snapshot.data_sets).await;
    }

    async fn load_snapshot(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(snapshot) = StoreSnapshot::read_from(path)? {
            tracing::info!(
                "Loaded metadata snapshot {:?} ({} records, {} providers)",
                path,
                snapshot.records.len(),
                snapshot.providers.len()
            );
            self.restore(snapshot).await;
        }
        Ok(())
    }

    /// Write the metadata snapshot, when a snapshot path is configured
    pub async fn save_snapshot(&self) -> Result<()> {
        if let Some(path) = &self.snapshot_path {
            self.snapshot().await.write_to(path)?;
            tracing::debug!("Saved metadata snapshot {:?}", path);
        }
        Ok(())
    }
}
