//! eCloud Core Library
//!
//! Versioned metadata and content store:
//! - Records, representations and their draft/persistent versions
//! - Content storage (object directory, SQLite, in-memory)
//! - Data providers and data sets with assignment pointers
//! - Mutation events for external indexers
//! - Metadata snapshots and TOML configuration

pub mod config;
pub mod content;
pub mod datasets;
pub mod error;
pub mod events;
pub mod model;
pub mod providers;
pub mod records;
pub mod search;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod version;

mod slice;

pub use config::StoreConfig;
pub use content::{
    ByteRange, ContentKey, ContentRouter, ContentStore, DiskContentStore, InMemoryContentStore,
    PutResult, SqliteContentStore,
};
pub use datasets::{Assignment, DataSetStore};
pub use error::{ErrorKind, Result, StoreError};
pub use events::{BroadcastEventSink, EventSink, Notifier, NullEventSink, StoreEvent};
pub use model::{
    CompoundDataSetId, DataProvider, DataProviderProperties, DataSet, File, Record, Representation,
    RepresentationRevision, ResultSlice, Revision, StorageBackend,
};
pub use providers::{DataProviderRegistry, ProviderGuard};
pub use records::{LockedVersion, RecordStore};
pub use search::RepresentationSearchParams;
pub use service::{FileUpload, PageSizes, RecordService, StoredFile};
pub use snapshot::StoreSnapshot;
pub use store::Store;
pub use version::{VersionAllocator, VersionId};
