//! Mutation events
//!
//! Every committed mutation that an external index cares about produces one
//! [`StoreEvent`]. Events are published after the mutation is visible; a sink
//! failing to take an event is logged and otherwise ignored, since the store
//! itself is the source of truth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};
use crate::model::{CompoundDataSetId, Representation, Revision};
use crate::version::VersionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreEvent {
    RepresentationPersisted {
        representation: Representation,
        /// Data sets holding a pointer to the persisted version
        data_sets: Vec<CompoundDataSetId>,
    },
    RepresentationVersionRemoved {
        cloud_id: String,
        representation_name: String,
        version: VersionId,
    },
    RepresentationRemoved {
        cloud_id: String,
        representation_name: String,
    },
    RecordRemoved {
        cloud_id: String,
    },
    AssignmentAdded {
        representation: Representation,
        data_set: CompoundDataSetId,
    },
    AssignmentRemoved {
        cloud_id: String,
        representation_name: String,
        data_sets: Vec<CompoundDataSetId>,
    },
    AllAssignmentsRemovedFromDataSet {
        data_set: CompoundDataSetId,
    },
    RevisionAdded {
        representation: Representation,
        revision: Revision,
    },
    RevisionRemoved {
        cloud_id: String,
        representation_name: String,
        version: VersionId,
        revision: Revision,
    },
}

impl StoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::RepresentationPersisted { .. } => "representation-persisted",
            StoreEvent::RepresentationVersionRemoved { .. } => "representation-version-removed",
            StoreEvent::RepresentationRemoved { .. } => "representation-removed",
            StoreEvent::RecordRemoved { .. } => "record-removed",
            StoreEvent::AssignmentAdded { .. } => "assignment-added",
            StoreEvent::AssignmentRemoved { .. } => "assignment-removed",
            StoreEvent::AllAssignmentsRemovedFromDataSet { .. } => "all-assignments-removed",
            StoreEvent::RevisionAdded { .. } => "revision-added",
            StoreEvent::RevisionRemoved { .. } => "revision-removed",
        }
    }
}

/// Destination for store events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &StoreEvent) -> Result<()>;
}

/// Fans events out to any number of in-process subscribers
pub struct BroadcastEventSink {
    sender: broadcast::Sender<StoreEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: &StoreEvent) -> Result<()> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|e| StoreError::Serialization(format!("broadcast failed: {}", e)))
    }
}

/// Drops every event
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: &StoreEvent) -> Result<()> {
        Ok(())
    }
}

/// Publishes events on behalf of the stores, swallowing sink failures
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn EventSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn null() -> Self {
        Self::new(Arc::new(NullEventSink))
    }

    pub async fn notify(&self, event: StoreEvent) {
        tracing::debug!("Publishing {} event", event.name());
        if let Err(e) = self.sink.publish(&event).await {
            tracing::warn!("{} event not delivered (ignored): {}", event.name(), e);
        }
    }
}
