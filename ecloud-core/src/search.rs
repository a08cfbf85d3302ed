//! Representation search filters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::model::{CompoundDataSetId, Representation};

/// Filters for [`RecordService::search`](crate::service::RecordService::search).
/// All given filters must match; at least one is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationSearchParams {
    pub data_provider: Option<String>,
    pub data_set: Option<CompoundDataSetId>,
    pub representation_name: Option<String>,
    /// Inclusive lower bound on the creation date
    pub from_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the creation date
    pub to_date: Option<DateTime<Utc>>,
    pub persistent: Option<bool>,
}

impl RepresentationSearchParams {
    pub fn is_empty(&self) -> bool {
        self.data_provider.is_none()
            && self.data_set.is_none()
            && self.representation_name.is_none()
            && self.from_date.is_none()
            && self.to_date.is_none()
            && self.persistent.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(StoreError::InvalidSearchQuery(
                "At least one search parameter is required".to_string(),
            ));
        }
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from > to {
                return Err(StoreError::InvalidSearchQuery(format!(
                    "Date range is empty: {} is after {}",
                    from, to
                )));
            }
        }
        Ok(())
    }

    /// Check every filter except the data set one, which needs the data set store
    pub fn matches(&self, rep: &Representation) -> bool {
        if let Some(provider) = &self.data_provider {
            if &rep.data_provider != provider {
                return false;
            }
        }
        if let Some(name) = &self.representation_name {
            if &rep.representation_name != name {
                return false;
            }
        }
        if let Some(from) = self.from_date {
            if rep.creation_date < from {
                return false;
            }
        }
        if let Some(to) = self.to_date {
            if rep.creation_date > to {
                return false;
            }
        }
        match self.persistent {
            Some(persistent) => rep.persistent == persistent,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionId;
    use chrono::Duration;
    use uuid::Uuid;

    fn rep(provider: &str, persistent: bool) -> Representation {
        Representation {
            cloud_id: "R1".to_string(),
            representation_name: "edm".to_string(),
            version: VersionId::FIRST_DRAFT,
            data_provider: provider.to_string(),
            files: Vec::new(),
            persistent,
            creation_date: Utc::now(),
            content_id: Uuid::new_v4(),
            revisions: Vec::new(),
        }
    }

    #[test]
    fn test_empty_query_rejected() {
        let err = RepresentationSearchParams::default().validate().unwrap_err();
        assert!(matches!(err, StoreError::InvalidSearchQuery(_)));
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let now = Utc::now();
        let params = RepresentationSearchParams {
            from_date: Some(now),
            to_date: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_filters_combine() {
        let params = RepresentationSearchParams {
            data_provider: Some("P1".to_string()),
            persistent: Some(true),
            ..Default::default()
        };
        params.validate().unwrap();
        assert!(params.matches(&rep("P1", true)));
        assert!(!params.matches(&rep("P1", false)));
        assert!(!params.matches(&rep("P2", true)));
    }

    #[test]
    fn test_date_bounds() {
        let r = rep("P1", false);
        let params = RepresentationSearchParams {
            from_date: Some(r.creation_date - Duration::minutes(1)),
            to_date: Some(r.creation_date),
            ..Default::default()
        };
        assert!(params.matches(&r));
        let later = RepresentationSearchParams {
            from_date: Some(r.creation_date + Duration::minutes(1)),
            ..Default::default()
        };
        assert!(!later.matches(&r));
    }
}
