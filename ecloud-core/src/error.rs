//! Error types for the eCloud store
//!
//! Every expected failure of a store operation is a [`StoreError`] value.
//! [`StoreError::kind`] folds the variants into the coarse taxonomy that
//! callers (a REST layer, the admin CLI) map onto status codes.

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Representation not found: {cloud_id}/{representation_name}")]
    RepresentationNotFound {
        cloud_id: String,
        representation_name: String,
    },

    #[error("Version not found: {cloud_id}/{representation_name}/{version}")]
    VersionNotFound {
        cloud_id: String,
        representation_name: String,
        version: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    #[error("Data provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Data set not found: {provider_id}/{data_set_id}")]
    DataSetNotFound {
        provider_id: String,
        data_set_id: String,
    },

    #[error("Data provider already exists: {0}")]
    ProviderAlreadyExists(String),

    #[error("Data set already exists: {provider_id}/{data_set_id}")]
    DataSetAlreadyExists {
        provider_id: String,
        data_set_id: String,
    },

    #[error("Cannot modify persistent representation: {0}")]
    CannotModifyPersistentRepresentation(String),

    #[error("Cannot persist representation without files: {0}")]
    CannotPersistEmptyRepresentation(String),

    #[error("Data provider {0} still owns data sets")]
    ProviderHasDataSets(String),

    #[error("Data provider {0} is still attributed to representations")]
    ProviderHasRecords(String),

    #[error("Content hash mismatch: declared {declared}, computed {computed}")]
    ContentHashMismatch { declared: String, computed: String },

    #[error("Unsatisfiable range: start {start} for content of length {length}")]
    UnsatisfiableRange { start: u64, length: u64 },

    #[error("Invalid search query: {0}")]
    InvalidSearchQuery(String),

    #[error("Invalid revision: {0}")]
    RevisionNotValid(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse failure classes shared by all store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    ImmutabilityViolation,
    IntegrityViolation,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    /// HTTP status a façade should answer with
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists
            | ErrorKind::ImmutabilityViolation
            | ErrorKind::IntegrityViolation => 409,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Internal => 500,
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::RecordNotFound(_)
            | StoreError::RepresentationNotFound { .. }
            | StoreError::VersionNotFound { .. }
            | StoreError::FileNotFound(_)
            | StoreError::RevisionNotFound(_)
            | StoreError::ProviderNotFound(_)
            | StoreError::DataSetNotFound { .. } => ErrorKind::NotFound,
            StoreError::ProviderAlreadyExists(_) | StoreError::DataSetAlreadyExists { .. } => {
                ErrorKind::AlreadyExists
            }
            StoreError::CannotModifyPersistentRepresentation(_) => ErrorKind::ImmutabilityViolation,
            StoreError::CannotPersistEmptyRepresentation(_)
            | StoreError::ProviderHasDataSets(_)
            | StoreError::ProviderHasRecords(_)
            | StoreError::ContentHashMismatch { .. }
            | StoreError::UnsatisfiableRange { .. } => ErrorKind::IntegrityViolation,
            StoreError::InvalidSearchQuery(_)
            | StoreError::RevisionNotValid(_)
            | StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::Io(_) | StoreError::Database(_) | StoreError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn representation_not_found(cloud_id: &str, representation_name: &str) -> Self {
        StoreError::RepresentationNotFound {
            cloud_id: cloud_id.to_string(),
            representation_name: representation_name.to_string(),
        }
    }

    pub(crate) fn version_not_found(cloud_id: &str, representation_name: &str, version: impl ToString) -> Self {
        StoreError::VersionNotFound {
            cloud_id: cloud_id.to_string(),
            representation_name: representation_name.to_string(),
            version: version.to_string(),
        }
    }

    pub(crate) fn data_set_not_found(provider_id: &str, data_set_id: &str) -> Self {
        StoreError::DataSetNotFound {
            provider_id: provider_id.to_string(),
            data_set_id: data_set_id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
