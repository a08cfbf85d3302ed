//! Argument parsing helpers

use ecloud_core::CompoundDataSetId;

#[derive(Debug, thiserror::Error)]
pub enum ArgError {
    #[error("expected <provider>/<data set>, got {0:?}")]
    DataSetId(String),
}

pub fn parse_data_set_id(s: &str) -> Result<CompoundDataSetId, ArgError> {
    match s.split_once('/') {
        Some((provider, data_set)) if !provider.is_empty() && !data_set.is_empty() => {
            Ok(CompoundDataSetId::new(provider, data_set))
        }
        _ => Err(ArgError::DataSetId(s.to_string())),
    }
}
