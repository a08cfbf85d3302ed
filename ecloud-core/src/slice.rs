//! Paged listings
//!
//! A continuation token is the key of the first element of the next page,
//! base64-encoded so callers treat it as opaque.

use crate::error::{Result, StoreError};
use crate::model::ResultSlice;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

const SEPARATOR: char = '\n';

pub(crate) fn encode_token(parts: &[&str]) -> String {
    URL_SAFE_NO_PAD.encode(parts.join(&SEPARATOR.to_string()))
}

pub(crate) fn decode_token(token: &str, expected_parts: usize) -> Result<Vec<String>> {
    let bad = || StoreError::InvalidArgument(format!("Malformed continuation token: {:?}", token));
    let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| bad())?;
    let text = String::from_utf8(raw).map_err(|_| bad())?;
    let parts: Vec<String> = text.split(SEPARATOR).map(str::to_string).collect();
    if parts.len() != expected_parts {
        return Err(bad());
    }
    Ok(parts)
}

/// Take at most `limit` items; the item after them (if any) becomes the token.
pub(crate) fn paginate<T, I, F>(items: I, limit: usize, token_of: F) -> Result<ResultSlice<T>>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> String,
{
    if limit == 0 {
        return Err(StoreError::InvalidArgument("Page size must be positive".to_string()));
    }
    let mut iter = items.into_iter();
    let results: Vec<T> = iter.by_ref().take(limit).collect();
    let next_slice = iter.next().map(|next| token_of(&next));
    Ok(ResultSlice::new(results, next_slice))
}
