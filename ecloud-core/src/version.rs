//! Version identifiers
//!
//! Persistent versions are plain integers (`"3"`); drafts carry the persistent
//! number they will most likely become plus a draft counter (`"3.PRE-2"`).

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DRAFT_MARKER: &str = ".PRE-";

/// Identifier of one version of a representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionId {
    /// Immutable snapshot, numbered from 1
    Persistent(u64),
    /// Mutable draft `base.PRE-pre`
    Draft { base: u64, pre: u64 },
}

impl VersionId {
    /// The id of the very first draft of a representation
    pub const FIRST_DRAFT: VersionId = VersionId::Draft { base: 1, pre: 1 };

    pub fn is_persistent(&self) -> bool {
        matches!(self, VersionId::Persistent(_))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionId::Persistent(n) => write!(f, "{}", n),
            VersionId::Draft { base, pre } => write!(f, "{}{}{}", base, DRAFT_MARKER, pre),
        }
    }
}

fn parse_counter(part: &str, whole: &str) -> Result<u64, StoreError> {
    let n: u64 = part
        .parse()
        .map_err(|_| StoreError::InvalidArgument(format!("Malformed version id: {:?}", whole)))?;
    if n == 0 {
        return Err(StoreError::InvalidArgument(format!("Malformed version id: {:?}", whole)));
    }
    Ok(n)
}

impl FromStr for VersionId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(DRAFT_MARKER) {
            Some((base, pre)) => Ok(VersionId::Draft {
                base: parse_counter(base, s)?,
                pre: parse_counter(pre, s)?,
            }),
            None => Ok(VersionId::Persistent(parse_counter(s, s)?)),
        }
    }
}

impl TryFrom<String> for VersionId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> Self {
        id.to_string()
    }
}

/// Allocation state of one representation lineage.
///
/// Ids are derived from what was handed out before, not from whatever is
/// currently left in the history, so a deleted draft's id is never reissued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionAllocator {
    last_persistent: u64,
    last_draft: Option<(u64, u64)>,
}

impl VersionAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest persistent number handed out so far (0 if none)
    pub fn last_persistent(&self) -> u64 {
        self.last_persistent
    }

    /// Allocate the id for a new draft
    pub fn next_draft(&mut self) -> VersionId {
        let (base, pre) = match self.last_draft {
            // drafts keep counting until something gets persisted
            Some((base, pre)) if base > self.last_persistent => (base, pre + 1),
            _ => (self.last_persistent + 1, 1),
        };
        self.last_draft = Some((base, pre));
        VersionId::Draft { base, pre }
    }

    /// Allocate the id a draft receives when it is persisted
    pub fn next_persistent(&mut self) -> VersionId {
        self.last_persistent += 1;
        VersionId::Persistent(self.last_persistent)
    }
}
