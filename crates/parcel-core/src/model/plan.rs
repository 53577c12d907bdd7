//! Plan trees and the file references embedded in them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::BlobId;

const BLOB_PREFIX: &str = "blob:";

/// Reference to a file used by a keyword or a plan node.
///
/// Definitions coming out of an archive point at paths inside that archive.
/// Once staged, every reference points at a stored blob.
/// Serialized as a plain string: `blob:<id>` or the archive path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileRef {
    Archive(String),
    Blob(BlobId),
}

impl FileRef {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(BLOB_PREFIX) {
            Some(id) => Self::Blob(BlobId::from(id)),
            None => Self::Archive(raw.to_string()),
        }
    }

    pub fn as_blob(&self) -> Option<&BlobId> {
        match self {
            Self::Blob(id) => Some(id),
            Self::Archive(_) => None,
        }
    }

    pub fn as_archive_path(&self) -> Option<&str> {
        match self {
            Self::Archive(path) => Some(path),
            Self::Blob(_) => None,
        }
    }
}

impl From<String> for FileRef {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<FileRef> for String {
    fn from(value: FileRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive(path) => f.write_str(path),
            Self::Blob(id) => write!(f, "{}{}", BLOB_PREFIX, id),
        }
    }
}

/// A node of a plan tree.
///
/// The set of variants is closed; [`PlanNode::visit_file_refs_mut`] knows
/// exactly which of them carry file references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlanNode {
    Sequence {
        #[serde(default)]
        children: Vec<PlanNode>,
    },
    CallKeyword {
        keyword: String,
        #[serde(default)]
        input: BTreeMap<String, String>,
    },
    CallPlan {
        plan: String,
    },
    /// Iterates its children over the rows of a data file.
    ForEach {
        data: FileRef,
        #[serde(default)]
        children: Vec<PlanNode>,
    },
    Script {
        file: FileRef,
    },
    Echo {
        text: String,
    },
}

impl PlanNode {
    pub fn sequence(children: Vec<PlanNode>) -> Self {
        Self::Sequence { children }
    }

    pub fn call_keyword(keyword: impl Into<String>) -> Self {
        Self::CallKeyword {
            keyword: keyword.into(),
            input: BTreeMap::new(),
        }
    }

    pub fn children(&self) -> &[PlanNode] {
        match self {
            Self::Sequence { children } | Self::ForEach { children, .. } => children,
            Self::CallKeyword { .. } | Self::CallPlan { .. } | Self::Script { .. } | Self::Echo { .. } => &[],
        }
    }

    /// Walk the tree depth-first and hand every file reference to `visit`.
    ///
    /// Stops at the first error.
    pub fn visit_file_refs_mut<E>(
        &mut self,
        visit: &mut impl FnMut(&mut FileRef) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Self::Sequence { children } => {
                for child in children {
                    child.visit_file_refs_mut(visit)?;
                }
            }
            Self::ForEach { data, children } => {
                visit(data)?;
                for child in children {
                    child.visit_file_refs_mut(visit)?;
                }
            }
            Self::Script { file } => visit(file)?,
            Self::CallKeyword { .. } | Self::CallPlan { .. } | Self::Echo { .. } => {}
        }
        Ok(())
    }

    /// All file references of the tree, in visiting order.
    pub fn file_refs(&self) -> Vec<FileRef> {
        let mut refs = Vec::new();
        let mut copy = self.clone();
        let _ = copy.visit_file_refs_mut(&mut |file: &mut FileRef| -> Result<(), ()> {
            refs.push(file.clone());
            Ok(())
        });
        refs
    }
}
