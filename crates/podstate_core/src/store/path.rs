//! Collection and document paths.
//!
//! Paths alternate collection and document segments, so a collection path has
//! an odd number of segments and a document path an even number. Both display
//! with a leading `/`.

use super::{StoreError, StoreResult};
use crate::model::subject::SubjectId;
use std::fmt::{Display, Formatter};

const ARTIFACTS_COLLECTION: &str = "artifacts";
const USERS_COLLECTION: &str = "users";
const CALCULATIONS_COLLECTION: &str = "calculations";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

/// Private partition of one subject:
/// `/artifacts/{namespace}/users/{subject}/calculations`.
pub fn partition_path(namespace: &str, subject: &SubjectId) -> StoreResult<CollectionPath> {
    CollectionPath::from_segments([
        ARTIFACTS_COLLECTION,
        namespace,
        USERS_COLLECTION,
        subject.as_str(),
        CALCULATIONS_COLLECTION,
    ])
}

/// Whether `segment` can appear between `/` separators.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('/')
}

impl CollectionPath {
    /// Parses `"a/b/c"` or `"/a/b/c"`.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        Self::from_segments(trimmed.split('/')).map_err(|_| invalid(raw))
    }

    pub fn from_segments<I, S>(segments: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = segments
            .into_iter()
            .map(|segment| segment.as_ref().to_string())
            .collect::<Vec<_>>();
        if segments.len() % 2 == 0 || !segments.iter().all(|s| is_valid_segment(s)) {
            return Err(invalid(&format!("/{}", segments.join("/"))));
        }
        Ok(Self { segments })
    }

    /// Path of the document `id` inside this collection.
    pub fn document(&self, id: &str) -> StoreResult<DocumentPath> {
        if !is_valid_segment(id) {
            return Err(invalid(&format!("{self}/{id}")));
        }
        Ok(DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    /// Storage key: segments joined without the leading `/`.
    pub fn key(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl DocumentPath {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.key())
    }
}

impl Display for DocumentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

fn invalid(path: &str) -> StoreError {
    StoreError::InvalidPath(path.to_string())
}
