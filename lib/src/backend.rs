// Copyright 2025 The git-duplicate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![expect(missing_docs)]

use std::fmt::Debug;

use bstr::BString;
use chrono::DateTime;
use chrono::FixedOffset;
use thiserror::Error;

use crate::object_id::id_type;

id_type!(
    /// Identifier for a commit based on its content. When a commit is
    /// rewritten, its `CommitId` changes.
    pub CommitId
);
id_type!(
    /// Identifier for the content snapshot (tree) attached to a commit.
    pub TreeId
);

/// Represents a commit signature (author or committer).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<FixedOffset>,
}

/// Metadata read from an existing commit. Never mutated by the engine.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CommitMetadata {
    pub author: Signature,
    pub committer: Signature,
    /// The commit message, as raw bytes. Not assumed to be UTF-8.
    pub message: BString,
}

/// Metadata for a commit to be created.
///
/// A `None` committer means the backend fills in its own default committer
/// (name, email, and current time), the way `git commit-tree` does when no
/// committer is given explicitly.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NewCommitMetadata {
    pub author: Signature,
    pub committer: Option<Signature>,
    pub message: BString,
}

/// Backend error that may occur while reading or writing commits.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Revision \"{name}\" doesn't exist")]
    RevisionNotFound {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Object {hash} of type {object_type} not found")]
    ObjectNotFound {
        object_type: &'static str,
        hash: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error when reading object {hash} of type {object_type}")]
    ReadObject {
        object_type: &'static str,
        hash: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Could not write object of type {object_type}")]
    WriteObject {
        object_type: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Defines the narrow interface to the version-control store.
///
/// All calls block on the underlying store (a subprocess for the git
/// backend); failures are fatal to the run and are never retried.
pub trait Backend: Debug {
    /// Resolves a symbolic name (ref, `HEAD`, hex prefix, ...) to a commit
    /// id.
    fn resolve(&self, name: &str) -> BackendResult<CommitId>;

    /// The tree id attached to the given commit.
    fn tree_of(&self, id: &CommitId) -> BackendResult<TreeId>;

    /// The parents of the given commit, in order. Empty for a root commit.
    /// The first parent is the "mainline" parent; the order is semantically
    /// significant and must be preserved by callers.
    fn parents_of(&self, id: &CommitId) -> BackendResult<Vec<CommitId>>;

    /// Author, committer, and message of the given commit.
    fn metadata_of(&self, id: &CommitId) -> BackendResult<CommitMetadata>;

    /// All ancestors of `tip` that are not ancestors of `old_base`,
    /// newest-first (children before parents).
    fn ancestors_range(
        &self,
        old_base: &CommitId,
        tip: &CommitId,
    ) -> BackendResult<Vec<CommitId>>;

    /// Creates a new commit object and returns its id. No ref is created or
    /// moved.
    fn create_revision(
        &self,
        tree: &TreeId,
        parents: &[CommitId],
        metadata: NewCommitMetadata,
    ) -> BackendResult<CommitId>;
}
