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

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::fmt::Error;
use std::fmt::Formatter;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use blake2::Blake2b512;
use bstr::BString;
use chrono::DateTime;
use chrono::FixedOffset;
use digest::Digest as _;
use git_duplicate_lib::backend::Backend;
use git_duplicate_lib::backend::BackendError;
use git_duplicate_lib::backend::BackendResult;
use git_duplicate_lib::backend::CommitId;
use git_duplicate_lib::backend::CommitMetadata;
use git_duplicate_lib::backend::NewCommitMetadata;
use git_duplicate_lib::backend::Signature;
use git_duplicate_lib::backend::TreeId;
use git_duplicate_lib::object_id::ObjectId as _;

const HASH_LENGTH: usize = 20;

/// Signature used for commits created by test helpers.
pub fn default_signature() -> Signature {
    Signature {
        name: "Test User".to_owned(),
        email: "test.user@example.com".to_owned(),
        timestamp: DateTime::parse_from_rfc3339("2001-02-03T04:05:06+07:00").unwrap(),
    }
}

fn backend_committer() -> Signature {
    Signature {
        name: "Test Committer".to_owned(),
        email: "test.committer@example.com".to_owned(),
        timestamp: DateTime::parse_from_rfc3339("2002-03-04T05:06:07+07:00").unwrap(),
    }
}

/// Derives a tree id from a label, so tests can say "same tree" or
/// "different tree" without modeling file contents.
pub fn tree_id(label: &str) -> TreeId {
    let mut hasher = Blake2b512::new();
    hasher.update(b"tree\0");
    hasher.update(label.as_bytes());
    TreeId::new(hasher.finalize()[..HASH_LENGTH].to_vec())
}

#[derive(Clone, Debug)]
struct StoredCommit {
    tree: TreeId,
    parents: Vec<CommitId>,
    metadata: CommitMetadata,
    // Insertion order; commits are only ever inserted after their parents,
    // so a larger number means a newer commit.
    seq: u64,
}

#[derive(Debug, Default)]
struct TestBackendData {
    commits: HashMap<CommitId, StoredCommit>,
    names: HashMap<String, CommitId>,
    created: Vec<CommitId>,
    next_seq: u64,
}

/// An in-memory commit store for engine tests.
///
/// It's meant to be strict, in order to catch bugs where we make the wrong
/// assumptions: reads of unknown ids fail the way the git backend would,
/// and a pair of fault switches lets tests make `create_revision`
/// deliberately misbehave to exercise the verifier.
pub struct TestBackend {
    data: Arc<Mutex<TestBackendData>>,
    corrupt_created_trees: Mutex<bool>,
    drop_first_parent: Mutex<bool>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(TestBackendData::default())),
            corrupt_created_trees: Mutex::new(false),
            drop_first_parent: Mutex::new(false),
        }
    }

    fn locked_data(&self) -> MutexGuard<'_, TestBackendData> {
        self.data.lock().unwrap()
    }

    /// Makes subsequent `create_revision` calls store a tree different from
    /// the requested one.
    pub fn set_corrupt_created_trees(&self, corrupt: bool) {
        *self.corrupt_created_trees.lock().unwrap() = corrupt;
    }

    /// Makes subsequent `create_revision` calls silently drop the first
    /// requested parent.
    pub fn set_drop_first_parent(&self, drop: bool) {
        *self.drop_first_parent.lock().unwrap() = drop;
    }

    /// Adds a commit under a resolvable name and returns its id. The
    /// default signature authors and commits it.
    pub fn add_commit(
        &self,
        name: &str,
        tree: &TreeId,
        parents: &[CommitId],
        message: &str,
    ) -> CommitId {
        let metadata = CommitMetadata {
            author: default_signature(),
            committer: default_signature(),
            message: BString::from(message),
        };
        let id = self.insert_commit(tree.clone(), parents.to_vec(), metadata);
        self.locked_data().names.insert(name.to_owned(), id.clone());
        id
    }

    /// Ids passed to `create_revision` so far, in call order.
    pub fn created_commits(&self) -> Vec<CommitId> {
        self.locked_data().created.clone()
    }

    pub fn create_count(&self) -> usize {
        self.locked_data().created.len()
    }

    fn insert_commit(
        &self,
        tree: TreeId,
        parents: Vec<CommitId>,
        metadata: CommitMetadata,
    ) -> CommitId {
        let mut data = self.locked_data();
        let seq = data.next_seq;
        data.next_seq += 1;
        let id = commit_hash(&tree, &parents, &metadata, seq);
        data.commits.insert(
            id.clone(),
            StoredCommit {
                tree,
                parents,
                metadata,
                seq,
            },
        );
        id
    }

    fn get_commit(&self, id: &CommitId) -> BackendResult<StoredCommit> {
        self.locked_data()
            .commits
            .get(id)
            .cloned()
            .ok_or_else(|| object_not_found(id))
    }

    fn collect_ancestors(&self, head: &CommitId) -> BackendResult<HashSet<CommitId>> {
        let mut seen = HashSet::new();
        let mut work = vec![head.clone()];
        while let Some(id) = work.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            work.extend(self.get_commit(&id)?.parents);
        }
        Ok(seen)
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TestBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_struct("TestBackend").finish_non_exhaustive()
    }
}

fn commit_hash(
    tree: &TreeId,
    parents: &[CommitId],
    metadata: &CommitMetadata,
    seq: u64,
) -> CommitId {
    let mut hasher = Blake2b512::new();
    hasher.update(b"commit\0");
    hasher.update(tree.as_bytes());
    for parent in parents {
        hasher.update(b"\0parent\0");
        hasher.update(parent.as_bytes());
    }
    hasher.update(b"\0");
    hasher.update(&metadata.author.name);
    hasher.update(b"\0");
    hasher.update(&metadata.committer.name);
    hasher.update(b"\0");
    hasher.update(&metadata.message);
    hasher.update(seq.to_le_bytes());
    CommitId::new(hasher.finalize()[..HASH_LENGTH].to_vec())
}

fn object_not_found(id: &CommitId) -> BackendError {
    BackendError::ObjectNotFound {
        object_type: "commit",
        hash: id.hex(),
        source: "not in the test store".into(),
    }
}

impl Backend for TestBackend {
    fn resolve(&self, name: &str) -> BackendResult<CommitId> {
        let data = self.locked_data();
        if let Some(id) = data.names.get(name) {
            return Ok(id.clone());
        }
        CommitId::try_from_hex(name)
            .filter(|id| data.commits.contains_key(id))
            .ok_or_else(|| BackendError::RevisionNotFound {
                name: name.to_owned(),
                source: "not in the test store".into(),
            })
    }

    fn tree_of(&self, id: &CommitId) -> BackendResult<TreeId> {
        Ok(self.get_commit(id)?.tree)
    }

    fn parents_of(&self, id: &CommitId) -> BackendResult<Vec<CommitId>> {
        Ok(self.get_commit(id)?.parents)
    }

    fn metadata_of(&self, id: &CommitId) -> BackendResult<CommitMetadata> {
        Ok(self.get_commit(id)?.metadata)
    }

    fn ancestors_range(
        &self,
        old_base: &CommitId,
        tip: &CommitId,
    ) -> BackendResult<Vec<CommitId>> {
        let excluded = self.collect_ancestors(old_base)?;
        let mut members: Vec<(CommitId, u64)> = self
            .collect_ancestors(tip)?
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .map(|id| {
                let seq = self.get_commit(&id)?.seq;
                Ok((id, seq))
            })
            .collect::<BackendResult<_>>()?;
        members.sort_by_key(|(_, seq)| std::cmp::Reverse(*seq));
        Ok(members.into_iter().map(|(id, _)| id).collect())
    }

    fn create_revision(
        &self,
        tree: &TreeId,
        parents: &[CommitId],
        metadata: NewCommitMetadata,
    ) -> BackendResult<CommitId> {
        for parent in parents {
            // Strictness check: git would refuse a dangling parent too.
            self.get_commit(parent)?;
        }
        let stored_tree = if *self.corrupt_created_trees.lock().unwrap() {
            tree_id("corrupted")
        } else {
            tree.clone()
        };
        let stored_parents = if *self.drop_first_parent.lock().unwrap() {
            parents.iter().skip(1).cloned().collect()
        } else {
            parents.to_vec()
        };
        let metadata = CommitMetadata {
            author: metadata.author,
            committer: metadata.committer.unwrap_or_else(backend_committer),
            message: metadata.message,
        };
        let id = self.insert_commit(stored_tree, stored_parents, metadata);
        self.locked_data().created.push(id.clone());
        Ok(id)
    }
}
