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

//! The duplication engine: walks a commit DAG and recreates each commit on
//! top of a new base, remapping parent links to the new counterparts.

use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::IndexSet;
use thiserror::Error;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendResult;
use crate::backend::CommitId;
use crate::backend::NewCommitMetadata;
use crate::backend::TreeId;
use crate::verify;
use crate::verify::ConsistencyError;

/// State attached to one original commit id during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemapEntry {
    /// Not part of the duplication set; resolves to itself on demand.
    Unmapped,
    /// Known to require duplication, not yet produced.
    Pending,
    /// Duplication complete; the payload is the resulting commit id.
    Resolved(CommitId),
}

const UNMAPPED: RemapEntry = RemapEntry::Unmapped;

/// Mapping from original commit ids to their remap state.
///
/// An id never transitions from `Resolved` back to `Pending` or `Unmapped`;
/// looking up an id that was never inserted yields `Unmapped`.
#[derive(Clone, Debug, Default)]
pub struct RemapTable {
    entries: HashMap<CommitId, RemapEntry>,
}

impl RemapTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state of `id`, `Unmapped` if it was never inserted.
    pub fn get(&self, id: &CommitId) -> &RemapEntry {
        self.entries.get(id).unwrap_or(&UNMAPPED)
    }

    /// Marks `id` as requiring duplication.
    pub fn mark_pending(&mut self, id: CommitId) {
        let old = self.entries.insert(id, RemapEntry::Pending);
        debug_assert!(!matches!(old, Some(RemapEntry::Resolved(_))));
    }

    /// Records that `id` was duplicated as `new_id`.
    pub fn resolve(&mut self, id: CommitId, new_id: CommitId) {
        let old = self.entries.insert(id, RemapEntry::Resolved(new_id));
        debug_assert!(!matches!(old, Some(RemapEntry::Resolved(_))));
    }
}

/// Policy flags for one duplication run.
#[derive(Clone, Debug, Default)]
pub struct DuplicateOptions {
    /// Drop parent links pointing outside the duplication set instead of
    /// keeping the original parent.
    pub isolate: bool,
    /// Copy the committer from the original commit instead of letting the
    /// backend fill in its default.
    pub keep_committer: bool,
    /// Check every duplicated commit against the original and fail the run
    /// on any mismatch.
    pub verify: bool,
}

/// The outcome of a duplication run.
#[derive(Debug)]
pub struct DuplicateStats {
    /// Map of original commit id to newly created commit id, in creation
    /// order.
    pub duplicated_commits: IndexMap<CommitId, CommitId>,
    /// The duplicated counterpart of the requested tip.
    pub new_tip: CommitId,
}

/// Error aborting a duplication run. None of these are recoverable; the
/// unit of work is the whole requested range.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum DuplicateError {
    #[error(
        "The trees of the two base commits are not the same: \
         {old_base} has tree {old_tree}, {new_base} has tree {new_tree}"
    )]
    BaseTreesDiffer {
        old_base: CommitId,
        new_base: CommitId,
        old_tree: TreeId,
        new_tree: TreeId,
    },
    #[error("Revision range {old_base}..{tip} is empty; there is nothing to duplicate")]
    EmptyRange { old_base: CommitId, tip: CommitId },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Consistency(Box<ConsistencyError>),
}

impl From<ConsistencyError> for DuplicateError {
    fn from(err: ConsistencyError) -> Self {
        Self::Consistency(Box::new(err))
    }
}

/// All state of one duplication run. Constructed once, discarded at the
/// end; there is no process-wide state.
pub(crate) struct DuplicateContext<'a> {
    pub(crate) backend: &'a dyn Backend,
    pub(crate) options: DuplicateOptions,
    pub(crate) table: RemapTable,
    pub(crate) to_duplicate: IndexSet<CommitId>,
    pub(crate) old_base: CommitId,
    pub(crate) new_base: CommitId,
    duplicated: IndexMap<CommitId, CommitId>,
}

/// One suspended duplication in the explicit traversal stack: a commit
/// whose parents are being resolved.
struct Frame {
    commit_id: CommitId,
    orig_parents: Vec<CommitId>,
    /// Cursor into `orig_parents`.
    next_parent: usize,
    /// New parent list built so far. Preserves the original parent order;
    /// parents dropped in isolate mode are simply not pushed.
    new_parents: Vec<CommitId>,
}

impl Frame {
    fn read(backend: &dyn Backend, commit_id: CommitId) -> BackendResult<Self> {
        let orig_parents = backend.parents_of(&commit_id)?;
        Ok(Self {
            commit_id,
            orig_parents,
            next_parent: 0,
            new_parents: vec![],
        })
    }
}

/// Duplicates all ancestors of `tip` that are not ancestors of `old_base`
/// on top of `onto`, which must have the same tree as `old_base`.
///
/// No content merging ever happens: every duplicated commit reuses its
/// original's tree verbatim, which is why the equal-trees precondition is
/// checked up front instead of falling back to a merge.
///
/// `on_duplicated` is called once per created commit with the original id,
/// the new id, the number of commits duplicated so far, and the total.
pub fn duplicate_range(
    backend: &dyn Backend,
    old_base: &CommitId,
    tip: &CommitId,
    onto: &CommitId,
    options: &DuplicateOptions,
    on_duplicated: &mut dyn FnMut(&CommitId, &CommitId, usize, usize),
) -> Result<DuplicateStats, DuplicateError> {
    let old_tree = backend.tree_of(old_base)?;
    let new_tree = backend.tree_of(onto)?;
    if old_tree != new_tree {
        return Err(DuplicateError::BaseTreesDiffer {
            old_base: old_base.clone(),
            new_base: onto.clone(),
            old_tree,
            new_tree,
        });
    }

    // Newest-first, like the backend lists them.
    let to_duplicate: IndexSet<CommitId> = backend
        .ancestors_range(old_base, tip)?
        .into_iter()
        .collect();
    if to_duplicate.is_empty() {
        return Err(DuplicateError::EmptyRange {
            old_base: old_base.clone(),
            tip: tip.clone(),
        });
    }

    let mut table = RemapTable::new();
    for id in &to_duplicate {
        table.mark_pending(id.clone());
    }
    // The old base never gets re-created; it maps straight to the new base.
    table.resolve(old_base.clone(), onto.clone());

    let mut ctx = DuplicateContext {
        backend,
        options: options.clone(),
        table,
        to_duplicate,
        old_base: old_base.clone(),
        new_base: onto.clone(),
        duplicated: IndexMap::new(),
    };

    // Seed oldest-first so the traversal mostly runs in dependency order;
    // memoization makes any seed order correct.
    let seeds: Vec<CommitId> = ctx.to_duplicate.iter().rev().cloned().collect();
    let mut new_tip = None;
    for id in &seeds {
        let new_id = ctx.duplicate(id, on_duplicated)?;
        if id == tip {
            new_tip = Some(new_id);
        }
    }

    Ok(DuplicateStats {
        // The tip is in any non-empty `old_base..tip` range.
        new_tip: new_tip.expect("tip should have been duplicated"),
        duplicated_commits: ctx.duplicated,
    })
}

impl DuplicateContext<'_> {
    /// Duplicates `id`, first duplicating any pending parents.
    ///
    /// The traversal keeps its own stack of frames instead of recursing, so
    /// the depth of the dependency chain is bounded by heap, not by the
    /// call stack.
    fn duplicate(
        &mut self,
        id: &CommitId,
        on_duplicated: &mut dyn FnMut(&CommitId, &CommitId, usize, usize),
    ) -> Result<CommitId, DuplicateError> {
        if let RemapEntry::Resolved(new_id) = self.table.get(id) {
            // Already duplicated through another path in the DAG.
            return Ok(new_id.clone());
        }
        let mut stack = vec![Frame::read(self.backend, id.clone())?];
        loop {
            // A frame is only ever pushed for a Pending commit, so the stack
            // can't grow past the duplication set.
            debug_assert!(stack.len() <= self.to_duplicate.len());
            let frame = stack.last_mut().expect("frame stack can't be empty");
            let Some(orig_parent) = frame.orig_parents.get(frame.next_parent) else {
                // All parents resolved; create the new commit.
                let frame = stack.pop().expect("frame stack can't be empty");
                let new_id = self.create_duplicate(&frame)?;
                let done = self.duplicated.len();
                on_duplicated(&frame.commit_id, &new_id, done, self.to_duplicate.len());
                if stack.is_empty() {
                    return Ok(new_id);
                }
                continue;
            };
            let orig_parent = orig_parent.clone();
            match self.table.get(&orig_parent) {
                RemapEntry::Resolved(new_parent) => {
                    frame.new_parents.push(new_parent.clone());
                    frame.next_parent += 1;
                }
                RemapEntry::Pending => {
                    // The parent has to be duplicated first. Leave the
                    // cursor in place; it will find the parent resolved.
                    stack.push(Frame::read(self.backend, orig_parent)?);
                }
                RemapEntry::Unmapped => {
                    if !self.options.isolate {
                        // Anchor to the untouched history outside the set.
                        frame.new_parents.push(orig_parent);
                    }
                    frame.next_parent += 1;
                }
            }
        }
    }

    fn create_duplicate(&mut self, frame: &Frame) -> Result<CommitId, DuplicateError> {
        let tree = self.backend.tree_of(&frame.commit_id)?;
        let metadata = self.backend.metadata_of(&frame.commit_id)?;
        let committer = self.options.keep_committer.then_some(metadata.committer);
        let new_id = self.backend.create_revision(
            &tree,
            &frame.new_parents,
            NewCommitMetadata {
                author: metadata.author,
                committer,
                message: metadata.message,
            },
        )?;
        tracing::debug!(old_id = ?frame.commit_id, ?new_id, "duplicated commit");
        self.table
            .resolve(frame.commit_id.clone(), new_id.clone());
        self.duplicated
            .insert(frame.commit_id.clone(), new_id.clone());
        if self.options.verify {
            verify::verify_duplicate(self, &frame.commit_id, &new_id)?;
        }
        Ok(new_id)
    }
}
